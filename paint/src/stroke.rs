//! One paint stroke, from seed click to enqueued annotation task.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info};

use crate::analysis::analyze;
use crate::assignment::FragmentSegmentAssignment;
use crate::config::PaintConfig;
use crate::coords::{Interval, Position};
use crate::flood_fill::{flood_fill, same_label};
use crate::ids::IdAllocator;
use crate::label::{Label, LabelId, TRANSPARENT};
use crate::persist::{
    CommitRequest, MaskConverter, PersistError, PersistResult, PersistTarget, PersistenceSink,
};
use crate::scheduler::TaskQueue;
use crate::sparse::{Mask, SparseVolume};
use crate::split::split_fragments;
use crate::task::AnnotationTask;
use crate::volume::{LabelCanvas, LabelVolume, VolumeError, VolumeResult};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StrokeError {
    #[error("Cannot paint from {pos}: canvas label is {label}")]
    InvalidSeed { pos: Position, label: Label },
    #[error(transparent)]
    Volume(#[from] VolumeError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

pub type StrokeResult<T> = std::result::Result<T, StrokeError>;

#[derive(Debug, Clone)]
pub struct StrokeOutcome {
    pub uuid: String,
    /// Canvas label the stroke started on.
    pub id: LabelId,
    pub new_ids: Vec<LabelId>,
    pub invalidated_ids: Vec<LabelId>,
    /// Fresh ids per original fragment that was split.
    pub splits: BTreeMap<LabelId, Vec<LabelId>>,
    pub painted_voxels: usize,
    pub mask: Mask,
}

/// Runs strokes against the label volumes and hands the results to the
/// persistence sink, the assignment and the task queue.
#[derive(Debug)]
pub struct PaintReconciler<Ids, Assignment, Sink> {
    config: PaintConfig,
    target: PersistTarget,
    ids: Ids,
    assignment: Assignment,
    sink: Sink,
    queue: TaskQueue,
}

impl<Ids, Assignment, Sink> PaintReconciler<Ids, Assignment, Sink>
where
    Ids: IdAllocator,
    Assignment: FragmentSegmentAssignment,
    Sink: PersistenceSink,
{
    pub fn new(
        config: PaintConfig,
        ids: Ids,
        assignment: Assignment,
        sink: Sink,
        queue: TaskQueue,
    ) -> Self {
        Self {
            target: config.persistence.target(),
            config,
            ids,
            assignment,
            sink,
            queue,
        }
    }

    pub fn config(&self) -> &PaintConfig {
        &self.config
    }

    pub fn ids(&self) -> &Ids {
        &self.ids
    }

    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Paints the canvas region connected to `seed` and reconciles the
    /// fragments it covers.
    ///
    /// Nothing is persisted, assigned or enqueued unless every volume read
    /// succeeds, including the reads of whole mask chunks needed for
    /// persistence. A persistence failure leaves the assignment and the queue
    /// untouched.
    pub fn apply_stroke<Canvas, Fragments>(
        &mut self,
        canvas: &Canvas,
        fragments: &Fragments,
        seed: Position,
    ) -> StrokeResult<StrokeOutcome>
    where
        Canvas: LabelVolume + ?Sized,
        Fragments: LabelVolume,
    {
        let seed_label = canvas.label(seed)?;
        if !seed_label.is_paintable() {
            return Err(StrokeError::InvalidSeed {
                pos: seed,
                label: seed_label,
            });
        }
        let label = seed_label.raw();
        let neighborhood = self.config.neighborhood;
        info!(%seed, label, "Paint stroke started");

        let mut mask: Mask = SparseVolume::new(self.config.chunk_shape, false);
        let painted_voxels =
            flood_fill(canvas, &mut mask, seed, true, neighborhood, same_label)?;
        debug!(painted_voxels, chunks = mask.chunk_count(), "Filled stroke mask");

        let affected = analyze(&mask, fragments, neighborhood)?;
        let components = split_fragments(fragments, &mask, &affected, neighborhood, &self.ids)?;
        let overpainted = affected.fully_overpainted();

        let mut splits: BTreeMap<LabelId, Vec<LabelId>> = BTreeMap::new();
        let mut masks: BTreeMap<LabelId, Mask> = BTreeMap::new();
        masks.insert(label, mask.clone());
        for component in components {
            splits.entry(component.original).or_default().push(component.id);
            masks.insert(component.id, component.mask);
        }
        for owned in masks.values_mut() {
            owned.prune_default_chunks();
        }

        let shape = self.config.chunk_shape;
        let bounds = masks
            .values()
            .filter_map(Mask::bounding_box)
            .reduce(|acc, interval| acc.union(&interval))
            .unwrap_or_else(|| shape.chunk_interval(shape.chunk_of(seed)));

        let blocks = commit_blocks(&masks, fragments)?;
        self.persist(label, &blocks, fragments)?;

        for original in splits.keys() {
            self.assignment.detach_fragment(*original);
        }
        self.assignment.detach_fragment(label);
        for id in masks.keys() {
            self.assignment.assign_fragments(*id, *id);
        }

        let mut new_ids: Vec<LabelId> = affected.contained_sorted();
        new_ids.extend(masks.keys().copied());
        let task = AnnotationTask::new(label, new_ids, overpainted, masks, bounds);
        let outcome = StrokeOutcome {
            uuid: task.uuid().to_string(),
            id: label,
            new_ids: task.new_ids().to_vec(),
            invalidated_ids: task.invalidated_ids().to_vec(),
            splits,
            painted_voxels,
            mask,
        };
        self.queue.enqueue(task);

        info!(
            uuid = %outcome.uuid,
            new_ids = ?outcome.new_ids,
            invalidated_ids = ?outcome.invalidated_ids,
            "Paint stroke reconciled"
        );
        Ok(outcome)
    }

    fn persist<Fragments>(
        &self,
        label: LabelId,
        blocks: &[CommitBlock<'_>],
        fragments: &Fragments,
    ) -> PersistResult<()>
    where
        Fragments: LabelVolume,
    {
        for block in blocks {
            let converter = MaskConverter::new(block.mask, block.id, fragments);
            self.sink.commit(CommitRequest {
                id: block.id,
                converted: &converter,
                interval: block.interval,
                background: fragments,
                target: &self.target,
                block_shape: self.config.persistence.block_shape,
                overwrite: block.id != label,
            })?;
        }
        Ok(())
    }
}

/// One mask chunk, clipped to the fragment volume, awaiting commit.
struct CommitBlock<'a> {
    id: LabelId,
    mask: &'a Mask,
    interval: Interval,
}

/// Lists the blocks a stroke commits and reads every fragment label under
/// them, so an unloaded chunk fails the stroke before the first commit.
fn commit_blocks<'a, Fragments>(
    masks: &'a BTreeMap<LabelId, Mask>,
    fragments: &Fragments,
) -> VolumeResult<Vec<CommitBlock<'a>>>
where
    Fragments: LabelVolume,
{
    let volume_interval = fragments.interval();
    let mut blocks = Vec::new();
    for (&id, mask) in masks {
        for coord in mask.sorted_chunk_coords() {
            let Some(interval) = mask
                .chunk(coord)
                .and_then(|chunk| chunk.interval().intersection(&volume_interval))
            else {
                continue;
            };
            for pos in interval.positions() {
                fragments.label_at(pos)?;
            }
            blocks.push(CommitBlock { id, mask, interval });
        }
    }
    Ok(blocks)
}

/// Clears every painted voxel of `mask` in the canvas. Returns the number of
/// voxels cleared.
pub fn erase_painted<Canvas>(mask: &Mask, canvas: &mut Canvas) -> VolumeResult<usize>
where
    Canvas: LabelCanvas + ?Sized,
{
    let interval = canvas.interval();
    let mut erased = 0usize;
    for coord in mask.sorted_chunk_coords() {
        let Some(chunk) = mask.chunk(coord) else {
            continue;
        };
        for (pos, &painted) in chunk.iter() {
            if painted && interval.contains(pos) {
                canvas.write_label(pos, TRANSPARENT)?;
                erased += 1;
            }
        }
    }
    Ok(erased)
}
