//! Hand-off of reconciled labels to a block store.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::coords::{ChunkShape, Interval, Position};
use crate::label::LabelId;
use crate::sparse::Mask;
use crate::volume::{LabelVolume, VolumeError, VolumeResult};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PersistError {
    #[error("Failed to read labels for commit: {0}")]
    Volume(#[from] VolumeError),
    #[error("Commit of label {id} to {dataset} rejected: {message}")]
    Rejected {
        id: LabelId,
        dataset: String,
        message: String,
    },
}

pub type PersistResult<T> = std::result::Result<T, PersistError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistTarget {
    pub destination: String,
    pub dataset: String,
}

/// View writing `id` wherever the mask is painted and the background label
/// everywhere else.
pub struct MaskConverter<'a, V: ?Sized> {
    mask: &'a Mask,
    id: LabelId,
    background: &'a V,
}

impl<'a, V: LabelVolume + ?Sized> MaskConverter<'a, V> {
    pub fn new(mask: &'a Mask, id: LabelId, background: &'a V) -> Self {
        Self {
            mask,
            id,
            background,
        }
    }
}

impl<V: LabelVolume + ?Sized> LabelVolume for MaskConverter<'_, V> {
    fn interval(&self) -> Interval {
        self.background.interval()
    }

    fn label_at(&self, pos: Position) -> VolumeResult<LabelId> {
        if *self.mask.get(pos) {
            Ok(self.id)
        } else {
            self.background.label_at(pos)
        }
    }
}

pub struct CommitRequest<'a> {
    /// Label the converter writes under the mask.
    pub id: LabelId,
    pub converted: &'a dyn LabelVolume,
    pub interval: Interval,
    pub background: &'a dyn LabelVolume,
    pub target: &'a PersistTarget,
    pub block_shape: ChunkShape,
    pub overwrite: bool,
}

impl CommitRequest<'_> {
    /// Converted labels over the request interval, x fastest.
    pub fn read_labels(&self) -> VolumeResult<Vec<LabelId>> {
        self.interval
            .positions()
            .map(|pos| self.converted.label_at(pos))
            .collect()
    }
}

pub trait PersistenceSink: Send + Sync {
    fn commit(&self, request: CommitRequest<'_>) -> PersistResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedBlock {
    pub id: LabelId,
    pub interval: Interval,
    pub dataset: String,
    pub block_shape: ChunkShape,
    pub overwrite: bool,
    pub labels: Vec<LabelId>,
}

/// Sink that keeps every commit in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    blocks: Mutex<Vec<CommittedBlock>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> Vec<CommittedBlock> {
        self.blocks.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }
}

impl PersistenceSink for MemorySink {
    fn commit(&self, request: CommitRequest<'_>) -> PersistResult<()> {
        let labels = request.read_labels()?;
        info!(
            id = request.id,
            dataset = %request.target.dataset,
            min = %request.interval.min,
            max = %request.interval.max,
            overwrite = request.overwrite,
            "Committed label block"
        );
        self.blocks.lock().push(CommittedBlock {
            id: request.id,
            interval: request.interval,
            dataset: request.target.dataset.clone(),
            block_shape: request.block_shape,
            overwrite: request.overwrite,
            labels,
        });
        Ok(())
    }
}
