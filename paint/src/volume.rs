//! Read access to label volumes.
//!
//! A label volume has a declared inclusive interval. Reads past that interval
//! go through [`LabelVolume::extended_label_at`] and yield [`OUTSIDE`] without
//! touching the backing store.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::coords::{ChunkCoord, ChunkShape, Interval, Position};
use crate::label::{Label, LabelId, OUTSIDE};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VolumeError {
    #[error("Label chunk {chunk} is not loaded yet")]
    NotLoaded { chunk: ChunkCoord },
    #[error("Failed to load label chunk {chunk}: {message}")]
    Load { chunk: ChunkCoord, message: String },
    #[error("Position {pos} is outside of the writable interval")]
    OutOfBounds { pos: Position },
}

pub type VolumeResult<T> = std::result::Result<T, VolumeError>;

pub trait LabelVolume: Sync {
    /// Declared inclusive bounds.
    fn interval(&self) -> Interval;

    /// Raw label at a position inside [`Self::interval`].
    fn label_at(&self, pos: Position) -> VolumeResult<LabelId>;

    fn extended_label_at(&self, pos: Position) -> VolumeResult<LabelId> {
        if self.interval().contains(pos) {
            self.label_at(pos)
        } else {
            Ok(OUTSIDE)
        }
    }

    fn label(&self, pos: Position) -> VolumeResult<Label> {
        self.extended_label_at(pos).map(Label::from_raw)
    }
}

/// A label volume that strokes can be erased from.
pub trait LabelCanvas: LabelVolume {
    fn write_label(&mut self, pos: Position, label: LabelId) -> VolumeResult<()>;
}

/// Fully materialized volume, x varying fastest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseLabelVolume {
    interval: Interval,
    labels: Vec<LabelId>,
}

impl DenseLabelVolume {
    pub fn new(interval: Interval, fill: LabelId) -> Self {
        Self {
            interval,
            labels: vec![fill; interval.voxel_count()],
        }
    }

    pub fn from_fn<F>(interval: Interval, mut f: F) -> Self
    where
        F: FnMut(Position) -> LabelId,
    {
        Self {
            interval,
            labels: interval.positions().map(&mut f).collect(),
        }
    }

    #[inline]
    fn index(&self, pos: Position) -> usize {
        let local = pos - self.interval.min;
        let dims = self.interval.dims();
        (local.x + dims.x * (local.y + dims.y * local.z)) as usize
    }

    pub fn get(&self, pos: Position) -> LabelId {
        if self.interval.contains(pos) {
            self.labels[self.index(pos)]
        } else {
            OUTSIDE
        }
    }

    pub fn set(&mut self, pos: Position, label: LabelId) {
        assert!(
            self.interval.contains(pos),
            "position {pos} outside of volume interval"
        );
        let index = self.index(pos);
        self.labels[index] = label;
    }

    pub fn labels(&self) -> &[LabelId] {
        &self.labels
    }
}

impl LabelVolume for DenseLabelVolume {
    fn interval(&self) -> Interval {
        self.interval
    }

    #[inline]
    fn label_at(&self, pos: Position) -> VolumeResult<LabelId> {
        Ok(self.get(pos))
    }
}

impl LabelCanvas for DenseLabelVolume {
    fn write_label(&mut self, pos: Position, label: LabelId) -> VolumeResult<()> {
        if !self.interval.contains(pos) {
            return Err(VolumeError::OutOfBounds { pos });
        }
        let index = self.index(pos);
        self.labels[index] = label;
        Ok(())
    }
}

/// Source of label blocks for [`ChunkedLabelVolume`].
pub trait ChunkLoader: Send + Sync {
    /// Cells of the whole chunk, x fastest, or `None` if the chunk is not
    /// available yet.
    fn load(&self, chunk: ChunkCoord, shape: ChunkShape) -> VolumeResult<Option<Vec<LabelId>>>;
}

/// Lazily loaded volume; each chunk is fetched once and cached.
pub struct ChunkedLabelVolume<L> {
    interval: Interval,
    shape: ChunkShape,
    loader: L,
    cache: Mutex<HashMap<ChunkCoord, Arc<Vec<LabelId>>>>,
}

impl<L: ChunkLoader> ChunkedLabelVolume<L> {
    pub fn new(interval: Interval, shape: ChunkShape, loader: L) -> Self {
        Self {
            interval,
            shape,
            loader,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn shape(&self) -> ChunkShape {
        self.shape
    }

    pub fn loaded_chunks(&self) -> Vec<ChunkCoord> {
        let mut chunks: Vec<ChunkCoord> = self.cache.lock().keys().copied().collect();
        chunks.sort_unstable_by_key(|chunk| chunk.to_array());
        chunks
    }

    fn chunk(&self, chunk: ChunkCoord) -> VolumeResult<Arc<Vec<LabelId>>> {
        if let Some(cells) = self.cache.lock().get(&chunk) {
            return Ok(cells.clone());
        }

        // loader runs unlocked; a racing load of the same chunk is harmless
        let cells = self
            .loader
            .load(chunk, self.shape)?
            .ok_or(VolumeError::NotLoaded { chunk })?;
        if cells.len() != self.shape.voxel_count() {
            return Err(VolumeError::Load {
                chunk,
                message: format!(
                    "expected {} cells, got {}",
                    self.shape.voxel_count(),
                    cells.len()
                ),
            });
        }
        debug!(%chunk, "Loaded label chunk");

        let cells = Arc::new(cells);
        self.cache
            .lock()
            .entry(chunk)
            .or_insert_with(|| cells.clone());
        Ok(cells)
    }
}

impl<L: ChunkLoader> LabelVolume for ChunkedLabelVolume<L> {
    fn interval(&self) -> Interval {
        self.interval
    }

    fn label_at(&self, pos: Position) -> VolumeResult<LabelId> {
        let cells = self.chunk(self.shape.chunk_of(pos))?;
        Ok(cells[self.shape.local_index(pos)])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use glam::I64Vec3;

    use super::*;
    use crate::label::BACKGROUND;

    struct CountingLoader {
        loads: AtomicUsize,
        missing: Option<ChunkCoord>,
    }

    impl ChunkLoader for CountingLoader {
        fn load(
            &self,
            chunk: ChunkCoord,
            shape: ChunkShape,
        ) -> VolumeResult<Option<Vec<LabelId>>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if Some(chunk) == self.missing {
                return Ok(None);
            }
            let cells = (0..shape.voxel_count())
                .map(|index| {
                    let pos = shape.position_at(chunk, index);
                    (pos.x + 100) as LabelId
                })
                .collect();
            Ok(Some(cells))
        }
    }

    #[test]
    fn dense_volume_reads_outside_past_bounds() {
        let interval = Interval::from_dims(I64Vec3::new(3, 2, 2));
        let mut volume = DenseLabelVolume::new(interval, BACKGROUND);
        volume.set(I64Vec3::new(2, 1, 1), 9);

        assert_eq!(volume.extended_label_at(I64Vec3::new(2, 1, 1)), Ok(9));
        assert_eq!(volume.extended_label_at(I64Vec3::new(0, 0, 0)), Ok(BACKGROUND));
        assert_eq!(volume.extended_label_at(I64Vec3::new(3, 0, 0)), Ok(OUTSIDE));
        assert_eq!(volume.extended_label_at(I64Vec3::new(0, -1, 0)), Ok(OUTSIDE));
        assert_eq!(volume.label(I64Vec3::new(0, -1, 0)), Ok(Label::Outside));
    }

    #[test]
    fn canvas_write_rejects_out_of_bounds() {
        let mut volume = DenseLabelVolume::new(Interval::from_dims(I64Vec3::splat(2)), 1);
        assert!(volume.write_label(I64Vec3::ONE, 5).is_ok());
        assert_eq!(volume.get(I64Vec3::ONE), 5);
        assert_eq!(
            volume.write_label(I64Vec3::splat(2), 5),
            Err(VolumeError::OutOfBounds { pos: I64Vec3::splat(2) })
        );
    }

    #[test]
    fn chunked_volume_loads_each_chunk_once() {
        let interval = Interval::new(I64Vec3::splat(-8), I64Vec3::splat(7));
        let loader = CountingLoader {
            loads: AtomicUsize::new(0),
            missing: None,
        };
        let volume = ChunkedLabelVolume::new(interval, ChunkShape::cube(4), loader);

        assert_eq!(volume.label_at(I64Vec3::new(-5, 0, 0)), Ok(95));
        assert_eq!(volume.label_at(I64Vec3::new(-6, 1, 3)), Ok(94));
        assert_eq!(volume.label_at(I64Vec3::new(6, 1, 3)), Ok(106));
        assert_eq!(volume.extended_label_at(I64Vec3::new(60, 1, 3)), Ok(OUTSIDE));

        assert_eq!(volume.loader.loads.load(Ordering::SeqCst), 2);
        assert_eq!(
            volume.loaded_chunks(),
            vec![I64Vec3::new(-2, 0, 0), I64Vec3::new(1, 0, 0)]
        );
    }

    #[test]
    fn missing_chunk_is_reported() {
        let interval = Interval::new(I64Vec3::ZERO, I64Vec3::splat(7));
        let loader = CountingLoader {
            loads: AtomicUsize::new(0),
            missing: Some(I64Vec3::new(1, 0, 0)),
        };
        let volume = ChunkedLabelVolume::new(interval, ChunkShape::cube(4), loader);

        assert_eq!(volume.label_at(I64Vec3::ZERO), Ok(100));
        assert_eq!(
            volume.label_at(I64Vec3::new(4, 0, 0)),
            Err(VolumeError::NotLoaded {
                chunk: I64Vec3::new(1, 0, 0)
            })
        );
    }
}
