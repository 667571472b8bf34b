//! Global voxel positions, chunk coordinates and inclusive intervals.
//!
//! Chunk coordinates use floor division on every axis, so `-1` with a chunk
//! size of `4` belongs to chunk `-1`, not chunk `0`.

use glam::I64Vec3;
use serde::{Deserialize, Serialize};

pub type Position = I64Vec3;
pub type ChunkCoord = I64Vec3;

/// Largest number of voxels a single chunk may hold.
pub const MAX_CHUNK_VOXELS: i64 = 1 << 30;

/// Per-axis extent of a chunk. Every extent is strictly positive and the
/// chunk holds at most [`MAX_CHUNK_VOXELS`] voxels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[i64; 3]", into = "[i64; 3]")]
pub struct ChunkShape(I64Vec3);

fn check_extent(extent: [i64; 3]) -> Result<(), String> {
    if extent.iter().any(|&axis| axis <= 0) {
        return Err(format!("chunk extents must be positive, got {extent:?}"));
    }
    let count = extent
        .iter()
        .try_fold(1i64, |count, &axis| count.checked_mul(axis));
    match count {
        Some(count) if count <= MAX_CHUNK_VOXELS => Ok(()),
        _ => Err(format!("chunk {extent:?} exceeds {MAX_CHUNK_VOXELS} voxels")),
    }
}

impl ChunkShape {
    pub fn new(x: i64, y: i64, z: i64) -> Self {
        if let Err(message) = check_extent([x, y, z]) {
            panic!("{message}");
        }
        Self(I64Vec3::new(x, y, z))
    }

    pub fn cube(size: i64) -> Self {
        Self::new(size, size, size)
    }

    #[inline]
    pub fn extent(&self) -> I64Vec3 {
        self.0
    }

    #[inline]
    pub fn voxel_count(&self) -> usize {
        (self.0.x * self.0.y * self.0.z) as usize
    }

    /// Chunk owning `pos`, floor-divided per axis.
    #[inline]
    pub fn chunk_of(&self, pos: Position) -> ChunkCoord {
        I64Vec3::new(
            pos.x.div_euclid(self.0.x),
            pos.y.div_euclid(self.0.y),
            pos.z.div_euclid(self.0.z),
        )
    }

    #[inline]
    pub fn chunk_origin(&self, chunk: ChunkCoord) -> Position {
        chunk * self.0
    }

    pub fn chunk_interval(&self, chunk: ChunkCoord) -> Interval {
        let min = self.chunk_origin(chunk);
        Interval::new(min, min + self.0 - I64Vec3::ONE)
    }

    /// Whether `interval` is exactly one chunk of this shape.
    pub fn is_chunk_interval(&self, interval: &Interval) -> bool {
        interval.checked_dims() == Some(self.0)
            && (0..3).all(|axis| interval.min[axis].rem_euclid(self.0[axis]) == 0)
    }

    /// Linear offset of `pos` inside its owning chunk, x varying fastest.
    #[inline]
    pub fn local_index(&self, pos: Position) -> usize {
        let local = I64Vec3::new(
            pos.x.rem_euclid(self.0.x),
            pos.y.rem_euclid(self.0.y),
            pos.z.rem_euclid(self.0.z),
        );
        (local.x + self.0.x * (local.y + self.0.y * local.z)) as usize
    }

    /// Inverse of [`Self::local_index`] for a given chunk.
    #[inline]
    pub fn position_at(&self, chunk: ChunkCoord, index: usize) -> Position {
        let index = index as i64;
        let x = index % self.0.x;
        let y = (index / self.0.x) % self.0.y;
        let z = index / (self.0.x * self.0.y);
        self.chunk_origin(chunk) + I64Vec3::new(x, y, z)
    }
}

impl Default for ChunkShape {
    fn default() -> Self {
        Self::cube(64)
    }
}

impl TryFrom<[i64; 3]> for ChunkShape {
    type Error = String;

    fn try_from(value: [i64; 3]) -> Result<Self, Self::Error> {
        check_extent(value)?;
        Ok(Self(I64Vec3::from_array(value)))
    }
}

impl From<ChunkShape> for [i64; 3] {
    fn from(shape: ChunkShape) -> Self {
        shape.0.to_array()
    }
}

/// Axis-aligned box with inclusive `min` and `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub min: Position,
    pub max: Position,
}

impl Interval {
    pub fn new(min: Position, max: Position) -> Self {
        assert!(
            min.cmple(max).all(),
            "interval min {min} must not exceed max {max}"
        );
        Self { min, max }
    }

    /// Interval `[0, dims - 1]` of a volume with the given dimensions.
    pub fn from_dims(dims: I64Vec3) -> Self {
        Self::new(I64Vec3::ZERO, dims - I64Vec3::ONE)
    }

    #[inline]
    pub fn contains(&self, pos: Position) -> bool {
        pos.cmpge(self.min).all() && pos.cmple(self.max).all()
    }

    #[inline]
    pub fn dims(&self) -> I64Vec3 {
        self.max - self.min + I64Vec3::ONE
    }

    pub fn voxel_count(&self) -> usize {
        let dims = self.dims();
        (dims.x * dims.y * dims.z) as usize
    }

    /// [`Self::dims`], or `None` when an extent does not fit in `i64`.
    pub fn checked_dims(&self) -> Option<I64Vec3> {
        let axis = |min: i64, max: i64| max.checked_sub(min)?.checked_add(1);
        Some(I64Vec3::new(
            axis(self.min.x, self.max.x)?,
            axis(self.min.y, self.max.y)?,
            axis(self.min.z, self.max.z)?,
        ))
    }

    /// [`Self::voxel_count`], or `None` when the count overflows.
    pub fn checked_voxel_count(&self) -> Option<usize> {
        let dims = self.checked_dims()?;
        let count = dims.x.checked_mul(dims.y)?.checked_mul(dims.z)?;
        usize::try_from(count).ok()
    }

    pub fn union(&self, other: &Interval) -> Interval {
        Interval {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn intersection(&self, other: &Interval) -> Option<Interval> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        min.cmple(max).all().then_some(Interval { min, max })
    }

    /// Positions in the interval, x varying fastest.
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        let (min, max) = (self.min, self.max);
        (min.z..=max.z).flat_map(move |z| {
            (min.y..=max.y).flat_map(move |y| (min.x..=max.x).map(move |x| I64Vec3::new(x, y, z)))
        })
    }
}
