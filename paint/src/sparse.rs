//! Sparse chunk-addressed volume over an unbounded integer grid.
//!
//! A chunk is materialized on the first write inside it and is always filled
//! with the default value before any cell is handed out. Reads of chunks that
//! were never written return the default and never materialize.

use std::fmt;

use hashbrown::HashMap;

use crate::coords::{ChunkCoord, ChunkShape, Interval, Position};

#[derive(Clone, PartialEq, Eq)]
pub struct Chunk<T> {
    coord: ChunkCoord,
    interval: Interval,
    cells: Vec<T>,
}

impl<T: Clone> Chunk<T> {
    fn filled(shape: &ChunkShape, coord: ChunkCoord, value: &T) -> Self {
        Self {
            coord,
            interval: shape.chunk_interval(coord),
            cells: vec![value.clone(); shape.voxel_count()],
        }
    }
}

impl<T> Chunk<T> {
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Global inclusive interval covered by the chunk.
    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Cells in x-fastest order over [`Self::interval`].
    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    /// Global positions paired with their cells.
    pub fn iter(&self) -> impl Iterator<Item = (Position, &T)> + '_ {
        self.interval.positions().zip(self.cells.iter())
    }
}

impl<T> fmt::Debug for Chunk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("coord", &self.coord)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq)]
pub struct SparseVolume<T> {
    shape: ChunkShape,
    default: T,
    chunks: HashMap<ChunkCoord, Chunk<T>>,
}

/// Boolean paint mask produced by one flood fill.
pub type Mask = SparseVolume<bool>;

impl<T: Clone> SparseVolume<T> {
    pub fn new(shape: ChunkShape, default: T) -> Self {
        Self {
            shape,
            default,
            chunks: HashMap::new(),
        }
    }

    pub fn shape(&self) -> ChunkShape {
        self.shape
    }

    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// Value at `pos`, or the default if its chunk was never written.
    #[inline]
    pub fn get(&self, pos: Position) -> &T {
        match self.chunks.get(&self.shape.chunk_of(pos)) {
            Some(chunk) => &chunk.cells[self.shape.local_index(pos)],
            None => &self.default,
        }
    }

    /// Write accessor; materializes the owning chunk on first use.
    #[inline]
    pub fn get_mut(&mut self, pos: Position) -> &mut T {
        let coord = self.shape.chunk_of(pos);
        let index = self.shape.local_index(pos);
        let shape = self.shape;
        let default = &self.default;
        let chunk = self
            .chunks
            .entry(coord)
            .or_insert_with(|| Chunk::filled(&shape, coord, default));

        &mut chunk.cells[index]
    }

    #[inline]
    pub fn set(&mut self, pos: Position, value: T) {
        *self.get_mut(pos) = value;
    }

    pub fn has_data(&self, pos: Position) -> bool {
        self.chunks.contains_key(&self.shape.chunk_of(pos))
    }

    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk<T>> {
        self.chunks.get(&coord)
    }

    /// Live chunk map, in no particular order.
    pub fn chunks(&self) -> impl Iterator<Item = (&ChunkCoord, &Chunk<T>)> + '_ {
        self.chunks.iter()
    }

    /// Materialized chunk coordinates in lexicographic (x, y, z) order.
    pub fn sorted_chunk_coords(&self) -> Vec<ChunkCoord> {
        let mut coords: Vec<ChunkCoord> = self.chunks.keys().copied().collect();
        coords.sort_unstable_by_key(|coord| coord.to_array());
        coords
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunk-aligned inclusive interval of all materialized chunks.
    pub fn bounding_box(&self) -> Option<Interval> {
        self.chunks
            .values()
            .map(|chunk| chunk.interval)
            .reduce(|acc, interval| acc.union(&interval))
    }

    pub fn retain_chunks<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Chunk<T>) -> bool,
    {
        self.chunks.retain(|_, chunk| keep(chunk));
    }
}

impl<T: Clone + PartialEq> SparseVolume<T> {
    /// Drops chunks that hold nothing but the default value.
    pub fn prune_default_chunks(&mut self) -> usize {
        let before = self.chunks.len();
        let default = self.default.clone();
        self.chunks
            .retain(|_, chunk| chunk.cells.iter().any(|cell| *cell != default));
        before - self.chunks.len()
    }

    /// Number of materialized cells equal to `value`.
    pub fn count(&self, value: &T) -> usize {
        self.chunks
            .values()
            .map(|chunk| chunk.cells.iter().filter(|cell| *cell == value).count())
            .sum()
    }
}

impl<T> fmt::Debug for SparseVolume<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseVolume")
            .field("shape", &self.shape)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}
