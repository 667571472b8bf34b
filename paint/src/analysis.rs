//! Classification of the fragments a paint mask touches.

use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;

use crate::coords::{ChunkCoord, Position};
use crate::label::{Label, LabelId};
use crate::shape::Neighborhood;
use crate::sparse::Mask;
use crate::volume::{LabelVolume, VolumeResult};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct AffectedFragments {
    /// Labels found under painted voxels.
    pub contained: HashSet<LabelId>,
    /// Labels found next to painted voxels but outside the mask.
    pub bordering: HashSet<LabelId>,
    /// Unpainted neighbors of the mask, grouped by their label.
    pub edge_points: HashMap<LabelId, Vec<Position>>,
}

impl AffectedFragments {
    /// Regular contained labels with no voxel left outside the mask.
    pub fn fully_overpainted(&self) -> Vec<LabelId> {
        let mut ids: Vec<LabelId> = self
            .contained
            .difference(&self.bordering)
            .copied()
            .filter(|&id| Label::from_raw(id).is_regular())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Regular contained labels that survive outside the mask and have to be
    /// re-identified, ascending.
    pub fn split_candidates(&self) -> Vec<LabelId> {
        let mut ids: Vec<LabelId> = self
            .contained
            .iter()
            .copied()
            .filter(|id| self.edge_points.contains_key(id))
            .filter(|&id| Label::from_raw(id).is_regular())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn contained_sorted(&self) -> Vec<LabelId> {
        let mut ids: Vec<LabelId> = self.contained.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn merge(&mut self, other: AffectedFragments) {
        self.contained.extend(other.contained);
        self.bordering.extend(other.bordering);
        for (id, points) in other.edge_points {
            self.edge_points.entry(id).or_default().extend(points);
        }
    }
}

/// Walks every materialized chunk of `mask` against `fragments`.
///
/// Fragment reads past the volume bounds yield no label. Chunks are analyzed
/// in parallel and merged in sorted chunk order, so edge point lists come out
/// in the same order on every run.
pub fn analyze<V>(
    mask: &Mask,
    fragments: &V,
    neighborhood: Neighborhood,
) -> VolumeResult<AffectedFragments>
where
    V: LabelVolume + ?Sized,
{
    let offsets = neighborhood.offsets();
    let coords = mask.sorted_chunk_coords();

    let partials: Vec<AffectedFragments> = coords
        .par_iter()
        .map(|&coord| analyze_chunk(mask, coord, fragments, &offsets))
        .collect::<VolumeResult<Vec<_>>>()?;

    let mut affected = AffectedFragments::default();
    for partial in partials {
        affected.merge(partial);
    }
    Ok(affected)
}

fn fragment_label<V>(fragments: &V, pos: Position) -> VolumeResult<Option<LabelId>>
where
    V: LabelVolume + ?Sized,
{
    if !fragments.interval().contains(pos) {
        return Ok(None);
    }
    let label = fragments.label_at(pos)?;
    Ok(Label::from_raw(label).is_fragment().then_some(label))
}

fn analyze_chunk<V>(
    mask: &Mask,
    coord: ChunkCoord,
    fragments: &V,
    offsets: &[Position],
) -> VolumeResult<AffectedFragments>
where
    V: LabelVolume + ?Sized,
{
    let mut affected = AffectedFragments::default();
    let Some(chunk) = mask.chunk(coord) else {
        return Ok(affected);
    };

    for (pos, &painted) in chunk.iter() {
        if !painted {
            continue;
        }
        if let Some(label) = fragment_label(fragments, pos)? {
            affected.contained.insert(label);
        }

        for offset in offsets {
            let neighbor = pos + *offset;
            if *mask.get(neighbor) {
                continue;
            }
            if let Some(label) = fragment_label(fragments, neighbor)? {
                affected.bordering.insert(label);
                affected.edge_points.entry(label).or_default().push(neighbor);
            }
        }
    }

    Ok(affected)
}

#[cfg(test)]
mod tests {
    use glam::I64Vec3;

    use super::*;
    use crate::coords::{ChunkShape, Interval};
    use crate::label::BACKGROUND;
    use crate::sparse::SparseVolume;
    use crate::volume::DenseLabelVolume;

    #[test]
    fn whole_volume_mask_has_no_border() -> anyhow::Result<()> {
        let interval = Interval::from_dims(I64Vec3::splat(5));
        let fragments = DenseLabelVolume::new(interval, 7);
        let mut mask = SparseVolume::new(ChunkShape::cube(2), false);
        for pos in interval.positions() {
            mask.set(pos, true);
        }

        let affected = analyze(&mask, &fragments, Neighborhood::Face)?;

        assert_eq!(affected.contained_sorted(), vec![7]);
        assert!(affected.bordering.is_empty());
        assert!(affected.edge_points.is_empty());
        assert_eq!(affected.fully_overpainted(), vec![7]);
        assert!(affected.split_candidates().is_empty());
        Ok(())
    }

    #[test]
    fn partial_mask_borders_its_own_label() -> anyhow::Result<()> {
        // 1 1 2 2 along x, painting x in 1..=2
        let interval = Interval::from_dims(I64Vec3::new(4, 1, 1));
        let fragments = DenseLabelVolume::from_fn(interval, |pos| if pos.x < 2 { 1 } else { 2 });
        let mut mask = SparseVolume::new(ChunkShape::cube(4), false);
        mask.set(I64Vec3::new(1, 0, 0), true);
        mask.set(I64Vec3::new(2, 0, 0), true);

        let affected = analyze(&mask, &fragments, Neighborhood::Face)?;

        assert_eq!(affected.contained_sorted(), vec![1, 2]);
        assert_eq!(affected.edge_points[&1], vec![I64Vec3::new(0, 0, 0)]);
        assert_eq!(affected.edge_points[&2], vec![I64Vec3::new(3, 0, 0)]);
        assert_eq!(affected.split_candidates(), vec![1, 2]);
        assert!(affected.fully_overpainted().is_empty());
        Ok(())
    }

    #[test]
    fn background_is_recorded_but_never_split_or_invalidated() -> anyhow::Result<()> {
        let interval = Interval::from_dims(I64Vec3::new(3, 1, 1));
        let fragments = DenseLabelVolume::from_fn(interval, |pos| {
            if pos.x == 1 { 5 } else { BACKGROUND }
        });
        let mut mask = SparseVolume::new(ChunkShape::cube(4), false);
        mask.set(I64Vec3::new(0, 0, 0), true);
        mask.set(I64Vec3::new(1, 0, 0), true);

        let affected = analyze(&mask, &fragments, Neighborhood::Face)?;

        assert!(affected.contained.contains(&BACKGROUND));
        assert!(affected.bordering.contains(&BACKGROUND));
        assert!(affected.split_candidates().is_empty());
        assert_eq!(affected.fully_overpainted(), vec![5]);
        Ok(())
    }

    #[test]
    fn containment_and_bordering_partition_edge_points() -> anyhow::Result<()> {
        let interval = Interval::from_dims(I64Vec3::new(8, 8, 2));
        let fragments = DenseLabelVolume::from_fn(interval, |pos| {
            (1 + pos.x / 3 + 3 * (pos.y / 3)) as LabelId
        });
        let mut mask = SparseVolume::new(ChunkShape::cube(3), false);
        for pos in Interval::new(I64Vec3::new(2, 2, 0), I64Vec3::new(5, 4, 1)).positions() {
            mask.set(pos, true);
        }

        let affected = analyze(&mask, &fragments, Neighborhood::Face)?;

        for id in affected.contained.iter() {
            let has_edges = affected
                .edge_points
                .get(id)
                .is_some_and(|points| !points.is_empty());
            assert_eq!(affected.bordering.contains(id), has_edges, "label {id}");
        }
        for (id, points) in affected.edge_points.iter() {
            assert!(affected.bordering.contains(id));
            for point in points {
                assert!(!*mask.get(*point));
                assert_eq!(fragments.get(*point), *id);
            }
        }
        Ok(())
    }
}
