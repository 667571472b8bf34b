//! Re-identification of fragments a stroke cut into disjoint remainders.

use tracing::debug;

use crate::analysis::AffectedFragments;
use crate::flood_fill::flood_fill;
use crate::ids::IdAllocator;
use crate::label::LabelId;
use crate::shape::Neighborhood;
use crate::sparse::{Mask, SparseVolume};
use crate::volume::{LabelVolume, VolumeResult};

/// One surviving remainder of an original fragment under a fresh id.
#[derive(Debug, Clone)]
pub struct SplitComponent {
    pub original: LabelId,
    pub id: LabelId,
    pub mask: Mask,
}

/// Floods the part of every split candidate that lies outside `mask`,
/// starting from its recorded edge points.
///
/// An edge point already covered by a component of the same fragment starts
/// nothing new. Candidates are visited in ascending id order and edge points
/// in recorded order, so ids are handed out deterministically.
pub fn split_fragments<V, A>(
    fragments: &V,
    mask: &Mask,
    affected: &AffectedFragments,
    neighborhood: Neighborhood,
    ids: &A,
) -> VolumeResult<Vec<SplitComponent>>
where
    V: LabelVolume + ?Sized,
    A: IdAllocator + ?Sized,
{
    let mut components: Vec<SplitComponent> = Vec::new();

    for original in affected.split_candidates() {
        let Some(edge_points) = affected.edge_points.get(&original) else {
            continue;
        };
        let first = components.len();

        for &point in edge_points {
            let covered = components[first..]
                .iter()
                .any(|component| *component.mask.get(point));
            if covered {
                continue;
            }

            let mut remainder = SparseVolume::new(mask.shape(), false);
            let size = flood_fill(
                fragments,
                &mut remainder,
                point,
                true,
                neighborhood,
                |_, candidate| candidate.label == original && !*mask.get(candidate.pos),
            )?;

            let id = ids.next();
            debug!(original, id, size, "Split off fragment remainder");
            components.push(SplitComponent {
                original,
                id,
                mask: remainder,
            });
        }
    }

    Ok(components)
}

#[cfg(test)]
mod tests {
    use glam::I64Vec3;

    use super::*;
    use crate::analysis::analyze;
    use crate::coords::{ChunkShape, Interval};
    use crate::ids::SequentialIdAllocator;
    use crate::volume::DenseLabelVolume;

    #[test]
    fn ring_touching_mask_twice_is_one_component() -> anyhow::Result<()> {
        // 3x3 ring of label 1 around a center of label 2 in a single slice;
        // painting one ring cell leaves one connected remainder
        let interval = Interval::from_dims(I64Vec3::new(3, 3, 1));
        let fragments = DenseLabelVolume::from_fn(interval, |pos| {
            if pos.x == 1 && pos.y == 1 { 2 } else { 1 }
        });
        let mut mask = SparseVolume::new(ChunkShape::cube(2), false);
        mask.set(I64Vec3::new(1, 0, 0), true);

        let affected = analyze(&mask, &fragments, Neighborhood::Face)?;
        assert_eq!(affected.edge_points[&1].len(), 2);

        let ids = SequentialIdAllocator::starting_after(10);
        let components = split_fragments(&fragments, &mask, &affected, Neighborhood::Face, &ids)?;

        assert_eq!(components.len(), 1);
        assert_eq!(components[0].original, 1);
        assert_eq!(components[0].id, 11);
        assert_eq!(components[0].mask.count(&true), 7);
        assert!(!*components[0].mask.get(I64Vec3::new(1, 0, 0)));
        Ok(())
    }

    #[test]
    fn nothing_to_split_allocates_nothing() -> anyhow::Result<()> {
        let interval = Interval::from_dims(I64Vec3::splat(2));
        let fragments = DenseLabelVolume::new(interval, 3);
        let mut mask = SparseVolume::new(ChunkShape::cube(2), false);
        for pos in interval.positions() {
            mask.set(pos, true);
        }

        let affected = analyze(&mask, &fragments, Neighborhood::Face)?;
        let ids = SequentialIdAllocator::starting_after(10);
        let components = split_fragments(&fragments, &mask, &affected, Neighborhood::Face, &ids)?;

        assert!(components.is_empty());
        assert_eq!(ids.peek(), 11);
        Ok(())
    }
}
