//! Worklist region growing from a seed into a sparse target.

use std::collections::VecDeque;

use crate::coords::Position;
use crate::label::{LabelId, OUTSIDE};
use crate::shape::Neighborhood;
use crate::sparse::SparseVolume;
use crate::volume::{LabelVolume, VolumeResult};

/// A source cell seen by the inclusion predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Voxel {
    pub pos: Position,
    pub label: LabelId,
}

/// Accepts a neighbor carrying the same label as the cell it was reached
/// from. [`OUTSIDE`] never matches.
pub fn same_label(current: &Voxel, candidate: &Voxel) -> bool {
    candidate.label != OUTSIDE && candidate.label == current.label
}

/// Grows `fill` into `target` from `seed` through `source`.
///
/// The seed is always filled. A neighbor is accepted when its target cell
/// does not hold `fill` yet and `include(current, candidate)` holds. Source
/// reads use the extended volume, so cells past its bounds read as
/// [`OUTSIDE`]. Returns the number of cells newly written.
pub fn flood_fill<V, T, P>(
    source: &V,
    target: &mut SparseVolume<T>,
    seed: Position,
    fill: T,
    neighborhood: Neighborhood,
    mut include: P,
) -> VolumeResult<usize>
where
    V: LabelVolume + ?Sized,
    T: Clone + PartialEq,
    P: FnMut(&Voxel, &Voxel) -> bool,
{
    let offsets = neighborhood.offsets();
    let mut filled = 0usize;

    let seed = Voxel {
        pos: seed,
        label: source.extended_label_at(seed)?,
    };
    if *target.get(seed.pos) != fill {
        target.set(seed.pos, fill.clone());
        filled += 1;
    }

    let mut worklist: VecDeque<Voxel> = VecDeque::from([seed]);
    while let Some(current) = worklist.pop_front() {
        for offset in offsets.iter() {
            let pos = current.pos + *offset;
            if *target.get(pos) == fill {
                continue;
            }

            let candidate = Voxel {
                pos,
                label: source.extended_label_at(pos)?,
            };
            if !include(&current, &candidate) {
                continue;
            }

            target.set(pos, fill.clone());
            filled += 1;
            worklist.push_back(candidate);
        }
    }

    Ok(filled)
}

#[cfg(test)]
mod tests {
    use glam::I64Vec3;

    use super::*;
    use crate::coords::{ChunkShape, Interval};
    use crate::volume::DenseLabelVolume;

    fn two_label_volume() -> DenseLabelVolume {
        // x < 3 is label 1, the rest label 2
        DenseLabelVolume::from_fn(Interval::from_dims(I64Vec3::new(6, 4, 4)), |pos| {
            if pos.x < 3 { 1 } else { 2 }
        })
    }

    #[test]
    fn fill_stays_within_label() -> anyhow::Result<()> {
        let volume = two_label_volume();
        let mut mask = SparseVolume::new(ChunkShape::cube(2), false);

        let filled = flood_fill(
            &volume,
            &mut mask,
            I64Vec3::new(0, 0, 0),
            true,
            Neighborhood::Face,
            same_label,
        )?;

        assert_eq!(filled, 3 * 4 * 4);
        assert_eq!(mask.count(&true), 3 * 4 * 4);
        for pos in volume.interval().positions() {
            assert_eq!(*mask.get(pos), pos.x < 3, "{pos}");
        }
        Ok(())
    }

    #[test]
    fn fill_never_leaks_past_bounds() -> anyhow::Result<()> {
        let volume = DenseLabelVolume::new(Interval::from_dims(I64Vec3::splat(3)), 4);
        let mut mask = SparseVolume::new(ChunkShape::cube(2), false);

        let filled = flood_fill(
            &volume,
            &mut mask,
            I64Vec3::ONE,
            true,
            Neighborhood::Full,
            same_label,
        )?;

        assert_eq!(filled, 27);
        assert!(!*mask.get(I64Vec3::splat(-1)));
        assert!(!*mask.get(I64Vec3::new(3, 0, 0)));
        let bbox = mask.bounding_box().unwrap();
        assert_eq!(bbox, Interval::new(I64Vec3::ZERO, I64Vec3::splat(3)));
        Ok(())
    }

    #[test]
    fn permissive_predicate_may_cross_bounds() -> anyhow::Result<()> {
        let volume = DenseLabelVolume::new(Interval::from_dims(I64Vec3::ONE), 4);
        let mut mask = SparseVolume::new(ChunkShape::cube(4), false);

        let filled = flood_fill(
            &volume,
            &mut mask,
            I64Vec3::ZERO,
            true,
            Neighborhood::Face,
            |_, candidate| candidate.pos.x.abs() <= 1 && candidate.pos.y == 0 && candidate.pos.z == 0,
        )?;

        assert_eq!(filled, 3);
        assert!(*mask.get(I64Vec3::new(-1, 0, 0)));
        assert_eq!(mask.chunk_count(), 2);
        Ok(())
    }

    #[test]
    fn rerun_into_fresh_store_is_identical() -> anyhow::Result<()> {
        let volume = two_label_volume();
        let run = || -> anyhow::Result<SparseVolume<bool>> {
            let mut mask = SparseVolume::new(ChunkShape::new(2, 3, 5), false);
            flood_fill(
                &volume,
                &mut mask,
                I64Vec3::new(4, 2, 1),
                true,
                Neighborhood::Face,
                same_label,
            )?;
            Ok(mask)
        };

        let first = run()?;
        let second = run()?;
        assert!(first == second);
        assert_eq!(first.sorted_chunk_coords(), second.sorted_chunk_coords());
        Ok(())
    }

    #[test]
    fn refill_of_filled_region_writes_nothing() -> anyhow::Result<()> {
        let volume = two_label_volume();
        let mut mask = SparseVolume::new(ChunkShape::cube(2), false);
        let seed = I64Vec3::new(5, 3, 3);

        flood_fill(&volume, &mut mask, seed, true, Neighborhood::Face, same_label)?;
        let again = flood_fill(&volume, &mut mask, seed, true, Neighborhood::Face, same_label)?;

        assert_eq!(again, 0);
        Ok(())
    }
}
