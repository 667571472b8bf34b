use std::collections::BTreeMap;

use hashbrown::HashSet;

use crate::coords::Interval;
use crate::label::LabelId;
use crate::sparse::Mask;

/// Everything one paint stroke hands to the solver. Immutable once built.
#[derive(Debug, Clone)]
pub struct AnnotationTask {
    uuid: String,
    id: LabelId,
    new_ids: Vec<LabelId>,
    invalidated_ids: Vec<LabelId>,
    masks: BTreeMap<LabelId, Mask>,
    bounds: Interval,
}

fn sorted_unique(mut ids: Vec<LabelId>) -> Vec<LabelId> {
    ids.sort_unstable();
    ids.dedup();
    ids
}

impl AnnotationTask {
    /// Task for a stroke on label `id`; the uuid is the label in decimal.
    pub fn new(
        id: LabelId,
        new_ids: Vec<LabelId>,
        invalidated_ids: Vec<LabelId>,
        masks: BTreeMap<LabelId, Mask>,
        bounds: Interval,
    ) -> Self {
        Self::from_parts(id.to_string(), id, new_ids, invalidated_ids, masks, bounds)
    }

    pub fn from_parts(
        uuid: String,
        id: LabelId,
        new_ids: Vec<LabelId>,
        invalidated_ids: Vec<LabelId>,
        masks: BTreeMap<LabelId, Mask>,
        bounds: Interval,
    ) -> Self {
        Self {
            uuid,
            id,
            new_ids: sorted_unique(new_ids),
            invalidated_ids: sorted_unique(invalidated_ids),
            masks,
            bounds,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Label the stroke started on; also the priority key.
    pub fn id(&self) -> LabelId {
        self.id
    }

    pub fn new_ids(&self) -> &[LabelId] {
        &self.new_ids
    }

    pub fn invalidated_ids(&self) -> &[LabelId] {
        &self.invalidated_ids
    }

    pub fn masks(&self) -> &BTreeMap<LabelId, Mask> {
        &self.masks
    }

    /// Chunk-aligned voxel bounds of the stroke.
    pub fn bounds(&self) -> Interval {
        self.bounds
    }

    pub fn id_set(&self) -> HashSet<LabelId> {
        self.new_ids.iter().copied().collect()
    }

    /// Ordering key of the scheduler, lowest first.
    pub fn priority(&self) -> (LabelId, &str) {
        (self.id, &self.uuid)
    }
}

#[cfg(test)]
mod tests {
    use glam::I64Vec3;

    use super::*;

    #[test]
    fn ids_are_sorted_and_unique() {
        let task = AnnotationTask::new(
            12,
            vec![30, 12, 30, 4],
            vec![9, 9],
            BTreeMap::new(),
            Interval::from_dims(I64Vec3::ONE),
        );

        assert_eq!(task.uuid(), "12");
        assert_eq!(task.new_ids(), &[4, 12, 30]);
        assert_eq!(task.invalidated_ids(), &[9]);
        assert_eq!(task.priority(), (12, "12"));
    }
}
