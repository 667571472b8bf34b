use hashbrown::{HashMap, HashSet};
use tracing::trace;

use crate::label::LabelId;

/// Fragment to segment lookup with merge and detach.
pub trait FragmentSegmentAssignment: Send {
    fn segment(&self, fragment: LabelId) -> LabelId;
    /// Moves every fragment of `b`'s segment into `a`'s segment.
    fn assign_fragments(&mut self, a: LabelId, b: LabelId);
    /// Makes `fragment` a segment of its own.
    fn detach_fragment(&mut self, fragment: LabelId);
    fn fragments(&self, segment: LabelId) -> HashSet<LabelId>;
}

/// Assignment kept in memory. A fragment never assigned is its own segment.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAssignment {
    segment_of: HashMap<LabelId, LabelId>,
    members: HashMap<LabelId, HashSet<LabelId>>,
}

impl InMemoryAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_members(&mut self, segment: LabelId) -> HashSet<LabelId> {
        self.members
            .remove(&segment)
            .unwrap_or_else(|| HashSet::from([segment]))
    }
}

impl FragmentSegmentAssignment for InMemoryAssignment {
    fn segment(&self, fragment: LabelId) -> LabelId {
        self.segment_of.get(&fragment).copied().unwrap_or(fragment)
    }

    fn assign_fragments(&mut self, a: LabelId, b: LabelId) {
        let into = self.segment(a);
        let from = self.segment(b);
        if into == from {
            return;
        }

        let moved = self.take_members(from);
        let mut members = self.take_members(into);
        for &fragment in moved.iter() {
            self.segment_of.insert(fragment, into);
        }
        members.extend(moved);
        self.segment_of.insert(into, into);
        self.members.insert(into, members);
        trace!(into, from, "Merged segments");
    }

    fn detach_fragment(&mut self, fragment: LabelId) {
        let segment = self.segment(fragment);
        let mut members = self.take_members(segment);
        members.remove(&fragment);
        self.segment_of.remove(&fragment);

        if members.is_empty() {
            return;
        }
        // the rest keeps the old segment id unless that id was the detached
        // fragment itself; then the smallest remaining member names it
        let remaining = if segment == fragment {
            members.iter().copied().min().unwrap_or(segment)
        } else {
            segment
        };
        if members.len() == 1 && members.contains(&remaining) {
            self.segment_of.remove(&remaining);
            return;
        }
        for &member in members.iter() {
            self.segment_of.insert(member, remaining);
        }
        self.members.insert(remaining, members);
    }

    fn fragments(&self, segment: LabelId) -> HashSet<LabelId> {
        match self.members.get(&segment) {
            Some(members) => members.clone(),
            None if self.segment(segment) == segment => HashSet::from([segment]),
            None => HashSet::new(),
        }
    }
}
