use std::sync::atomic::{AtomicU64, Ordering};

use crate::label::{BACKGROUND, LabelId, MAX_ID};

/// Issues label ids that are unique for the lifetime of the process.
pub trait IdAllocator: Send + Sync {
    fn next(&self) -> LabelId;
}

#[derive(Debug)]
pub struct SequentialIdAllocator {
    next: AtomicU64,
}

impl SequentialIdAllocator {
    /// Allocator whose first id is `last + 1`.
    pub fn starting_after(last: LabelId) -> Self {
        Self {
            next: AtomicU64::new(last.saturating_add(1)),
        }
    }

    /// Id the next call to [`IdAllocator::next`] returns.
    pub fn peek(&self) -> LabelId {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for SequentialIdAllocator {
    fn default() -> Self {
        Self::starting_after(BACKGROUND)
    }
}

impl IdAllocator for SequentialIdAllocator {
    fn next(&self) -> LabelId {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        assert!(
            id != BACKGROUND && id <= MAX_ID,
            "id allocator exhausted at {id}"
        );
        id
    }
}
