//! Deletion accounting: counts removals since the last shrink and decides
//! when the next one is due.
//!
//! The counter never performs a shrink itself. Callers record deletions,
//! inspect the returned verdict, and call `reset` once the table has been
//! rebuilt. This keeps the "when" separate from the "how" so the concurrent
//! map can hand the rebuild to its worker.

use crate::config::ShrinkConfig;

/// Running deletion count plus the threshold it is compared against.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct DeletionCounter {
    deleted: u64,
    limit: u64,
}

impl DeletionCounter {
    pub(crate) fn new(config: &ShrinkConfig) -> Self {
        Self {
            deleted: 0,
            limit: config.limit(),
        }
    }

    #[inline]
    pub(crate) fn deleted(&self) -> u64 {
        self.deleted
    }

    #[inline]
    pub(crate) fn limit(&self) -> u64 {
        self.limit
    }

    pub(crate) fn set_limit(&mut self, limit: u64) {
        self.limit = limit;
    }

    /// Add `n` deletions. Returns true if a shrink is now due.
    #[inline]
    pub(crate) fn record(&mut self, n: u64) -> bool {
        self.deleted = self.deleted.saturating_add(n);
        self.exceeded()
    }

    /// True when automatic shrinking is enabled and the count is past the limit.
    #[inline]
    pub(crate) fn exceeded(&self) -> bool {
        self.limit != 0 && self.deleted > self.limit
    }

    /// Called once a shrink has completed.
    #[inline]
    pub(crate) fn reset(&mut self) {
        self.deleted = 0;
    }

    /// Capacity for the rebuilt table: `len - deleted`, floored at zero.
    #[inline]
    pub(crate) fn target_capacity(&self, len: usize) -> usize {
        let deleted = usize::try_from(self.deleted).unwrap_or(usize::MAX);
        len.saturating_sub(deleted)
    }
}
