//! Construction-time settings shared by both map variants.

/// How `delete` charges the deletion counter.
///
/// `get_and_delete` is unaffected: it only ever counts a removal that
/// actually happened.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum DeleteAccounting {
    /// Every key passed to `delete` counts, whether or not it was present.
    /// Repeatedly deleting absent keys can therefore trigger shrinks that
    /// reclaim nothing.
    #[default]
    PerKey,
    /// Only keys that were present and got removed count.
    RemovedOnly,
}

/// Shrink policy for a map.
///
/// A `limit` of zero disables automatic shrinking; `shrink()` can still be
/// called explicitly.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ShrinkConfig {
    limit: u64,
    accounting: DeleteAccounting,
}

impl ShrinkConfig {
    /// Shrink once more than `limit` deletions have accumulated.
    pub const fn new(limit: u64) -> Self {
        Self {
            limit,
            accounting: DeleteAccounting::PerKey,
        }
    }

    /// Never shrink automatically.
    pub const fn disabled() -> Self {
        Self::new(0)
    }

    pub const fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub const fn with_accounting(mut self, accounting: DeleteAccounting) -> Self {
        self.accounting = accounting;
        self
    }

    pub const fn limit(&self) -> u64 {
        self.limit
    }

    pub const fn accounting(&self) -> DeleteAccounting {
        self.accounting
    }

    /// True when deletions can trigger a shrink on their own.
    pub const fn auto_shrinks(&self) -> bool {
        self.limit != 0
    }
}
