//! ShrinkingMap: single-threaded map that rebuilds its table after enough deletions.

use crate::config::{DeleteAccounting, ShrinkConfig};
use crate::deletions::DeletionCounter;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use hashbrown::HashMap;
use std::collections::hash_map::RandomState;
use tracing::debug;

/// A `HashMap` that tracks deletions and shrinks its allocation once more
/// than `limit` of them have accumulated.
///
/// Mutation takes `&mut self`, so the borrow checker already rules out
/// concurrent use. For shared access across threads use
/// [`ConcurrentShrinkingMap`](crate::ConcurrentShrinkingMap).
///
/// ```
/// use shrinking_map::ShrinkingMap;
///
/// let mut m = ShrinkingMap::new(2);
/// m.set("a", 1);
/// m.set("b", 2);
/// m.delete([&"a"]);
/// m.delete([&"b"]);
/// assert_eq!(m.deleted(), 2);
/// m.delete([&"c"]); // third deletion crosses the limit
/// assert_eq!(m.deleted(), 0);
/// assert_eq!(m.shrink_count(), 1);
/// assert!(m.is_empty());
/// ```
#[derive(Clone)]
pub struct ShrinkingMap<K, V, S = RandomState> {
    table: HashMap<K, V, S>,
    counter: DeletionCounter,
    accounting: DeleteAccounting,
    shrinks: u64,
}

impl<K, V> ShrinkingMap<K, V> {
    /// Map that shrinks after more than `limit` deletions; `0` disables it.
    pub fn new(limit: u64) -> Self {
        Self::with_config(ShrinkConfig::new(limit))
    }

    pub fn with_config(config: ShrinkConfig) -> Self {
        Self::with_config_and_hasher(config, RandomState::new())
    }
}

impl<K, V, S: Default> Default for ShrinkingMap<K, V, S> {
    fn default() -> Self {
        Self::with_config_and_hasher(ShrinkConfig::default(), S::default())
    }
}

impl<K, V, S> ShrinkingMap<K, V, S> {
    pub fn with_hasher(limit: u64, hasher: S) -> Self {
        Self::with_config_and_hasher(ShrinkConfig::new(limit), hasher)
    }

    pub fn with_config_and_hasher(config: ShrinkConfig, hasher: S) -> Self {
        Self {
            table: HashMap::with_hasher(hasher),
            counter: DeletionCounter::new(&config),
            accounting: config.accounting(),
            shrinks: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Capacity of the current backing table.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Deletions recorded since the last shrink.
    pub fn deleted(&self) -> u64 {
        self.counter.deleted()
    }

    pub fn limit(&self) -> u64 {
        self.counter.limit()
    }

    /// Change the shrink threshold. Takes effect on the next deletion; a
    /// lowered limit does not shrink on its own.
    pub fn set_limit(&mut self, limit: u64) {
        self.counter.set_limit(limit);
    }

    /// Number of shrinks completed since construction.
    pub fn shrink_count(&self) -> u64 {
        self.shrinks
    }

    pub fn config(&self) -> ShrinkConfig {
        ShrinkConfig::new(self.counter.limit()).with_accounting(self.accounting)
    }

    /// The live table. No copy is made.
    pub fn values(&self) -> &HashMap<K, V, S> {
        &self.table
    }

    pub(crate) fn table_mut(&mut self) -> &mut HashMap<K, V, S> {
        &mut self.table
    }
}

impl<K, V, S> ShrinkingMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Clone,
{
    /// Insert or overwrite.
    pub fn set(&mut self, key: K, value: V) {
        self.table.insert(key, value);
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.get(q)
    }

    /// The stored value, or `V::default()` when absent. Use [`get`](Self::get)
    /// to tell the two apart.
    pub fn get_or_default<Q>(&self, q: &Q) -> V
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone + Default,
    {
        self.table.get(q).cloned().unwrap_or_default()
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.contains_key(q)
    }

    /// Existing value for `key`, or insert `value` and return it.
    pub fn get_or_set(&mut self, key: K, value: V) -> &V {
        self.table.entry(key).or_insert(value)
    }

    /// Remove and return the value for `q`. A successful removal counts as
    /// one deletion and may shrink before returning.
    pub fn get_and_delete<Q>(&mut self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let (value, due) = self.take(q);
        if due {
            self.shrink();
        }
        value
    }

    /// Remove every key in `keys`, then shrink if the limit was crossed.
    ///
    /// How keys are charged to the deletion counter depends on the
    /// configured [`DeleteAccounting`].
    pub fn delete<'q, Q, I>(&mut self, keys: I)
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq + 'q,
        I: IntoIterator<Item = &'q Q>,
    {
        if self.remove_keys(keys) {
            self.shrink();
        }
    }

    /// Rebuild the table into a smaller allocation sized for the live
    /// entries and reset the deletion counter. Contents are unchanged.
    ///
    /// If a key's `Hash` panics during the rebuild, the old table is kept
    /// as it was and the counter is left untouched.
    pub fn shrink(&mut self) {
        let capacity = self.counter.target_capacity(self.table.len());
        let capacity_before = self.table.capacity();
        self.table.shrink_to(capacity);

        let reclaimed = self.counter.deleted();
        self.counter.reset();
        self.shrinks += 1;
        debug!(
            entries = self.table.len(),
            capacity_before,
            capacity_after = self.table.capacity(),
            deletions = reclaimed,
            "shrank table"
        );
    }

    /// Removal without the inline shrink. Returns the value and whether a
    /// shrink is now due.
    pub(crate) fn take<Q>(&mut self, q: &Q) -> (Option<V>, bool)
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        match self.table.remove(q) {
            Some(v) => (Some(v), self.counter.record(1)),
            None => (None, false),
        }
    }

    /// Batch removal without the inline shrink. Returns whether a shrink is
    /// now due.
    pub(crate) fn remove_keys<'q, Q, I>(&mut self, keys: I) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq + 'q,
        I: IntoIterator<Item = &'q Q>,
    {
        let mut charged = 0u64;
        for key in keys {
            let removed = self.table.remove(key).is_some();
            if removed || self.accounting == DeleteAccounting::PerKey {
                charged += 1;
            }
        }
        self.counter.record(charged)
    }

    /// Fold deletions performed directly on the table. Returns whether a
    /// shrink is now due.
    pub(crate) fn record_deletions(&mut self, n: u64) -> bool {
        self.counter.record(n)
    }

    /// Shrink only if the counter is still past the limit.
    pub(crate) fn shrink_if_due(&mut self) -> bool {
        if self.counter.exceeded() {
            self.shrink();
            true
        } else {
            false
        }
    }
}

impl<K, V, S> Extend<(K, V)> for ShrinkingMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        self.table.extend(iter);
    }
}

impl<K, V, S> FromIterator<(K, V)> for ShrinkingMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut m = Self::default();
        m.extend(iter);
        m
    }
}

impl<K, V, S> fmt::Debug for ShrinkingMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShrinkingMap")
            .field("len", &self.table.len())
            .field("capacity", &self.table.capacity())
            .field("deleted", &self.counter.deleted())
            .field("limit", &self.counter.limit())
            .field("accounting", &self.accounting)
            .field("shrinks", &self.shrinks)
            .finish()
    }
}
