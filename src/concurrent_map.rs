//! ConcurrentShrinkingMap: a `ShrinkingMap` behind one reader/writer lock,
//! with shrinks handed to a background worker.
//!
//! Every read takes the lock shared; every mutation takes it exclusively.
//! When a mutation leaves the deletion counter past the limit, the write
//! guard asks the map's `ShrinkWorker` for a shrink as it is released. The
//! worker takes the exclusive lock on its own and re-checks the counter, so
//! a shrink that became unnecessary in the meantime is skipped.

use crate::config::ShrinkConfig;
use crate::reentrancy::{OwnerMark, WriterTracker};
use crate::shrink_worker::{ShrinkJob, ShrinkWorker};
use crate::shrinking_map::ShrinkingMap;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::ops::{Deref, DerefMut};
use hashbrown::HashMap;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::hash_map::RandomState;
use std::sync::Arc;
use tracing::{trace, warn};

struct Shared<K, V, S> {
    table: RwLock<ShrinkingMap<K, V, S>>,
    writer: WriterTracker,
}

impl<K, V, S> Shared<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Clone,
{
    // Runs on the worker thread.
    fn shrink_if_due(&self) {
        let mut table = self.table.write();
        let _mark = self.writer.enter();
        if !table.shrink_if_due() {
            trace!("scheduled shrink no longer due");
        }
    }
}

/// Thread-safe map that shrinks its table after more than `limit`
/// deletions, off the caller's thread.
///
/// Share it with `Arc` or scoped threads. Readers run in parallel;
/// writers are serialized with everything else.
///
/// ```
/// use shrinking_map::ConcurrentShrinkingMap;
///
/// let m = ConcurrentShrinkingMap::new(1);
/// m.set("a", 1);
/// m.set("b", 2);
/// m.delete([&"a", &"b"]); // crosses the limit, shrink runs in background
/// m.wait_for_shrink();
/// assert_eq!(m.deleted(), 0);
/// assert_eq!(m.shrink_count(), 1);
/// ```
pub struct ConcurrentShrinkingMap<K, V, S = RandomState> {
    shared: Arc<Shared<K, V, S>>,
    worker: ShrinkWorker,
}

impl<K, V> ConcurrentShrinkingMap<K, V> {
    pub fn new(limit: u64) -> Self {
        Self::with_config(ShrinkConfig::new(limit))
    }

    pub fn with_config(config: ShrinkConfig) -> Self {
        Self::with_config_and_hasher(config, RandomState::new())
    }
}

impl<K, V, S: Default> Default for ConcurrentShrinkingMap<K, V, S> {
    fn default() -> Self {
        Self::with_config_and_hasher(ShrinkConfig::default(), S::default())
    }
}

impl<K, V, S> ConcurrentShrinkingMap<K, V, S> {
    pub fn with_hasher(limit: u64, hasher: S) -> Self {
        Self::with_config_and_hasher(ShrinkConfig::new(limit), hasher)
    }

    pub fn with_config_and_hasher(config: ShrinkConfig, hasher: S) -> Self {
        Self {
            shared: Arc::new(Shared {
                table: RwLock::new(ShrinkingMap::with_config_and_hasher(config, hasher)),
                writer: WriterTracker::new(),
            }),
            worker: ShrinkWorker::new(),
        }
    }

    fn lock_shared(&self) -> RwLockReadGuard<'_, ShrinkingMap<K, V, S>> {
        self.shared.writer.check();
        self.shared.table.read()
    }

    /// Acquire the shared lock for as long as the guard lives.
    pub fn read(&self) -> ReadGuard<'_, K, V, S> {
        ReadGuard {
            table: RwLockReadGuard::map(self.lock_shared(), |t| t.values()),
        }
    }

    /// The live table under the shared lock. Same as [`read`](Self::read).
    pub fn values(&self) -> ReadGuard<'_, K, V, S> {
        self.read()
    }

    /// Run `f` over the table with the shared lock held.
    pub fn with_read_lock<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&HashMap<K, V, S>) -> R,
    {
        f(self.lock_shared().values())
    }

    pub fn len(&self) -> usize {
        self.lock_shared().len()
    }
    pub fn is_empty(&self) -> bool {
        self.lock_shared().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock_shared().capacity()
    }

    /// Deletions recorded since the last shrink.
    pub fn deleted(&self) -> u64 {
        self.lock_shared().deleted()
    }

    pub fn limit(&self) -> u64 {
        self.lock_shared().limit()
    }

    pub fn shrink_count(&self) -> u64 {
        self.lock_shared().shrink_count()
    }

    pub fn config(&self) -> ShrinkConfig {
        self.lock_shared().config()
    }

    /// Block until no background shrink is scheduled or running.
    ///
    /// The worker needs the exclusive lock, so calling this while holding a
    /// guard from this map would never return; debug builds panic instead.
    pub fn wait_for_shrink(&self) {
        self.shared.writer.check();
        self.worker.wait_idle();
    }

    /// True while a background shrink is scheduled or running.
    pub fn shrink_pending(&self) -> bool {
        self.worker.is_busy()
    }
}

impl<K, V, S> ConcurrentShrinkingMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Clone,
{
    pub fn get<Q>(&self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone,
    {
        self.lock_shared().get(q).cloned()
    }

    /// The stored value, or `V::default()` when absent.
    pub fn get_or_default<Q>(&self, q: &Q) -> V
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone + Default,
    {
        self.lock_shared().get_or_default(q)
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.lock_shared().contains_key(q)
    }
}

impl<K, V, S> ConcurrentShrinkingMap<K, V, S>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    /// Acquire the exclusive lock for as long as the guard lives.
    ///
    /// Deletions made through the guard must be reported with
    /// [`WriteGuard::record_deletions`] to count toward the limit.
    pub fn write(&self) -> WriteGuard<'_, K, V, S> {
        self.shared.writer.check();
        let table = self.shared.table.write();
        WriteGuard {
            _mark: self.shared.writer.enter(),
            table,
            map: self,
            due: false,
        }
    }

    /// Run `f` over the table with the exclusive lock held. `f` returns how
    /// many entries it deleted; that count is added to the deletion counter
    /// before the lock is released.
    pub fn with_write_lock<F>(&self, f: F)
    where
        F: FnOnce(&mut HashMap<K, V, S>) -> u64,
    {
        let mut w = self.write();
        let deleted = f(&mut w);
        w.record_deletions(deleted);
    }

    pub fn set(&self, key: K, value: V) {
        self.write().table.set(key, value);
    }

    /// Existing value for `key`, or insert `value` and return it.
    pub fn get_or_set(&self, key: K, value: V) -> V
    where
        V: Clone,
    {
        let mut w = self.write();
        let stored = w.table.get_or_set(key, value).clone();
        stored
    }

    pub fn get_and_delete<Q>(&self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let mut w = self.write();
        let (value, due) = w.table.take(q);
        w.due |= due;
        value
    }

    pub fn delete<'q, Q, I>(&self, keys: I)
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq + 'q,
        I: IntoIterator<Item = &'q Q>,
    {
        let mut w = self.write();
        let due = w.table.remove_keys(keys);
        w.due |= due;
    }

    /// Shrink now, on the calling thread, under the exclusive lock.
    pub fn shrink(&self) {
        self.write().table.shrink();
    }

    /// Change the shrink threshold. Takes effect on the next deletion.
    pub fn set_limit(&self, limit: u64) {
        self.write().table.set_limit(limit);
    }

    fn schedule_shrink(&self, table: &mut ShrinkingMap<K, V, S>) {
        let shared = &self.shared;
        let scheduled = self.worker.schedule(|| -> ShrinkJob {
            let shared = Arc::clone(shared);
            Box::new(move || shared.shrink_if_due())
        });
        if let Err(err) = scheduled {
            warn!(error = %err, "could not start shrink worker, shrinking inline");
            table.shrink();
        }
    }
}

impl<K, V, S> fmt::Debug for ConcurrentShrinkingMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("ConcurrentShrinkingMap");
        match self.shared.table.try_read() {
            Some(table) => d.field("table", &*table),
            None => d.field("table", &format_args!("<locked>")),
        };
        d.field("worker", &self.worker).finish()
    }
}

/// Shared-lock guard over the table. Derefs to the underlying `HashMap`.
pub struct ReadGuard<'a, K, V, S = RandomState> {
    table: MappedRwLockReadGuard<'a, HashMap<K, V, S>>,
}

impl<'a, K, V, S> Deref for ReadGuard<'a, K, V, S> {
    type Target = HashMap<K, V, S>;
    fn deref(&self) -> &Self::Target {
        &self.table
    }
}

impl<'a, K, V, S> fmt::Debug for ReadGuard<'a, K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.table, f)
    }
}

/// Exclusive-lock guard over the table. Derefs mutably to the underlying
/// `HashMap`.
///
/// On drop, reported deletions are folded into the counter and, if the
/// limit is crossed, a background shrink is requested before the lock is
/// released.
pub struct WriteGuard<'a, K, V, S = RandomState>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    // Declared before `table`: the owner mark must clear before unlocking.
    _mark: OwnerMark<'a>,
    table: RwLockWriteGuard<'a, ShrinkingMap<K, V, S>>,
    map: &'a ConcurrentShrinkingMap<K, V, S>,
    due: bool,
}

impl<'a, K, V, S> WriteGuard<'a, K, V, S>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    /// Count `n` deletions performed directly on the table.
    pub fn record_deletions(&mut self, n: u64) {
        self.due |= self.table.record_deletions(n);
    }

    /// Deletions recorded since the last shrink, including this guard's.
    pub fn deleted(&self) -> u64 {
        self.table.deleted()
    }
}

impl<'a, K, V, S> Deref for WriteGuard<'a, K, V, S>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    type Target = HashMap<K, V, S>;
    fn deref(&self) -> &Self::Target {
        self.table.values()
    }
}

impl<'a, K, V, S> DerefMut for WriteGuard<'a, K, V, S>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.table.table_mut()
    }
}

impl<'a, K, V, S> Drop for WriteGuard<'a, K, V, S>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.due {
            let map = self.map;
            map.schedule_shrink(&mut self.table);
        }
    }
}
