//! shrinking-map: a `HashMap` that gives memory back after deletions,
//! in a single-threaded and a concurrent flavor.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: reclaim the allocation a hash table keeps after entries are
//!   removed, without paying for a rebuild on every delete.
//! - Layers:
//!   - DeletionCounter: counts deletions since the last shrink and decides
//!     when the next one is due; it never rebuilds anything itself.
//!   - ShrinkingMap<K, V, S>: owns a `hashbrown::HashMap` and a counter;
//!     deletions that cross the limit rebuild the table before returning.
//!   - ConcurrentShrinkingMap<K, V, S>: a `ShrinkingMap` behind one
//!     `parking_lot::RwLock`; crossing the limit hands the rebuild to a
//!     per-map background worker instead of doing it inline.
//!
//! Shrink policy
//! - Each deletion adds one to the counter. With a nonzero limit, the
//!   counter exceeding the limit triggers a shrink; a zero limit disables
//!   automatic shrinking.
//! - A shrink rebuilds the table into an allocation sized for
//!   `len - deleted` entries (never below `len`) and resets the counter.
//!   Contents are never changed by a shrink, even if hashing panics
//!   midway.
//! - `delete` charges per key argument by default, present or not. See
//!   `DeleteAccounting` to charge only real removals.
//!
//! Concurrency
//! - Reads take the lock shared, mutations exclusively; table and counter
//!   are always updated together.
//! - The background shrink takes the exclusive lock like any writer, so
//!   readers see either the old or the new table, never a mix.
//! - Requests to the worker coalesce, and the worker re-checks the counter
//!   when it runs, so back-to-back crossings shrink once.
//! - Dropping a concurrent map runs any pending shrink and joins the worker.
//! - Raw lock/unlock is not exposed; `read`/`write` return guards and
//!   `with_read_lock`/`with_write_lock` run a closure under the lock.
//! - Debug builds panic when a thread holding the exclusive lock asks for
//!   the lock again, instead of deadlocking.
//!
//! Notes and non-goals
//! - No growth policy of its own; `hashbrown` grows the table as usual.
//! - No ordering guarantees; no persistence.
//! - Logging goes through `tracing`; the crate installs no subscriber.

mod concurrent_map;
mod config;
mod deletions;
mod reentrancy;
mod shrink_worker;
mod shrinking_map;

// Public surface
pub use concurrent_map::{ConcurrentShrinkingMap, ReadGuard, WriteGuard};
pub use config::{DeleteAccounting, ShrinkConfig};
pub use shrinking_map::ShrinkingMap;

/// The table type handed out by `values`, `read`, `write` and the lock
/// callbacks.
pub use hashbrown::HashMap;
