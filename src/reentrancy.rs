//! Debug-only detection of reentrant lock acquisition.
//!
//! A reader/writer lock deadlocks when the thread holding it in exclusive
//! mode asks for it again, in either mode. In debug builds the concurrent
//! map records which thread owns its exclusive lock and panics on such a
//! request instead of hanging. In release builds this compiles to a
//! zero-cost no-op and the standard deadlock applies.

#[cfg(not(debug_assertions))]
use core::marker::PhantomData;
#[cfg(debug_assertions)]
use core::sync::atomic::{AtomicU64, Ordering};

#[cfg(debug_assertions)]
fn thread_tag() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    std::thread_local! {
        static TAG: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TAG.with(|t| *t)
}

/// Per-lock owner tracker. Call `check` before acquiring the lock and
/// `enter` right after acquiring it exclusively.
#[derive(Debug, Default)]
pub(crate) struct WriterTracker {
    // 0 means no thread holds the exclusive lock.
    #[cfg(debug_assertions)]
    owner: AtomicU64,
}

impl WriterTracker {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            owner: AtomicU64::new(0),
        }
    }

    /// Panics in debug builds if the calling thread already holds the
    /// exclusive lock this tracker belongs to.
    #[inline]
    pub(crate) fn check(&self) {
        #[cfg(debug_assertions)]
        {
            // Only the owning thread ever stores its own tag, so seeing it
            // here means this thread is the owner.
            assert!(
                self.owner.load(Ordering::Relaxed) != thread_tag(),
                "reentrancy detected: lock requested by the thread holding it exclusively"
            );
        }
    }

    /// Mark the calling thread as the exclusive owner until the returned
    /// mark is dropped.
    #[inline]
    pub(crate) fn enter(&self) -> OwnerMark<'_> {
        #[cfg(debug_assertions)]
        {
            self.owner.store(thread_tag(), Ordering::Relaxed);
            OwnerMark { tracker: self }
        }

        #[cfg(not(debug_assertions))]
        {
            OwnerMark { _z: PhantomData }
        }
    }
}

/// RAII mark returned by `WriterTracker::enter`. Must be dropped before the
/// write guard it accompanies.
pub(crate) struct OwnerMark<'a> {
    #[cfg(debug_assertions)]
    tracker: &'a WriterTracker,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl<'a> Drop for OwnerMark<'a> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            self.tracker.owner.store(0, Ordering::Relaxed);
        }
    }
}
