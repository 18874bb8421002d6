//! ShrinkWorker: per-map background thread that runs scheduled shrinks.
//!
//! Phases: Idle -> Scheduled -> Running -> Idle. A request made while one
//! is already Scheduled is absorbed by it; a request made while Running
//! schedules exactly one follow-up. The scheduling state lives behind its
//! own mutex, which is never held while the shrink job runs, so a caller
//! may schedule while holding the map's exclusive lock.
//!
//! The thread is spawned on the first request. Dropping the worker runs
//! any pending request, then joins the thread.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{trace, warn};

/// Work run by the worker for each request. Must look at the current
/// state when it runs, not at state captured when it was scheduled.
pub(crate) type ShrinkJob = Box<dyn Fn() + Send + 'static>;

#[derive(Debug, Default)]
struct Phase {
    scheduled: bool,
    running: bool,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Signal {
    phase: Mutex<Phase>,
    wake: Condvar,
    idle: Condvar,
}

pub(crate) struct ShrinkWorker {
    signal: Arc<Signal>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ShrinkWorker {
    pub(crate) fn new() -> Self {
        Self {
            signal: Arc::new(Signal::default()),
            thread: Mutex::new(None),
        }
    }

    /// Request a shrink without waiting for it. `make_job` is only called
    /// when the thread has to be started.
    ///
    /// Fails only if the thread could not be spawned; the request is then
    /// dropped and the caller should shrink inline.
    pub(crate) fn schedule<F>(&self, make_job: F) -> io::Result<()>
    where
        F: FnOnce() -> ShrinkJob,
    {
        {
            let mut thread = self.thread.lock();
            if thread.is_none() {
                let signal = Arc::clone(&self.signal);
                let job = make_job();
                let handle = thread::Builder::new()
                    .name("shrink-worker".to_string())
                    .spawn(move || run(&signal, job))?;
                *thread = Some(handle);
            }
        }

        let mut phase = self.signal.phase.lock();
        if phase.scheduled {
            trace!("shrink already scheduled");
            return Ok(());
        }
        phase.scheduled = true;
        self.signal.wake.notify_one();
        trace!(running = phase.running, "shrink scheduled");
        Ok(())
    }

    /// Block until nothing is scheduled or running.
    pub(crate) fn wait_idle(&self) {
        let mut phase = self.signal.phase.lock();
        while phase.scheduled || phase.running {
            self.signal.idle.wait(&mut phase);
        }
    }

    /// True while a request is scheduled or running.
    pub(crate) fn is_busy(&self) -> bool {
        let phase = self.signal.phase.lock();
        phase.scheduled || phase.running
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.signal.phase.lock().running
    }

    #[cfg(test)]
    fn is_started(&self) -> bool {
        self.thread.lock().is_some()
    }
}

impl Default for ShrinkWorker {
    fn default() -> Self {
        Self::new()
    }
}

fn run(signal: &Signal, job: ShrinkJob) {
    loop {
        {
            let mut phase = signal.phase.lock();
            while !phase.scheduled && !phase.shutdown {
                signal.wake.wait(&mut phase);
            }
            if !phase.scheduled {
                break;
            }
            phase.scheduled = false;
            phase.running = true;
        }

        if catch_unwind(AssertUnwindSafe(&job)).is_err() {
            warn!("background shrink panicked");
        }

        let mut phase = signal.phase.lock();
        phase.running = false;
        signal.idle.notify_all();
    }
    trace!("shrink worker stopped");
}

impl Drop for ShrinkWorker {
    fn drop(&mut self) {
        self.signal.phase.lock().shutdown = true;
        self.signal.wake.notify_one();
        if let Some(handle) = self.thread.get_mut().take() {
            if handle.join().is_err() {
                warn!("shrink worker exited abnormally");
            }
        }
    }
}

impl fmt::Debug for ShrinkWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = self.signal.phase.lock();
        f.debug_struct("ShrinkWorker")
            .field("scheduled", &phase.scheduled)
            .field("running", &phase.running)
            .finish()
    }
}
