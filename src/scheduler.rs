//! Deferred-write queue.
//!
//! Every element mutation and every scope-driven re-render goes through a
//! [`Scheduler`]. Jobs run in FIFO order on [`Scheduler::flush`]; jobs
//! scheduled while a flush is running are picked up by the same flush.
//!
//! # Invariants
//!
//! 1. Jobs run in the order they were deferred.
//! 2. A job guarded by a killed [`LiveToken`] is dropped without running.
//! 3. `flush` returns only once the queue is empty.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

type Job = Box<dyn FnOnce()>;

struct Deferred {
    guard: Option<LiveToken>,
    job: Job,
}

/// Shared liveness flag. Cloning yields a handle to the same flag.
#[derive(Clone, Debug)]
pub struct LiveToken(Rc<Cell<bool>>);

impl LiveToken {
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(true)))
    }

    pub fn is_live(&self) -> bool {
        self.0.get()
    }

    pub fn kill(&self) {
        self.0.set(false);
    }
}

impl Default for LiveToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct SchedulerInner {
    queue: RefCell<VecDeque<Deferred>>,
    flushing: Cell<bool>,
    flushes: Cell<u64>,
}

/// FIFO deferred-write facility. Cloning yields a handle to the same queue.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .field("flushes", &self.inner.flushes.get())
            .finish()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer(&self, job: impl FnOnce() + 'static) {
        self.push(None, Box::new(job));
    }

    /// Defer a job that is skipped if `token` is killed before it runs.
    pub fn defer_guarded(&self, token: &LiveToken, job: impl FnOnce() + 'static) {
        self.push(Some(token.clone()), Box::new(job));
    }

    fn push(&self, guard: Option<LiveToken>, job: Job) {
        self.inner.queue.borrow_mut().push_back(Deferred { guard, job });
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Number of completed flushes that ran at least one job.
    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.get()
    }

    /// Run queued jobs until the queue is empty. Returns the number of jobs
    /// that actually ran (cancelled jobs are not counted).
    ///
    /// A nested call from inside a job is a no-op; the outer flush drains
    /// whatever the job scheduled.
    pub fn flush(&self) -> usize {
        if self.inner.flushing.replace(true) {
            return 0;
        }
        let _reset = FlushReset(&self.inner.flushing);
        let mut ran = 0;
        let mut skipped = 0;
        loop {
            // Keep the borrow short: jobs schedule more jobs.
            let next = self.inner.queue.borrow_mut().pop_front();
            let Some(deferred) = next else { break };
            if deferred.guard.as_ref().is_some_and(|token| !token.is_live()) {
                skipped += 1;
                continue;
            }
            (deferred.job)();
            ran += 1;
        }
        if ran > 0 {
            self.inner.flushes.set(self.inner.flushes.get() + 1);
        }
        trace!(ran, skipped, "flushed deferred writes");
        ran
    }
}

/// Clears the `flushing` flag even when a job unwinds.
struct FlushReset<'a>(&'a Cell<bool>);

impl Drop for FlushReset<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            scheduler.defer(move || log.borrow_mut().push(i));
        }
        assert_eq!(scheduler.pending(), 3);
        assert!(log.borrow().is_empty());
        assert_eq!(scheduler.flush(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_jobs_scheduled_during_flush_run_in_same_flush() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner_log = log.clone();
        let inner_scheduler = scheduler.clone();
        scheduler.defer(move || {
            inner_log.borrow_mut().push("outer");
            let log = inner_log.clone();
            inner_scheduler.defer(move || log.borrow_mut().push("inner"));
        });
        assert_eq!(scheduler.flush(), 2);
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
        assert_eq!(scheduler.flush_count(), 1);
    }

    #[test]
    fn test_killed_token_cancels_queued_write() {
        let scheduler = Scheduler::new();
        let token = LiveToken::new();
        let hit = Rc::new(Cell::new(false));
        let flag = hit.clone();
        scheduler.defer_guarded(&token, move || flag.set(true));
        token.kill();
        assert_eq!(scheduler.flush(), 0);
        assert!(!hit.get());
    }

    #[test]
    fn test_panicking_job_does_not_wedge_flush() {
        let scheduler = Scheduler::new();
        scheduler.defer(|| panic!("job failed"));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| scheduler.flush()));
        assert!(result.is_err());

        let hit = Rc::new(Cell::new(false));
        let flag = hit.clone();
        scheduler.defer(move || flag.set(true));
        assert_eq!(scheduler.flush(), 1);
        assert!(hit.get());
    }
}
