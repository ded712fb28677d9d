//! Unbounded pool of reusable threads for asynchronous forks.
//!
//! Jobs are handed off through a zero-capacity channel: a submission either
//! meets an idle worker blocked in `recv` or spawns a new worker carrying the
//! job. Idle workers retire after the keep-alive period.

use super::pool::PoolLifecycle;
use crate::error::{QueryError, QueryResult};
use core::time::Duration;
use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use log::{error, trace, warn};
use parking_lot::{Condvar, Mutex};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

/// A job run by the pool.
type Job = Box<dyn FnOnce() + Send + 'static>;

/// Count of submitted jobs that have not finished yet.
#[derive(Default)]
struct Inflight {
    #[allow(clippy::mutex_integer, reason = "paired with a condvar for draining")]
    count: Mutex<usize>,
    drained: Condvar,
}

impl Inflight {
    fn enter(&self) {
        *self.count.lock() += 1;
    }

    fn leave(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    fn pending(&self) -> usize {
        *self.count.lock()
    }

    /// Wait until no job is in flight; false if `grace` ran out first.
    ///
    /// A `grace` too large to express as a deadline waits without one.
    fn wait_drained(&self, grace: Duration) -> bool {
        let deadline = Instant::now().checked_add(grace);
        let mut count = self.count.lock();
        while *count > 0 {
            match deadline {
                Some(deadline) => {
                    if self.drained.wait_until(&mut count, deadline).timed_out() {
                        return *count == 0;
                    }
                }
                None => self.drained.wait(&mut count),
            }
        }
        true
    }
}

/// Cached thread pool with hand-off submission.
pub struct CachedPool {
    handoff: Mutex<Option<Sender<Job>>>,
    receiver: Receiver<Job>,
    inflight: Arc<Inflight>,
    keep_alive: Duration,
    next_worker: AtomicUsize,
    terminated: AtomicBool,
}

impl CachedPool {
    /// Create an empty pool; workers are spawned on first use.
    pub fn new(keep_alive: Duration) -> Self {
        let (sender, receiver) = bounded(0);
        Self {
            handoff: Mutex::new(Some(sender)),
            receiver,
            inflight: Arc::new(Inflight::default()),
            keep_alive,
            next_worker: AtomicUsize::new(0),
            terminated: AtomicBool::new(false),
        }
    }

    /// Run `job` on an idle worker, or on a new one if none is idle.
    ///
    /// # Errors
    ///
    /// Fails if the pool was shut down or a worker thread cannot be spawned.
    pub fn execute<F>(&self, job: F) -> QueryResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handoff = self.handoff.lock();
        let Some(sender) = handoff.as_ref() else {
            return Err(QueryError::scheduler_fault(
                "asynchronous pool has been shut down",
            ));
        };

        self.inflight.enter();
        match sender.try_send(Box::new(job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => self.spawn_worker(job),
            Err(TrySendError::Disconnected(_)) => {
                self.inflight.leave();
                Err(QueryError::scheduler_fault(
                    "asynchronous pool queue is closed",
                ))
            }
        }
    }

    /// Number of submitted jobs that have not finished.
    #[inline]
    pub fn pending(&self) -> usize {
        self.inflight.pending()
    }

    fn spawn_worker(&self, first: Job) -> QueryResult<()> {
        let id = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let receiver = self.receiver.clone();
        let inflight = Arc::clone(&self.inflight);
        let keep_alive = self.keep_alive;

        let spawned = thread::Builder::new()
            .name(format!("promise-async-{id}"))
            .spawn(move || worker_loop(first, &receiver, &inflight, keep_alive));

        match spawned {
            Ok(_detached) => {
                trace!("spawned asynchronous worker {id}");
                Ok(())
            }
            Err(err) => {
                self.inflight.leave();
                Err(QueryError::scheduler_fault(format!(
                    "cannot spawn asynchronous worker: {err}"
                )))
            }
        }
    }
}

impl PoolLifecycle for CachedPool {
    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Waits up to `grace` for in-flight jobs, then closes the queue. Workers
    /// still running a job are detached; they exit when it returns.
    fn shutdown(&self, grace: Duration) {
        self.terminated.store(true, Ordering::Release);
        if !self.inflight.wait_drained(grace) {
            warn!(
                "{} asynchronous task(s) still running after {grace:?}; detaching them",
                self.inflight.pending()
            );
        }
        self.handoff.lock().take();
    }
}

fn worker_loop(first: Job, receiver: &Receiver<Job>, inflight: &Inflight, keep_alive: Duration) {
    run_job(first, inflight);
    // Timeout retires an idle worker; disconnection means the pool shut down.
    while let Ok(job) = receiver.recv_timeout(keep_alive) {
        run_job(job, inflight);
    }
    trace!("asynchronous worker retiring");
}

fn run_job(job: Job, inflight: &Inflight) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        error!("asynchronous job panicked");
    }
    inflight.leave();
}
