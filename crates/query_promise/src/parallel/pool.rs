//! Pool lifecycle and the work-stealing fork-join pool.

use super::cached::CachedPool;
use core::time::Duration;
use log::info;
use parking_lot::{Mutex, const_mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Lifecycle shared by the pool kinds kept in a [`SharedPool`].
pub trait PoolLifecycle: Send + Sync {
    /// Whether the pool has been shut down and must not take new work.
    fn is_terminated(&self) -> bool;

    /// Stop the pool, waiting up to `grace` for in-flight work where supported.
    fn shutdown(&self, grace: Duration);
}

/// Process-wide slot holding one pool, recreated on demand.
pub struct SharedPool<P> {
    kind: &'static str,
    slot: Mutex<Option<Arc<P>>>,
}

impl<P: PoolLifecycle> SharedPool<P> {
    pub const fn new(kind: &'static str) -> Self {
        Self {
            kind,
            slot: const_mutex(None),
        }
    }

    /// Get the live pool, building a new one if none exists or the stored one
    /// was shut down.
    pub fn acquire(&self, build: impl FnOnce() -> anyhow::Result<P>) -> anyhow::Result<Arc<P>> {
        let mut slot = self.slot.lock();
        if let Some(pool) = slot.as_ref().filter(|pool| !pool.is_terminated()) {
            return Ok(Arc::clone(pool));
        }

        let pool = Arc::new(build()?);
        info!("created shared {} pool", self.kind);
        *slot = Some(Arc::clone(&pool));
        Ok(pool)
    }

    /// Shut the stored pool down; the next [`acquire`](Self::acquire) recreates it.
    pub fn shutdown(&self, grace: Duration) {
        let taken = self.slot.lock().take();
        if let Some(pool) = taken {
            info!("shutting down shared {} pool", self.kind);
            pool.shutdown(grace);
        }
    }

    /// Whether a live pool is currently stored.
    pub fn is_live(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .is_some_and(|pool| !pool.is_terminated())
    }
}

/// Shared pool used by synchronous fork-join.
pub(crate) static FORK_JOIN_POOL: SharedPool<ForkJoinPool> = SharedPool::new("fork-join");

/// Shared pool used by asynchronous forks.
pub(crate) static ASYNC_POOL: SharedPool<CachedPool> = SharedPool::new("asynchronous");

/// Shut down both shared pools.
///
/// In-flight asynchronous tasks get up to `grace` to finish before their
/// queue is closed.
pub fn shutdown_shared_pools(grace: Duration) {
    ASYNC_POOL.shutdown(grace);
    FORK_JOIN_POOL.shutdown(grace);
}

/// Work-stealing pool for fork-join tasks, backed by Rayon.
pub struct ForkJoinPool {
    pool: rayon::ThreadPool,
    terminated: AtomicBool,
}

impl ForkJoinPool {
    /// Create a pool with the specified number of threads.
    ///
    /// If `num_threads` is None, uses the number of CPU cores.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread pool cannot be created.
    pub fn new(num_threads: Option<usize>) -> anyhow::Result<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(|index| format!("promise-fork-join-{index}"));

        if let Some(num) = num_threads {
            builder = builder.num_threads(num.max(1));
        }

        let pool = builder.build()?;

        Ok(Self {
            pool,
            terminated: AtomicBool::new(false),
        })
    }

    /// Run `op` inside the pool, blocking until it completes.
    ///
    /// `rayon::join` calls made by `op` split work across this pool.
    #[inline]
    pub fn invoke<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    #[inline]
    pub fn current_num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl PoolLifecycle for ForkJoinPool {
    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Rayon workers exit once the last handle to the pool is dropped.
    fn shutdown(&self, _grace: Duration) {
        self.terminated.store(true, Ordering::Release);
    }
}
