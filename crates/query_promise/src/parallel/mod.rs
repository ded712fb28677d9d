//! Parallel execution of deferred work.
//!
//! Two process-wide pools back the schedulers: a bounded work-stealing pool
//! for synchronous fork-join and an unbounded cached pool for asynchronous
//! forks. Both are recreated transparently after a shutdown.

mod cached;
mod handle;
mod pool;
mod scheduler;
mod task;

pub use cached::CachedPool;
pub use handle::TaskHandle;
pub use pool::{ForkJoinPool, PoolLifecycle, SharedPool, shutdown_shared_pools};
pub use scheduler::{fork, fork_join, fork_join_with_threads};
pub use task::ForkJoinTask;
