//! Configuration for the promise facade and its pools.
//!
//! Values can be constructed programmatically or loaded from environment
//! variables with [`PromiseConfig::from_env`].

use core::time::Duration;
use std::env;
use std::num::NonZero;
use std::thread;

/// Runtime configuration for [`Promise`](crate::Promise).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromiseConfig {
    /// Range length at or below which a fork-join task runs sequentially
    pub leaf_size: usize,
    /// Worker count of the shared fork-join pool
    pub fork_join_threads: usize,
    /// How long an idle asynchronous worker waits for work before exiting
    pub keep_alive: Duration,
    /// How long teardown waits for in-flight asynchronous tasks
    pub shutdown_grace: Duration,
}

impl Default for PromiseConfig {
    fn default() -> Self {
        Self {
            leaf_size: Self::DEFAULT_LEAF_SIZE,
            fork_join_threads: Self::default_parallelism(),
            keep_alive: Self::DEFAULT_KEEP_ALIVE,
            shutdown_grace: Self::DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl PromiseConfig {
    const DEFAULT_LEAF_SIZE: usize = 1;
    const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);
    const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

    /// Construct a configuration with explicit values.
    ///
    /// `leaf_size` and `fork_join_threads` are clamped to at least 1.
    #[inline]
    #[must_use]
    pub fn new(
        leaf_size: usize,
        fork_join_threads: usize,
        keep_alive: Duration,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            leaf_size: leaf_size.max(1),
            fork_join_threads: fork_join_threads.max(1),
            keep_alive,
            shutdown_grace,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `PROMISE_LEAF_SIZE`: fork-join leaf size (default: 1)
    /// - `PROMISE_THREADS`: shared fork-join pool size (default: available parallelism)
    /// - `PROMISE_KEEP_ALIVE_MS`: idle asynchronous worker lifetime (default: 60000)
    /// - `PROMISE_SHUTDOWN_GRACE_MS`: teardown wait for in-flight tasks (default: 250)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let leaf_size = read_env::<usize>("PROMISE_LEAF_SIZE").unwrap_or(defaults.leaf_size);
        let fork_join_threads =
            read_env::<usize>("PROMISE_THREADS").unwrap_or(defaults.fork_join_threads);
        let keep_alive = read_env::<u64>("PROMISE_KEEP_ALIVE_MS")
            .map_or(defaults.keep_alive, Duration::from_millis);
        let shutdown_grace = read_env::<u64>("PROMISE_SHUTDOWN_GRACE_MS")
            .map_or(defaults.shutdown_grace, Duration::from_millis);
        Self::new(leaf_size, fork_join_threads, keep_alive, shutdown_grace)
    }

    fn default_parallelism() -> usize {
        thread::available_parallelism()
            .map(NonZero::get)
            .unwrap_or(1)
    }
}

fn read_env<T: core::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|val| val.trim().parse::<T>().ok())
}
