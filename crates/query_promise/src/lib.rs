//! Promise-style composition and fork-join execution for query work units.
//!
//! This crate provides:
//! - Deferred objects binding work units to an ordered callback chain
//! - Argument adaptation between chained stages of differing arity
//! - Mid-chain failure recovery through `fail` callbacks
//! - Divide-and-conquer fork-join over a work-stealing pool
//! - Non-blocking fork onto a cached pool, joined later through a deferred
//!
//! # Architecture
//!
//! ```text
//! Promise (facade)
//!     ↓ defer / when / fork
//! Deferred ── callbacks ──→ CallbackChain ──→ ArgumentAdapter ──→ WorkUnit
//!     ↓ fork_join
//! ForkJoinTask (rayon::join) on the shared ForkJoinPool
//! ```
//!
//! # Example
//!
//! ```
//! use query_promise::{Function, Promise, Value};
//!
//! let promise = Promise::new();
//! let add = Function::new("add", 2, |_ctx, args| {
//!     let sum: i64 = args.iter().filter_map(Value::as_integer).sum();
//!     Ok(Value::from(sum))
//! });
//! let arguments = Value::array([Value::from(2_i64), Value::from(3_i64)]);
//! let deferred = promise
//!     .defer(&Value::function(add), Some(arguments), None)
//!     .expect("valid work");
//! assert_eq!(promise.invoke(&deferred).ok(), Some(Value::from(5_i64)));
//! ```

#![allow(
    clippy::module_name_repetitions,
    reason = "Types like ForkJoinPool are clearer than just Pool"
)]
#![allow(clippy::missing_errors_doc, reason = "Internal crate")]
#![allow(clippy::missing_panics_doc, reason = "Internal crate")]

mod config;
mod context;
mod deferred;
mod error;
mod promise;
mod value;
mod work;

pub mod parallel;

// Re-exports
pub use config::PromiseConfig;
pub use context::{Context, DefaultErrorMapper, ErrorMapper};
pub use deferred::{ArgumentAdapter, Callback, CallbackTag, Deferred};
pub use error::{ErrorKind, QueryError, QueryResult, SourceLocation, codes};
pub use promise::Promise;
pub use value::{Item, Value};
pub use work::{Function, WorkRef, WorkUnit};
