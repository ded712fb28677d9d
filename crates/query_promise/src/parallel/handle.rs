//! Handle to the eventual result of an asynchronously submitted task.

use crate::error::{QueryError, QueryResult};
use crate::value::Value;
use crossbeam::channel::{Receiver, never};
use once_cell::sync::OnceCell;

/// Future-like handle returned by an asynchronous fork.
///
/// [`join`](Self::join) blocks until the task settles. The settled result is
/// kept, so joining again returns the same outcome.
pub struct TaskHandle {
    receiver: Receiver<QueryResult<Value>>,
    settled: OnceCell<QueryResult<Value>>,
}

impl TaskHandle {
    pub(crate) fn new(receiver: Receiver<QueryResult<Value>>) -> Self {
        Self {
            receiver,
            settled: OnceCell::new(),
        }
    }

    /// A handle that is already settled.
    pub fn ready(result: QueryResult<Value>) -> Self {
        Self {
            receiver: never(),
            settled: OnceCell::with_value(result),
        }
    }

    /// Block until the task settles and return its result.
    ///
    /// A task whose worker vanished without reporting is a scheduler fault.
    pub fn join(&self) -> QueryResult<Value> {
        self.settled
            .get_or_init(|| {
                self.receiver.recv().unwrap_or_else(|_| {
                    Err(QueryError::scheduler_fault(
                        "forked task ended without producing a result",
                    ))
                })
            })
            .clone()
    }

    /// Whether [`join`](Self::join) would return without blocking.
    pub fn is_ready(&self) -> bool {
        self.settled.get().is_some() || !self.receiver.is_empty()
    }
}
