//! Ordered dispatch of a deferred's callbacks.
//!
//! Success and failure scans walk the same callback list and hand off to each
//! other by index, so a `then` registered after a recovering `fail` still runs.

use super::adapter::ArgumentAdapter;
use super::callback::{Callback, CallbackTag};
use crate::context::Context;
use crate::error::{QueryError, QueryResult};
use crate::value::Value;
use log::trace;

/// Why a failure scan ended without a value.
enum ChainFailure {
    /// No `fail` callback recovered; carries the error that started the scan.
    Unmitigated(QueryError),
    /// An error escaped the scan directly (an `always` callback raised, or a
    /// resumed success pass ended in its own failure).
    Raised(QueryError),
}

impl ChainFailure {
    fn into_error(self) -> QueryError {
        match self {
            Self::Unmitigated(error) | Self::Raised(error) => error,
        }
    }
}

/// One resolution's view of the callback list.
pub(crate) struct CallbackChain<'chain> {
    ctx: &'chain Context,
    callbacks: &'chain [Callback],
    adapter: ArgumentAdapter,
}

impl<'chain> CallbackChain<'chain> {
    pub(crate) fn new(
        ctx: &'chain Context,
        callbacks: &'chain [Callback],
        adapter: ArgumentAdapter,
    ) -> Self {
        Self {
            ctx,
            callbacks,
            adapter,
        }
    }

    /// Drive the chain after the work produced `value`.
    pub(crate) fn on_success(&self, value: Value) -> QueryResult<Value> {
        self.process_success(value, 0)
    }

    /// Drive the chain after the work raised `raw`, already mapped to `mapped`.
    pub(crate) fn on_failure(&self, mapped: Value, raw: QueryError) -> QueryResult<Value> {
        self.process_failure(mapped, raw, 0).map_err(ChainFailure::into_error)
    }

    fn invoke(&self, callback: &Callback, value: &Value) -> QueryResult<Value> {
        trace!("dispatching {} callback {}", callback.tag, callback.unit.name());
        self.adapter
            .adapt(self.ctx, callback.unit.as_ref(), core::slice::from_ref(value))
    }

    fn process_success(&self, value: Value, start: usize) -> QueryResult<Value> {
        let mut current = value;
        for (index, callback) in self.callbacks.iter().enumerate().skip(start) {
            let outcome = match callback.tag {
                CallbackTag::Then => self.invoke(callback, &current).map(Some),
                CallbackTag::Done | CallbackTag::Always => {
                    self.invoke(callback, &current).map(|_| None)
                }
                CallbackTag::Fail => continue,
            };

            match outcome {
                Ok(Some(next)) => current = next,
                Ok(None) => {}
                Err(error) => {
                    trace!("{} callback at {index} raised: {error}", callback.tag);
                    return self
                        .process_failure(current, error, index + 1)
                        .map_err(ChainFailure::into_error);
                }
            }
        }
        Ok(current)
    }

    fn process_failure(
        &self,
        value: Value,
        raw: QueryError,
        start: usize,
    ) -> Result<Value, ChainFailure> {
        let mut current = value;
        let mut resume_at = None;

        for (index, callback) in self.callbacks.iter().enumerate().skip(start) {
            match callback.tag {
                CallbackTag::Always => {
                    self.invoke(callback, &current).map_err(ChainFailure::Raised)?;
                }
                CallbackTag::Fail => match self.invoke(callback, &current) {
                    Ok(recovered) => {
                        trace!("fail callback at {index} mitigated: {raw}");
                        current = recovered;
                        resume_at = Some(index + 1);
                        break;
                    }
                    Err(error) => {
                        trace!("fail callback at {index} raised: {error}");
                        return match self.process_failure(current, error, index + 1) {
                            // Nothing later recovered: the caller sees this frame's error.
                            Err(ChainFailure::Unmitigated(_)) => {
                                Err(ChainFailure::Unmitigated(raw))
                            }
                            other => other,
                        };
                    }
                },
                CallbackTag::Then | CallbackTag::Done => {}
            }
        }

        match resume_at {
            Some(next) => self.process_success(current, next).map_err(ChainFailure::Raised),
            None => Err(ChainFailure::Unmitigated(raw)),
        }
    }
}
