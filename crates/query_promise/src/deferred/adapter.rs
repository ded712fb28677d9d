//! Reconciles the shape of a produced result with the arity of the next stage.
//!
//! The rules, applied in order for a target of arity `A`, `E` expected
//! results and `N` actual inputs:
//!
//! 1. a deferred target is resolved on its own, ignoring the inputs;
//! 2. `N == A == E` binds the inputs positionally, unchanged;
//! 3. `A == 0` calls the target with no arguments;
//! 4. when `N != E` or `A > N`, the first input is reshaped:
//!    a single array is unpacked into exactly `A` arguments, otherwise its
//!    items are wrapped into one array when `E > A`, or spread when not;
//! 5. anything else is a count mismatch.

use crate::context::Context;
use crate::error::{QueryError, QueryResult};
use crate::value::Value;
use crate::work::WorkUnit;
use log::trace;

/// Argument adapter bound to the number of results a stage is expected to produce.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArgumentAdapter {
    expected: usize,
}

impl ArgumentAdapter {
    /// `expected` is the number of work units (or pending tasks) of the deferred.
    #[inline]
    pub const fn new(expected: usize) -> Self {
        Self { expected }
    }

    #[inline]
    pub const fn expected(&self) -> usize {
        self.expected
    }

    /// Invoke `unit` with `inputs` reshaped to fit its arity.
    pub fn adapt(
        &self,
        ctx: &Context,
        unit: &dyn WorkUnit,
        inputs: &[Value],
    ) -> QueryResult<Value> {
        let arity = unit.arity();
        let expected = self.expected;
        let actual = inputs.len();

        if let Some(deferred) = unit.as_deferred() {
            trace!("adapter: resolving nested deferred {}", unit.name());
            return deferred.resolve(ctx);
        }

        if actual == arity && arity == expected {
            trace!("adapter: {}#{arity} bound positionally", unit.name());
            return unit.invoke(ctx, inputs);
        }

        if arity == 0 {
            return unit.invoke(ctx, &[]);
        }

        if actual != expected || arity > actual {
            let first = inputs.first().cloned().unwrap_or_default();

            if let Some(members) = first.as_array() {
                if members.len() != arity {
                    return Err(QueryError::shape(format!(
                        "invalid argument count for {}: expected {arity}, got {}",
                        unit.name(),
                        members.len()
                    )));
                }
                trace!("adapter: unpacking array into {}#{arity}", unit.name());
                return unit.invoke(ctx, members);
            }

            if expected > arity {
                trace!("adapter: wrapping {} item(s) into one array", first.len());
                return unit.invoke(ctx, &[Value::array(first.split_items())]);
            }

            trace!("adapter: spreading {} item(s)", first.len());
            return unit.invoke(ctx, &first.split_items());
        }

        Err(QueryError::shape(format!(
            "invalid number of arguments returned: expected {expected}, got {actual}"
        )))
    }
}
