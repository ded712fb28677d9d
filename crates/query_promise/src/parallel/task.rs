//! Recursive divide-and-conquer task over a shared work sequence.

use crate::context::Context;
use crate::error::{ErrorKind, QueryError, QueryResult, codes};
use crate::value::Value;
use crate::work::{WorkRef, WorkUnit};
use anyhow::Context as _;
use log::debug;
use std::sync::Arc;

/// Fork-join task covering `[start, end)` of a shared work sequence.
///
/// Ranges longer than `compute_size` are halved: the right half is offered
/// to other workers while the left half runs here, then both are joined in
/// order.
pub struct ForkJoinTask {
    work: Arc<[WorkRef]>,
    start: usize,
    end: usize,
    compute_size: usize,
    ctx: Context,
}

impl ForkJoinTask {
    /// Build a task over `[start, end)`.
    ///
    /// # Errors
    ///
    /// Every element in range must be a deferred or a zero-arity unit, and
    /// the range must lie within `work`.
    pub fn new(
        work: Arc<[WorkRef]>,
        start: usize,
        end: usize,
        compute_size: usize,
        ctx: Context,
    ) -> QueryResult<Self> {
        if start > end || end > work.len() {
            return Err(QueryError::new(
                ErrorKind::Shape,
                codes::INVALID_WORK,
                format!(
                    "fork-join range [{start}, {end}) is outside a sequence of {}",
                    work.len()
                ),
            ));
        }
        for (index, unit) in work.iter().enumerate().take(end).skip(start) {
            check_leaf(index, unit.as_ref())?;
        }
        Ok(Self {
            work,
            start,
            end,
            compute_size: compute_size.max(1),
            ctx,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    fn split(&self, start: usize, end: usize) -> Self {
        Self {
            work: Arc::clone(&self.work),
            start,
            end,
            compute_size: self.compute_size,
            ctx: self.ctx.clone(),
        }
    }

    /// Compute the concatenated results of the range, in index order.
    ///
    /// Must run inside a Rayon pool for the halves to be stolen by other workers.
    pub fn compute(&self) -> anyhow::Result<Value> {
        if self.len() <= self.compute_size {
            return self.execute_leaf();
        }

        let mid = self.start + self.len() / 2;
        debug!(
            "fork-join: splitting [{}, {}) at {mid}",
            self.start, self.end
        );
        let left = self.split(self.start, mid);
        let right = self.split(mid, self.end);

        let (left_result, right_result) = rayon::join(|| left.compute(), || right.compute());

        let mut out = left_result?;
        out.append(right_result?);
        Ok(out)
    }

    fn execute_leaf(&self) -> anyhow::Result<Value> {
        let mut out = Value::empty();
        for index in self.start..self.end {
            let unit = &self.work[index];
            let value = run_leaf(&self.ctx, unit.as_ref())
                .with_context(|| format!("fork-join leaf {index} ({}) failed", unit.name()))?;
            out.append(value);
        }
        Ok(out)
    }
}

/// Only deferreds and zero-arity units can run as leaves.
pub(crate) fn check_leaf(index: usize, unit: &dyn WorkUnit) -> QueryResult<()> {
    if unit.as_deferred().is_some() || unit.arity() == 0 {
        return Ok(());
    }
    Err(QueryError::new(
        ErrorKind::Shape,
        codes::INVALID_WORK,
        format!(
            "fork-join accepts only deferreds or functions with an arity of 0; item {index} is {}#{}",
            unit.name(),
            unit.arity()
        ),
    ))
}

/// Resolve a deferred, or call a zero-arity unit.
pub(crate) fn run_leaf(ctx: &Context, unit: &dyn WorkUnit) -> QueryResult<Value> {
    match unit.as_deferred() {
        Some(deferred) => deferred.resolve(ctx),
        None => unit.invoke(ctx, &[]),
    }
}
