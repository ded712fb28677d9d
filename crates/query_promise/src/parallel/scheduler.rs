//! Top-level drivers for synchronous fork-join and asynchronous fork.

use super::cached::CachedPool;
use super::handle::TaskHandle;
use super::pool::{ASYNC_POOL, FORK_JOIN_POOL, ForkJoinPool, PoolLifecycle};
use super::task::{ForkJoinTask, check_leaf, run_leaf};
use crate::context::Context;
use crate::deferred::Deferred;
use crate::error::{QueryError, QueryResult};
use crate::value::Value;
use crate::work::WorkRef;
use anyhow::anyhow;
use core::any::Any;
use core::time::Duration;
use crossbeam::channel::bounded;
use log::{debug, error, trace, warn};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Run `work` on the shared fork-join pool and return the ordered results.
///
/// The shared pool is created with `threads` workers if it does not exist yet
/// (or was shut down).
pub fn fork_join(
    ctx: &Context,
    work: &[WorkRef],
    leaf_size: usize,
    threads: usize,
) -> QueryResult<Value> {
    let task = root_task(ctx, work, leaf_size)?;
    let pool = FORK_JOIN_POOL
        .acquire(|| ForkJoinPool::new(Some(threads)))
        .map_err(|err| pool_unavailable(&err))?;
    run_root(&pool, &task)
}

/// Run `work` on a dedicated pool of `threads` workers, torn down afterwards.
pub fn fork_join_with_threads(
    ctx: &Context,
    work: &[WorkRef],
    leaf_size: usize,
    threads: usize,
) -> QueryResult<Value> {
    let task = root_task(ctx, work, leaf_size)?;
    let pool = ForkJoinPool::new(Some(threads)).map_err(|err| pool_unavailable(&err))?;
    let result = run_root(&pool, &task);
    pool.shutdown(Duration::ZERO);
    result
}

/// Submit each element of `work` to the shared asynchronous pool.
///
/// With `arguments`, every unit runs as its own deferred bound to them;
/// without, elements must be deferreds or zero-arity units. Returns at once
/// with a deferred that joins the submitted tasks in order when resolved.
///
/// If the pool rejects a submission (for example because it was shut down
/// concurrently) the error is returned and tasks already submitted run to
/// completion unobserved.
pub fn fork(
    ctx: &Context,
    work: &[WorkRef],
    arguments: Option<&Value>,
    keep_alive: Duration,
) -> QueryResult<Deferred> {
    let jobs = work
        .iter()
        .enumerate()
        .map(|(index, unit)| match arguments {
            Some(args) => Ok(Deferred::new(vec![Arc::clone(unit)], vec![args.clone()])?.to_work()),
            None => check_leaf(index, unit.as_ref()).map(|()| Arc::clone(unit)),
        })
        .collect::<QueryResult<Vec<WorkRef>>>()?;

    let pool = ASYNC_POOL
        .acquire(|| Ok(CachedPool::new(keep_alive)))
        .map_err(|err| pool_unavailable(&err))?;

    debug!("fork: submitting {} task(s)", jobs.len());
    submit_all(&pool, ctx, jobs).map(Deferred::from_pending)
}

/// Submit every job, stopping at the first rejection.
///
/// Jobs accepted before a rejection keep running, but their results are
/// discarded.
fn submit_all(
    pool: &CachedPool,
    ctx: &Context,
    jobs: Vec<WorkRef>,
) -> QueryResult<Vec<TaskHandle>> {
    let mut handles = Vec::with_capacity(jobs.len());
    for unit in jobs {
        match submit(pool, ctx.clone(), unit) {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                if !handles.is_empty() {
                    warn!(
                        "fork: submission failed; abandoning {} task(s) already running",
                        handles.len()
                    );
                }
                return Err(err);
            }
        }
    }
    Ok(handles)
}

fn root_task(ctx: &Context, work: &[WorkRef], leaf_size: usize) -> QueryResult<ForkJoinTask> {
    ForkJoinTask::new(Arc::from(work), 0, work.len(), leaf_size, ctx.clone())
}

fn run_root(pool: &ForkJoinPool, task: &ForkJoinTask) -> QueryResult<Value> {
    debug!(
        "fork-join: {} element(s) on {} thread(s)",
        task.len(),
        pool.current_num_threads()
    );
    let outcome = catch_unwind(AssertUnwindSafe(|| pool.invoke(|| task.compute())));
    let failure = match outcome {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(failure)) => failure,
        Err(panic) => anyhow!("fork-join worker panicked: {}", panic_message(panic.as_ref())),
    };
    Err(unwrap_domain_error(&failure))
}

/// Re-raise the first domain error in the cause chain, or report a fault.
fn unwrap_domain_error(failure: &anyhow::Error) -> QueryError {
    if let Some(domain) = failure
        .chain()
        .find_map(|cause| cause.downcast_ref::<QueryError>())
    {
        trace!("fork-join failed: {failure:#}");
        return domain.clone();
    }

    error!("fork-join failed, potential scheduler bug: {failure:?}");
    QueryError::scheduler_fault(format!(
        "fork-join failed: potential scheduler bug: {failure:#}"
    ))
}

fn submit(pool: &CachedPool, ctx: Context, unit: WorkRef) -> QueryResult<TaskHandle> {
    let (sender, receiver) = bounded(1);
    pool.execute(move || {
        let result = catch_unwind(AssertUnwindSafe(|| run_leaf(&ctx, unit.as_ref())))
            .unwrap_or_else(|panic| {
                Err(QueryError::scheduler_fault(format!(
                    "forked task {} panicked: {}",
                    unit.name(),
                    panic_message(panic.as_ref())
                )))
            });
        if sender.send(result).is_err() {
            trace!("forked result dropped: handle released before completion");
        }
    })?;
    Ok(TaskHandle::new(receiver))
}

fn pool_unavailable(err: &anyhow::Error) -> QueryError {
    QueryError::scheduler_fault(format!("cannot create pool: {err:#}"))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
