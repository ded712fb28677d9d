//! Entry surface: creating deferreds, attaching callbacks, forking work.

use crate::config::PromiseConfig;
use crate::context::{Context, DefaultErrorMapper, ErrorMapper};
use crate::deferred::{CallbackTag, Deferred};
use crate::error::{QueryError, QueryResult};
use crate::parallel::{self, shutdown_shared_pools};
use crate::value::{Item, Value};
use crate::work::WorkRef;
use log::debug;
use std::sync::Arc;

/// Promise facade.
///
/// Holds the execution [`Context`] (and with it the error-mapping
/// collaborator) plus configuration. The pools it schedules on are shared by
/// every facade in the process.
#[derive(Clone)]
pub struct Promise {
    context: Context,
    config: PromiseConfig,
}

impl Default for Promise {
    fn default() -> Self {
        Self::new()
    }
}

impl Promise {
    /// A facade using [`DefaultErrorMapper`] and [`PromiseConfig::default`].
    pub fn new() -> Self {
        Self::with_config(PromiseConfig::default(), DefaultErrorMapper)
    }

    /// A facade mapping errors with `error_mapper`.
    ///
    /// The mapper must be in place before any failure is expected to reach a
    /// `fail` or `always` callback; it cannot be swapped afterwards.
    pub fn init(error_mapper: impl ErrorMapper + 'static) -> Self {
        Self::with_config(PromiseConfig::default(), error_mapper)
    }

    pub fn with_config(config: PromiseConfig, error_mapper: impl ErrorMapper + 'static) -> Self {
        Self {
            context: Context::new(Arc::new(error_mapper)),
            config,
        }
    }

    #[inline]
    pub fn context(&self) -> &Context {
        &self.context
    }

    #[inline]
    pub fn config(&self) -> &PromiseConfig {
        &self.config
    }

    /// Defer `work` (one or more function items) with an optional bound
    /// argument value and an optional callback map.
    pub fn defer(
        &self,
        work: &Value,
        arguments: Option<Value>,
        callbacks: Option<&Value>,
    ) -> QueryResult<Deferred> {
        let units = function_items(work)?;
        let deferred = Deferred::new(units, arguments.into_iter().collect())?;
        if let Some(callbacks) = callbacks {
            deferred.attach(callbacks)?;
        }
        Ok(deferred)
    }

    /// Join several deferreds or work units into one deferred.
    ///
    /// The joint result holds one entry per element, so a callback whose
    /// arity equals the element count receives them positionally.
    pub fn when(&self, deferreds: &Value, callbacks: Option<&Value>) -> QueryResult<Deferred> {
        let units = function_items(deferreds)?;
        let deferred = Deferred::new(units, Vec::new())?;
        if let Some(callbacks) = callbacks {
            deferred.attach(callbacks)?;
        }
        Ok(deferred)
    }

    /// Attach a map of tag name to callables.
    pub fn attach(&self, deferred: &Deferred, callbacks: &Value) -> QueryResult<Deferred> {
        deferred.attach(callbacks).cloned()
    }

    pub fn then(&self, deferred: &Deferred, callbacks: &Value) -> QueryResult<Deferred> {
        deferred.register(CallbackTag::Then, callbacks).cloned()
    }

    pub fn done(&self, deferred: &Deferred, callbacks: &Value) -> QueryResult<Deferred> {
        deferred.register(CallbackTag::Done, callbacks).cloned()
    }

    pub fn always(&self, deferred: &Deferred, callbacks: &Value) -> QueryResult<Deferred> {
        deferred.register(CallbackTag::Always, callbacks).cloned()
    }

    pub fn fail(&self, deferred: &Deferred, callbacks: &Value) -> QueryResult<Deferred> {
        deferred.register(CallbackTag::Fail, callbacks).cloned()
    }

    /// Resolve `deferred` with this facade's context.
    #[inline]
    pub fn invoke(&self, deferred: &Deferred) -> QueryResult<Value> {
        deferred.resolve(&self.context)
    }

    /// Submit each element to the asynchronous pool and return immediately.
    ///
    /// Resolving the returned deferred blocks until every task has settled.
    pub fn fork(&self, work: &Value, arguments: Option<Value>) -> QueryResult<Deferred> {
        let units = function_items(work)?;
        parallel::fork(
            &self.context,
            &units,
            arguments.as_ref(),
            self.config.keep_alive,
        )
    }

    /// Fork-join with the configured leaf size on the shared pool.
    pub fn fork_join(&self, deferreds: &Value) -> QueryResult<Value> {
        self.fork_join_with(deferreds, self.config.leaf_size)
    }

    /// Fork-join with an explicit leaf size on the shared pool.
    pub fn fork_join_with(&self, deferreds: &Value, leaf_size: usize) -> QueryResult<Value> {
        let units = function_items(deferreds)?;
        parallel::fork_join(
            &self.context,
            &units,
            leaf_size,
            self.config.fork_join_threads,
        )
    }

    /// Fork-join on a dedicated pool of `threads` workers.
    pub fn fork_join_with_threads(
        &self,
        deferreds: &Value,
        leaf_size: usize,
        threads: usize,
    ) -> QueryResult<Value> {
        let units = function_items(deferreds)?;
        parallel::fork_join_with_threads(&self.context, &units, leaf_size, threads)
    }

    /// Whether `item` is a deferred.
    pub fn is_promise(item: &Item) -> bool {
        item.as_function()
            .is_some_and(|unit| unit.as_deferred().is_some())
    }

    /// Module teardown: shut down the shared pools.
    ///
    /// In-flight asynchronous tasks get the configured grace period. The pools
    /// are recreated by the next call that needs them.
    pub fn close(&self) {
        debug!("promise facade closing shared pools");
        shutdown_shared_pools(self.config.shutdown_grace);
    }
}

/// Every item of `value` as a work unit.
fn function_items(value: &Value) -> QueryResult<Vec<WorkRef>> {
    value
        .iter()
        .map(|item| {
            item.as_function().map(Arc::clone).ok_or_else(|| {
                QueryError::registration(format!("expected a function item, got {item:?}"))
            })
        })
        .collect()
}
