//! Deferred objects: work units (or pending tasks) bound to a callback chain.
//!
//! A [`Deferred`] is resolved by [`Deferred::resolve`]. Every call re-runs the
//! whole pipeline; nothing is memoized between resolutions.

mod adapter;
mod callback;
mod chain;

pub use adapter::ArgumentAdapter;
pub use callback::{Callback, CallbackTag};

use crate::context::Context;
use crate::error::{QueryError, QueryResult};
use crate::parallel::TaskHandle;
use crate::value::{Item, Value};
use crate::work::{WorkRef, WorkUnit};
use callback::{expand_callables, expand_callback_map};
use chain::CallbackChain;
use log::{debug, trace};
use parking_lot::RwLock;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

/// What a deferred runs when resolved.
enum DeferredWork {
    /// Work units invoked with the bound arguments.
    Units(Vec<WorkRef>),
    /// Tasks already submitted by an asynchronous fork.
    Pending(Vec<TaskHandle>),
}

struct DeferredInner {
    work: DeferredWork,
    arguments: Vec<Value>,
    callbacks: RwLock<Vec<Callback>>,
}

/// A promise: deferred work plus an ordered callback chain.
///
/// Cloning yields another handle to the same deferred.
#[derive(Clone)]
pub struct Deferred {
    inner: Arc<DeferredInner>,
}

impl Deferred {
    /// Bind `work` to `arguments`.
    ///
    /// Every unit receives the same argument list when the deferred resolves.
    pub fn new(work: Vec<WorkRef>, arguments: Vec<Value>) -> QueryResult<Self> {
        if work.is_empty() {
            return Err(QueryError::registration(
                "a deferred needs at least one unit of work",
            ));
        }
        Ok(Self::from_work(DeferredWork::Units(work), arguments))
    }

    /// Wrap tasks returned by an asynchronous fork.
    pub fn from_pending(handles: Vec<TaskHandle>) -> Self {
        Self::from_work(DeferredWork::Pending(handles), Vec::new())
    }

    fn from_work(work: DeferredWork, arguments: Vec<Value>) -> Self {
        Self {
            inner: Arc::new(DeferredInner {
                work,
                arguments,
                callbacks: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Whether this deferred wraps tasks from an asynchronous fork.
    #[inline]
    pub fn is_forked(&self) -> bool {
        matches!(self.inner.work, DeferredWork::Pending(_))
    }

    /// Number of results the work is expected to produce.
    pub fn expected(&self) -> usize {
        match &self.inner.work {
            DeferredWork::Units(units) => units.len(),
            DeferredWork::Pending(handles) => handles.len(),
        }
    }

    /// The bound work units; empty for a forked deferred.
    pub fn work(&self) -> &[WorkRef] {
        match &self.inner.work {
            DeferredWork::Units(units) => units.as_slice(),
            DeferredWork::Pending(_) => &[],
        }
    }

    #[inline]
    pub fn arguments(&self) -> &[Value] {
        &self.inner.arguments
    }

    /// Snapshot of the registered callbacks, in registration order.
    pub fn callbacks(&self) -> Vec<Callback> {
        self.inner.callbacks.read().clone()
    }

    /// Register one callback.
    pub fn add_callback(&self, tag: CallbackTag, unit: WorkRef) -> QueryResult<&Self> {
        self.push_callbacks(vec![Callback::new(tag, unit)])
    }

    /// Register every callable in `callables` under `tag`, in order.
    ///
    /// Accepts a function item, a sequence of them, or arrays of them.
    pub fn register(&self, tag: CallbackTag, callables: &Value) -> QueryResult<&Self> {
        let mut units = Vec::new();
        expand_callables(callables, &mut units)?;
        self.push_callbacks(
            units
                .into_iter()
                .map(|unit| Callback::new(tag, unit))
                .collect(),
        )
    }

    /// Register callbacks from a map of tag name to callables.
    pub fn attach(&self, callbacks: &Value) -> QueryResult<&Self> {
        let expanded = expand_callback_map(callbacks)?;
        self.push_callbacks(expanded)
    }

    fn push_callbacks(&self, callbacks: Vec<Callback>) -> QueryResult<&Self> {
        if self.is_forked() {
            return Err(QueryError::registration(
                "callbacks must be attached before the deferred is forked",
            ));
        }
        self.inner.callbacks.write().extend(callbacks);
        Ok(self)
    }

    /// Run the work and drive the callback chain.
    pub fn resolve(&self, ctx: &Context) -> QueryResult<Value> {
        let callbacks = self.callbacks();
        let adapter = ArgumentAdapter::new(self.expected());
        let chain = CallbackChain::new(ctx, &callbacks, adapter);

        match self.run_work(ctx, adapter) {
            Ok(value) => chain.on_success(value),
            Err(raw) => {
                debug!("deferred work failed: {raw}");
                let mapped = ctx.map_error(&raw, self.work(), self.arguments());
                chain.on_failure(mapped, raw)
            }
        }
    }

    fn run_work(&self, ctx: &Context, adapter: ArgumentAdapter) -> QueryResult<Value> {
        let mut out = Value::empty();
        match &self.inner.work {
            DeferredWork::Units(units) => {
                for unit in units {
                    out.append(adapter.adapt(ctx, unit.as_ref(), &self.inner.arguments)?);
                }
            }
            DeferredWork::Pending(handles) => {
                for (index, handle) in handles.iter().enumerate() {
                    trace!("joining forked task {index}");
                    out.append(handle.join()?);
                }
            }
        }
        Ok(out)
    }

    /// This deferred as a function item.
    pub fn to_item(&self) -> Item {
        Item::Function(self.to_work())
    }

    /// This deferred as a shared work unit.
    pub fn to_work(&self) -> WorkRef {
        Arc::new(self.clone())
    }
}

/// As a function item a deferred takes one argument: an empty sequence
/// resolves it, a callback map attaches callbacks and returns the deferred.
impl WorkUnit for Deferred {
    fn arity(&self) -> usize {
        1
    }

    fn invoke(&self, ctx: &Context, args: &[Value]) -> QueryResult<Value> {
        match args {
            [] => self.resolve(ctx),
            [arg] if arg.is_empty() => self.resolve(ctx),
            [arg] if arg.iter().all(|item| item.as_map().is_some()) => {
                self.attach(arg)?;
                Ok(Value::from(self.to_item()))
            }
            _ => Err(QueryError::registration(
                "a deferred accepts an empty sequence or a map of callbacks",
            )),
        }
    }

    fn name(&self) -> &str {
        "deferred"
    }

    fn as_deferred(&self) -> Option<&Deferred> {
        Some(self)
    }
}

impl Debug for Deferred {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let tags: Vec<CallbackTag> = self
            .inner
            .callbacks
            .read()
            .iter()
            .map(|callback| callback.tag)
            .collect();
        f.debug_struct("Deferred")
            .field("expected", &self.expected())
            .field("forked", &self.is_forked())
            .field("callbacks", &tags)
            .finish()
    }
}
