//! Work units: callable, fixed-arity units of deferred computation.
//!
//! The host supplies its own function items by implementing [`WorkUnit`];
//! [`Function`] wraps a Rust closure for embedders and tests.

use crate::context::Context;
use crate::deferred::Deferred;
use crate::error::{QueryError, QueryResult, codes};
use crate::value::Value;
use std::borrow::Cow;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

/// A callable with a fixed arity.
pub trait WorkUnit: Send + Sync {
    /// Number of positional arguments the unit expects.
    fn arity(&self) -> usize;

    /// Invoke the unit with exactly the given argument list.
    fn invoke(&self, ctx: &Context, args: &[Value]) -> QueryResult<Value>;

    /// Name used in diagnostics.
    fn name(&self) -> &str {
        "anonymous"
    }

    /// The deferred behind this unit, if it is one.
    ///
    /// Deferreds are self-contained: the argument adapter and the fork-join
    /// leaf resolve them without forwarding upstream arguments.
    fn as_deferred(&self) -> Option<&Deferred> {
        None
    }
}

/// Shared handle to a work unit.
pub type WorkRef = Arc<dyn WorkUnit>;

type FunctionBody = dyn Fn(&Context, &[Value]) -> QueryResult<Value> + Send + Sync;

/// Closure-backed work unit.
pub struct Function {
    name: Cow<'static, str>,
    arity: usize,
    body: Box<FunctionBody>,
}

impl Function {
    /// Wrap a closure as a shared work unit.
    pub fn new<F>(name: impl Into<Cow<'static, str>>, arity: usize, body: F) -> WorkRef
    where
        F: Fn(&Context, &[Value]) -> QueryResult<Value> + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.into(),
            arity,
            body: Box::new(body),
        })
    }

    /// A zero-arity unit that always produces `value`.
    pub fn constant(name: impl Into<Cow<'static, str>>, value: Value) -> WorkRef {
        Self::new(name, 0, move |_ctx, _args| Ok(value.clone()))
    }
}

impl WorkUnit for Function {
    fn arity(&self) -> usize {
        self.arity
    }

    fn invoke(&self, ctx: &Context, args: &[Value]) -> QueryResult<Value> {
        if args.len() != self.arity {
            return Err(QueryError::invocation(
                codes::ARITY,
                format!(
                    "{}#{} called with {} argument(s)",
                    self.name,
                    self.arity,
                    args.len()
                ),
            ));
        }
        (self.body)(ctx, args)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Debug for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}#{}", self.name, self.arity)
    }
}
