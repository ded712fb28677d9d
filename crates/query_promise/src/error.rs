//! Domain error type shared by deferred resolution and the schedulers.
//!
//! Every failure that reaches a caller is a [`QueryError`]. The error-mapping
//! collaborator turns one into a [`Value`] before it is offered to `fail` and
//! `always` callbacks.

use crate::value::Value;
use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Well-known error codes raised by this crate.
pub mod codes {
    /// A work unit raised without naming its own code.
    pub const INVOCATION: &str = "promise:invocation";
    /// A produced result could not be reconciled with the next stage's arity.
    pub const INVALID_ARGUMENTS: &str = "promise:invalid-arguments";
    /// A callback could not be registered.
    pub const INVALID_CALLBACK: &str = "promise:invalid-callback";
    /// Fork-join was handed something other than a deferred or a zero-arity unit.
    pub const INVALID_WORK: &str = "promise:invalid-work";
    /// The fork-join machinery failed without a domain error to report.
    pub const SCHEDULER_FAULT: &str = "promise:scheduler-fault";
    /// A function item was called with the wrong number of arguments.
    pub const ARITY: &str = "err:XPTY0004";
}

/// Broad classification of a [`QueryError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A work unit or callback raised during execution.
    Invocation,
    /// A stage's output did not fit the arity of the next stage.
    Shape,
    /// Invalid callback tag, non-callable callback, or registration after fork.
    Registration,
    /// Something escaped the schedulers with no domain error in its cause chain.
    SchedulerFault,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let label = match self {
            Self::Invocation => "invocation",
            Self::Shape => "shape",
            Self::Registration => "registration",
            Self::SchedulerFault => "scheduler fault",
        };
        f.write_str(label)
    }
}

/// Where in the host query an error was raised.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// Module path or URI, if known
    pub module: Option<String>,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl SourceLocation {
    #[inline]
    pub fn new(module: Option<String>, line: u32, column: u32) -> Self {
        Self {
            module,
            line,
            column,
        }
    }
}

impl Display for SourceLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.module {
            Some(module) => write!(f, "{module}:{}:{}", self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// Error raised while resolving deferred work.
#[derive(Clone, Debug)]
pub struct QueryError {
    kind: ErrorKind,
    code: String,
    message: String,
    location: Option<SourceLocation>,
    payload: Option<Value>,
}

impl QueryError {
    /// Create an error with an explicit kind and code.
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            location: None,
            payload: None,
        }
    }

    /// An error raised by a work unit or callback.
    pub fn invocation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invocation, code, message)
    }

    /// A result/arity mismatch detected by the argument adapter.
    pub fn shape(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Shape, codes::INVALID_ARGUMENTS, message)
    }

    /// A rejected callback registration.
    pub fn registration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Registration, codes::INVALID_CALLBACK, message)
    }

    /// An internal failure of the scheduling machinery.
    pub fn scheduler_fault(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchedulerFault, codes::SCHEDULER_FAULT, message)
    }

    #[must_use]
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Attach an arbitrary value to the error (the `value` entry of a mapped error).
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[inline]
    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    #[inline]
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " ({location})")?;
        }
        Ok(())
    }
}

impl Error for QueryError {}

/// Result alias used throughout the crate.
pub type QueryResult<T> = Result<T, QueryError>;
