//! Execution context and the error-mapping collaborator.

use crate::error::QueryError;
use crate::value::{Item, Value};
use crate::work::WorkRef;
use std::sync::Arc;

/// Turns a raised error into the value offered to `fail` and `always` callbacks.
///
/// Implemented for any matching closure, so a plain function can be passed to
/// [`Promise::init`](crate::Promise::init).
pub trait ErrorMapper: Send + Sync {
    /// Map `error`, raised while running `work` on `arguments`.
    fn map_error(&self, error: &QueryError, work: &[WorkRef], arguments: &[Value]) -> Value;
}

impl<F> ErrorMapper for F
where
    F: Fn(&QueryError, &[WorkRef], &[Value]) -> Value + Send + Sync,
{
    fn map_error(&self, error: &QueryError, work: &[WorkRef], arguments: &[Value]) -> Value {
        self(error, work, arguments)
    }
}

/// Maps errors to a map of `code`, `description`, location, `value`, `work`
/// and `arguments` entries.
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultErrorMapper;

impl ErrorMapper for DefaultErrorMapper {
    fn map_error(&self, error: &QueryError, work: &[WorkRef], arguments: &[Value]) -> Value {
        let mut entries = vec![
            ("code", Value::from(error.code())),
            ("description", Value::from(error.message())),
        ];

        if let Some(location) = error.location() {
            if let Some(module) = &location.module {
                entries.push(("module", Value::from(module.as_str())));
            }
            entries.push(("line", Value::from(i64::from(location.line))));
            entries.push(("column", Value::from(i64::from(location.column))));
        }

        if let Some(payload) = error.payload() {
            entries.push(("value", payload.clone()));
        }

        entries.push((
            "work",
            work.iter().map(|unit| Item::Function(Arc::clone(unit))).collect(),
        ));
        entries.push(("arguments", Value::array(arguments.iter().cloned())));

        Value::map(entries)
    }
}

/// State shared by every invocation of one facade.
///
/// Cheap to clone; fork-join tasks each carry a clone.
#[derive(Clone)]
pub struct Context {
    error_mapper: Arc<dyn ErrorMapper>,
}

impl Context {
    #[inline]
    pub fn new(error_mapper: Arc<dyn ErrorMapper>) -> Self {
        Self { error_mapper }
    }

    /// Map an error through the configured collaborator.
    #[inline]
    pub fn map_error(&self, error: &QueryError, work: &[WorkRef], arguments: &[Value]) -> Value {
        self.error_mapper.map_error(error, work, arguments)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Arc::new(DefaultErrorMapper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceLocation;

    #[test]
    fn default_mapper_carries_diagnostics() {
        let error = QueryError::invocation("err:FOER0000", "boom")
            .with_location(SourceLocation::new(None, 7, 2))
            .with_payload(Value::from("extra"));
        let mapped = Context::default().map_error(&error, &[], &[Value::from(1_i64)]);

        assert_eq!(mapped.get("code"), Some(&Value::from("err:FOER0000")));
        assert_eq!(mapped.get("description"), Some(&Value::from("boom")));
        assert_eq!(mapped.get("line").and_then(Value::as_integer), Some(7));
        assert!(mapped.get("module").is_none());
        assert_eq!(mapped.get("value"), Some(&Value::from("extra")));
        assert_eq!(
            mapped.get("arguments"),
            Some(&Value::array([Value::from(1_i64)]))
        );
    }

    #[test]
    fn closures_are_mappers() {
        let ctx = Context::new(Arc::new(|error: &QueryError, _: &[WorkRef], _: &[Value]| {
            Value::from(error.message())
        }));
        let mapped = ctx.map_error(&QueryError::shape("bad shape"), &[], &[]);
        assert_eq!(mapped, Value::from("bad shape"));
    }
}
