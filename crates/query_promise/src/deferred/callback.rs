//! Tagged callbacks and their registration-time expansion.

use crate::error::{QueryError, QueryResult};
use crate::value::{Item, Value};
use crate::work::WorkRef;
use core::str::FromStr;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

/// Role of a callback in the chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CallbackTag {
    /// Transforms the current value on success.
    Then,
    /// Observes the current value on success.
    Done,
    /// Observes the current value on success and on failure.
    Always,
    /// Recovers from a failure by replacing the current value.
    Fail,
}

impl CallbackTag {
    pub const ALL: [Self; 4] = [Self::Then, Self::Done, Self::Always, Self::Fail];

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Then => "then",
            Self::Done => "done",
            Self::Always => "always",
            Self::Fail => "fail",
        }
    }
}

impl Display for CallbackTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallbackTag {
    type Err = QueryError;

    fn from_str(tag: &str) -> QueryResult<Self> {
        Self::ALL
            .into_iter()
            .find(|known| known.as_str() == tag)
            .ok_or_else(|| {
                QueryError::registration(format!(
                    "unknown callback '{tag}': expected one of then, done, always, fail"
                ))
            })
    }
}

/// A work unit registered under a tag.
#[derive(Clone)]
pub struct Callback {
    pub tag: CallbackTag,
    pub unit: WorkRef,
}

impl Callback {
    #[inline]
    pub fn new(tag: CallbackTag, unit: WorkRef) -> Self {
        Self { tag, unit }
    }
}

/// Expand a registered value into callables, in order.
///
/// Function items are taken as they are; arrays are expanded member by
/// member. Anything else is a registration error.
pub(crate) fn expand_callables(value: &Value, out: &mut Vec<WorkRef>) -> QueryResult<()> {
    for item in value {
        match item {
            Item::Function(unit) => out.push(Arc::clone(unit)),
            Item::Array(members) => {
                for member in members {
                    expand_callables(member, out)?;
                }
            }
            other => {
                return Err(QueryError::registration(format!(
                    "callback is not a function item: {other:?}"
                )));
            }
        }
    }
    Ok(())
}

/// Expand a callback map (or a sequence of maps) into tagged callbacks.
///
/// Map keys are visited in key order within each map.
pub(crate) fn expand_callback_map(value: &Value) -> QueryResult<Vec<Callback>> {
    let mut callbacks = Vec::new();
    for item in value {
        let Some(entries) = item.as_map() else {
            return Err(QueryError::registration(format!(
                "callbacks must be given as a map of tag to function, got {item:?}"
            )));
        };
        for (key, callables) in entries {
            let tag = key.parse::<CallbackTag>()?;
            let mut units = Vec::new();
            expand_callables(callables, &mut units)?;
            callbacks.extend(units.into_iter().map(|unit| Callback::new(tag, unit)));
        }
    }
    Ok(callbacks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::work::Function;

    #[test]
    fn tags_round_trip_through_names() {
        for tag in CallbackTag::ALL {
            assert_eq!(tag.as_str().parse::<CallbackTag>().ok(), Some(tag));
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = "finally".parse::<CallbackTag>().err();
        assert_eq!(err.map(|error| error.kind()), Some(ErrorKind::Registration));
    }

    #[test]
    fn arrays_expand_in_order() {
        let first = Function::constant("first", Value::empty());
        let second = Function::constant("second", Value::empty());
        let value = Value::array([
            Value::function(Arc::clone(&first)),
            Value::function(Arc::clone(&second)),
        ]);

        let mut out = Vec::new();
        assert!(expand_callables(&value, &mut out).is_ok());
        let names: Vec<&str> = out.iter().map(|unit| unit.name()).collect();
        assert_eq!(names, ["first", "second"]);
    }

    #[test]
    fn non_callables_are_rejected() {
        let mut out = Vec::new();
        let err = expand_callables(&Value::from(3_i64), &mut out).err();
        assert_eq!(err.map(|error| error.kind()), Some(ErrorKind::Registration));
    }

    #[test]
    fn map_keys_must_be_tags() {
        let unit = Function::constant("unit", Value::empty());
        let map = Value::map([("catch", Value::function(unit))]);
        assert!(expand_callback_map(&map).is_err());
    }
}
