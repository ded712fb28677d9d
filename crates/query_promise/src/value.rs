//! Host value model.
//!
//! A [`Value`] is a flat, ordered sequence of [`Item`]s. Concatenating two
//! values appends their items; nesting only happens through arrays and maps,
//! which are single items holding whole values.

use crate::work::WorkRef;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

/// A single item of a [`Value`] sequence.
#[derive(Clone)]
pub enum Item {
    /// `xs:boolean`
    Boolean(bool),
    /// `xs:integer`
    Integer(i64),
    /// `xs:double`
    Double(f64),
    /// `xs:string`
    String(Arc<str>),
    /// Structured array: one item whose members are values.
    Array(Vec<Value>),
    /// String-keyed map.
    Map(BTreeMap<String, Value>),
    /// Function item (plain work unit or deferred).
    Function(WorkRef),
}

impl Item {
    /// The work unit if this is a function item.
    #[inline]
    pub fn as_function(&self) -> Option<&WorkRef> {
        match self {
            Self::Function(unit) => Some(unit),
            _ => None,
        }
    }

    /// Array members if this is an array.
    #[inline]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(members) => Some(members.as_slice()),
            _ => None,
        }
    }

    #[inline]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(int) => Some(*int),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text.as_ref()),
            _ => None,
        }
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(lhs), Self::Boolean(rhs)) => lhs == rhs,
            (Self::Integer(lhs), Self::Integer(rhs)) => lhs == rhs,
            (Self::Double(lhs), Self::Double(rhs)) => lhs == rhs,
            (Self::String(lhs), Self::String(rhs)) => lhs == rhs,
            (Self::Array(lhs), Self::Array(rhs)) => lhs == rhs,
            (Self::Map(lhs), Self::Map(rhs)) => lhs == rhs,
            // Function items have identity, not structure.
            (Self::Function(lhs), Self::Function(rhs)) => {
                Arc::as_ptr(lhs).cast::<()>() == Arc::as_ptr(rhs).cast::<()>()
            }
            _ => false,
        }
    }
}

impl Debug for Item {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Boolean(flag) => write!(f, "{flag}"),
            Self::Integer(int) => write!(f, "{int}"),
            Self::Double(double) => write!(f, "{double:?}"),
            Self::String(text) => write!(f, "{text:?}"),
            Self::Array(members) => f.debug_list().entries(members).finish(),
            Self::Map(entries) => f.debug_map().entries(entries).finish(),
            Self::Function(unit) => write!(f, "{}#{}", unit.name(), unit.arity()),
        }
    }
}

impl From<bool> for Item {
    fn from(flag: bool) -> Self {
        Self::Boolean(flag)
    }
}

impl From<i64> for Item {
    fn from(int: i64) -> Self {
        Self::Integer(int)
    }
}

impl From<f64> for Item {
    fn from(double: f64) -> Self {
        Self::Double(double)
    }
}

impl From<&str> for Item {
    fn from(text: &str) -> Self {
        Self::String(Arc::from(text))
    }
}

impl From<String> for Item {
    fn from(text: String) -> Self {
        Self::String(Arc::from(text))
    }
}

impl From<WorkRef> for Item {
    fn from(unit: WorkRef) -> Self {
        Self::Function(unit)
    }
}

/// An ordered sequence of items.
#[derive(Clone, Default, PartialEq)]
pub struct Value {
    items: Vec<Item>,
}

impl Value {
    /// The empty sequence.
    #[inline]
    pub const fn empty() -> Self {
        Self { items: Vec::new() }
    }

    #[inline]
    pub fn single(item: impl Into<Item>) -> Self {
        Self {
            items: vec![item.into()],
        }
    }

    /// A value holding one array item with the given members.
    pub fn array(members: impl IntoIterator<Item = Self>) -> Self {
        Self::single(Item::Array(members.into_iter().collect()))
    }

    /// A value holding one map item.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Self)>) -> Self {
        Self::single(Item::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        ))
    }

    /// A value holding one function item.
    #[inline]
    pub fn function(unit: WorkRef) -> Self {
        Self::single(Item::Function(unit))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.items.iter()
    }

    #[inline]
    pub fn into_items(self) -> Vec<Item> {
        self.items
    }

    /// Append another value's items (sequence concatenation).
    #[inline]
    pub fn append(&mut self, other: Self) {
        self.items.extend(other.items);
    }

    /// The item, if the value is a singleton.
    #[inline]
    pub fn as_single(&self) -> Option<&Item> {
        match self.items.as_slice() {
            [item] => Some(item),
            _ => None,
        }
    }

    /// Members of a singleton array.
    #[inline]
    pub fn as_array(&self) -> Option<&[Value]> {
        self.as_single().and_then(Item::as_array)
    }

    /// The integer of a singleton integer value.
    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        self.as_single().and_then(Item::as_integer)
    }

    /// Look up `key` in a singleton map.
    pub fn get(&self, key: &str) -> Option<&Self> {
        self.as_single()
            .and_then(Item::as_map)
            .and_then(|entries| entries.get(key))
    }

    /// Split the sequence into one singleton value per item.
    pub fn split_items(&self) -> Vec<Self> {
        self.items.iter().cloned().map(Self::single).collect()
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("(")?;
        for (index, item) in self.items.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{item:?}")?;
        }
        f.write_str(")")
    }
}

macro_rules! value_from_item {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from(item: $source) -> Self {
                    Self::single(item)
                }
            }
        )*
    };
}

value_from_item!(Item, bool, i64, f64, &str, String, WorkRef);

impl From<Vec<Item>> for Value {
    fn from(items: Vec<Item>) -> Self {
        Self { items }
    }
}

impl FromIterator<Item> for Value {
    fn from_iter<I: IntoIterator<Item = Item>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let mut out = Self::empty();
        for value in iter {
            out.append(value);
        }
        out
    }
}

impl<'value> IntoIterator for &'value Value {
    type Item = &'value Item;
    type IntoIter = std::slice::Iter<'value, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl IntoIterator for Value {
    type Item = Item;
    type IntoIter = std::vec::IntoIter<Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
