// SPDX-License-Identifier: PMPL-1.0-or-later
//! Application-side values and records.
//!
//! A [`Record`] is what application code reads and writes. It differs from the
//! engine's `StoredRecord` in one way: values may be [`Value::Date`], which has
//! no storage form of its own and must pass through a transformer.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::ops::Bound;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shelf_engine::Scalar;

/// A field value as seen by application code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// An instant in time. Stored through a transformer.
    Date(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short type name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(date) => Some(date),
            _ => None,
        }
    }

    /// Convert to a storage scalar. A date has no direct storage form and is
    /// handed back as the error.
    pub fn into_scalar(self) -> Result<Scalar, Value> {
        match self {
            Value::Null => Ok(Scalar::Null),
            Value::Bool(v) => Ok(Scalar::Bool(v)),
            Value::Int(v) => Ok(Scalar::Int(v)),
            Value::Float(v) => Ok(Scalar::Float(v)),
            Value::Text(v) => Ok(Scalar::Text(v)),
            Value::Bytes(v) => Ok(Scalar::Bytes(v)),
            date @ Value::Date(_) => Err(date),
        }
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Null => Value::Null,
            Scalar::Bool(v) => Value::Bool(v),
            Scalar::Int(v) => Value::Int(v),
            Scalar::Float(v) => Value::Float(v),
            Scalar::Text(v) => Value::Text(v),
            Scalar::Bytes(v) => Value::Bytes(v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// An application record: field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Set a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A primary-key or index value in application form.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordKey {
    Single(Value),
    /// Components of a composite primary key, in key order.
    Composite(Vec<Value>),
}

impl RecordKey {
    pub fn len(&self) -> usize {
        match self {
            RecordKey::Single(_) => 1,
            RecordKey::Composite(parts) => parts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

macro_rules! single_key_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for RecordKey {
                fn from(value: $ty) -> Self {
                    RecordKey::Single(value.into())
                }
            }
        )*
    };
}

single_key_from!(Value, bool, i64, i32, f64, &str, String, Vec<u8>, DateTime<Utc>);

/// A lookup in application form: an exact key or a key range.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordQuery {
    Exact(RecordKey),
    Range {
        lower: Bound<RecordKey>,
        upper: Bound<RecordKey>,
    },
}

impl RecordQuery {
    pub fn exact(key: impl Into<RecordKey>) -> Self {
        RecordQuery::Exact(key.into())
    }

    /// Inclusive on both ends.
    pub fn between(lower: impl Into<RecordKey>, upper: impl Into<RecordKey>) -> Self {
        RecordQuery::Range {
            lower: Bound::Included(lower.into()),
            upper: Bound::Included(upper.into()),
        }
    }

    pub fn at_least(lower: impl Into<RecordKey>) -> Self {
        RecordQuery::Range {
            lower: Bound::Included(lower.into()),
            upper: Bound::Unbounded,
        }
    }

    pub fn greater_than(lower: impl Into<RecordKey>) -> Self {
        RecordQuery::Range {
            lower: Bound::Excluded(lower.into()),
            upper: Bound::Unbounded,
        }
    }

    pub fn at_most(upper: impl Into<RecordKey>) -> Self {
        RecordQuery::Range {
            lower: Bound::Unbounded,
            upper: Bound::Included(upper.into()),
        }
    }

    pub fn less_than(upper: impl Into<RecordKey>) -> Self {
        RecordQuery::Range {
            lower: Bound::Unbounded,
            upper: Bound::Excluded(upper.into()),
        }
    }
}

impl From<RecordKey> for RecordQuery {
    fn from(key: RecordKey) -> Self {
        RecordQuery::Exact(key)
    }
}
