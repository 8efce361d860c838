// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Key and record model shared by every storage engine.
//
// A stored record is a flat map from field name to a storage-native
// `Scalar`. Tables locate records through a `KeyPath` (one field or an
// ordered tuple of fields) and index them through single-field
// `IndexDefinition`s. Queries are either an exact `Key` or a `KeyRange`.
//
// Ordering: scalars order first by type (Null < Bool < Int < Float < Text <
// Bytes) and then by value. Floats use IEEE total ordering with -0.0
// folded onto +0.0, so ordering is total and agrees with the byte encoding
// in `crate::encoding`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// A storage-native scalar value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Scalar {
    /// Position of this variant in the cross-type ordering.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Scalar::Null => 0,
            Scalar::Bool(_) => 1,
            Scalar::Int(_) => 2,
            Scalar::Float(_) => 3,
            Scalar::Text(_) => 4,
            Scalar::Bytes(_) => 5,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Short type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Text(_) => "text",
            Scalar::Bytes(_) => "bytes",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Fold negative zero onto positive zero so `-0.0 == 0.0` in key order.
pub(crate) fn canonical_float(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => Ordering::Equal,
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::Float(a), Scalar::Float(b)) => {
                canonical_float(*a).total_cmp(&canonical_float(*b))
            }
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            (Scalar::Bytes(a), Scalar::Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scalar {}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(i64::from(value))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<Vec<u8>> for Scalar {
    fn from(value: Vec<u8>) -> Self {
        Scalar::Bytes(value)
    }
}

/// A storage-safe record: field name to scalar.
pub type StoredRecord = BTreeMap<String, Scalar>;

/// A primary-key or index-key value.
///
/// Within one table every key has the same shape, so the variant order
/// (`Single` before `Composite`) never decides a comparison in practice.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Key {
    Single(Scalar),
    /// An ordered tuple, compared lexicographically.
    Composite(Vec<Scalar>),
}

impl From<Scalar> for Key {
    fn from(value: Scalar) -> Self {
        Key::Single(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Single(value.into())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Single(value.into())
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Single(value.into())
    }
}

impl From<Vec<Scalar>> for Key {
    fn from(value: Vec<Scalar>) -> Self {
        Key::Composite(value)
    }
}

/// Where a table finds a record's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPath {
    Field(String),
    Composite(Vec<String>),
}

impl KeyPath {
    /// Field names making up the key, in key order.
    pub fn fields(&self) -> &[String] {
        match self {
            KeyPath::Field(name) => std::slice::from_ref(name),
            KeyPath::Composite(names) => names,
        }
    }

    /// Extract the primary key of `record`.
    ///
    /// Every key field must be present and non-null.
    pub fn extract(&self, record: &StoredRecord) -> Result<Key, StorageError> {
        let component = |field: &String| -> Result<Scalar, StorageError> {
            record
                .get(field)
                .filter(|value| !value.is_null())
                .cloned()
                .ok_or_else(|| StorageError::MissingKeyField(field.clone()))
        };

        match self {
            KeyPath::Field(field) => Ok(Key::Single(component(field)?)),
            KeyPath::Composite(fields) => Ok(Key::Composite(
                fields.iter().map(component).collect::<Result<_, _>>()?,
            )),
        }
    }
}

/// A secondary index over one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub field: String,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
        }
    }

    /// The index key of `record`, or `None` when the field is absent or null
    /// (such records are not indexed).
    pub fn extract(&self, record: &StoredRecord) -> Option<Key> {
        record
            .get(&self.field)
            .filter(|value| !value.is_null())
            .cloned()
            .map(Key::Single)
    }
}

/// Structural description of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub key_path: KeyPath,
    pub indexes: Vec<IndexDefinition>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, key_path: KeyPath) -> Self {
        Self {
            name: name.into(),
            key_path,
            indexes: Vec::new(),
        }
    }

    pub fn index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|index| index.name == name)
    }

    /// Look up an index, failing with [`StorageError::IndexNotFound`].
    pub fn require_index(&self, name: &str) -> Result<&IndexDefinition, StorageError> {
        self.index(name).ok_or_else(|| StorageError::IndexNotFound {
            table: self.name.clone(),
            index: name.to_string(),
        })
    }
}

/// A contiguous range of keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub lower: Bound<Key>,
    pub upper: Bound<Key>,
}

impl KeyRange {
    pub fn new(lower: Bound<Key>, upper: Bound<Key>) -> Self {
        Self { lower, upper }
    }

    /// Inclusive on both ends.
    pub fn between(lower: impl Into<Key>, upper: impl Into<Key>) -> Self {
        Self::new(Bound::Included(lower.into()), Bound::Included(upper.into()))
    }

    pub fn at_least(lower: impl Into<Key>) -> Self {
        Self::new(Bound::Included(lower.into()), Bound::Unbounded)
    }

    pub fn greater_than(lower: impl Into<Key>) -> Self {
        Self::new(Bound::Excluded(lower.into()), Bound::Unbounded)
    }

    pub fn at_most(upper: impl Into<Key>) -> Self {
        Self::new(Bound::Unbounded, Bound::Included(upper.into()))
    }

    pub fn less_than(upper: impl Into<Key>) -> Self {
        Self::new(Bound::Unbounded, Bound::Excluded(upper.into()))
    }

    pub fn contains(&self, key: &Key) -> bool {
        let above = match &self.lower {
            Bound::Included(lower) => key >= lower,
            Bound::Excluded(lower) => key > lower,
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(upper) => key <= upper,
            Bound::Excluded(upper) => key < upper,
            Bound::Unbounded => true,
        };
        above && below
    }

    /// True when no key can fall inside the range.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(lower), Bound::Included(upper)) => lower > upper,
            (Bound::Included(lower), Bound::Excluded(upper))
            | (Bound::Excluded(lower), Bound::Included(upper))
            | (Bound::Excluded(lower), Bound::Excluded(upper)) => lower >= upper,
            _ => false,
        }
    }
}

/// A lookup: one exact key or a range of keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyQuery {
    Exact(Key),
    Range(KeyRange),
}

impl KeyQuery {
    pub fn matches(&self, key: &Key) -> bool {
        match self {
            KeyQuery::Exact(exact) => exact == key,
            KeyQuery::Range(range) => range.contains(key),
        }
    }

    /// True when the query can match at least one key.
    pub fn is_satisfiable(&self) -> bool {
        match self {
            KeyQuery::Exact(_) => true,
            KeyQuery::Range(range) => !range.is_empty(),
        }
    }

    /// Borrowed bounds, suitable for `BTreeMap::range`.
    ///
    /// Callers must check [`KeyQuery::is_satisfiable`] first: `BTreeMap::range`
    /// panics on inverted bounds.
    pub fn bounds(&self) -> (Bound<&Key>, Bound<&Key>) {
        match self {
            KeyQuery::Exact(key) => (Bound::Included(key), Bound::Included(key)),
            KeyQuery::Range(range) => (range.lower.as_ref(), range.upper.as_ref()),
        }
    }
}

impl From<Key> for KeyQuery {
    fn from(value: Key) -> Self {
        KeyQuery::Exact(value)
    }
}

impl From<KeyRange> for KeyQuery {
    fn from(value: KeyRange) -> Self {
        KeyQuery::Range(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Scalar)]) -> StoredRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_scalar_cross_type_order() {
        let ordered = vec![
            Scalar::Null,
            Scalar::Bool(false),
            Scalar::Bool(true),
            Scalar::Int(i64::MIN),
            Scalar::Int(7),
            Scalar::Float(f64::NEG_INFINITY),
            Scalar::Float(0.5),
            Scalar::Text(String::new()),
            Scalar::Text("a".into()),
            Scalar::Bytes(vec![0]),
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1], "{:?} should sort before {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_negative_zero_equals_zero() {
        assert_eq!(Scalar::Float(-0.0), Scalar::Float(0.0));
    }

    #[test]
    fn test_key_path_extract_scalar() {
        let path = KeyPath::Field("id".into());
        let rec = record(&[("id", "a".into()), ("name", "Alice".into())]);
        assert_eq!(path.extract(&rec).unwrap(), Key::from("a"));
    }

    #[test]
    fn test_key_path_extract_composite() {
        let path = KeyPath::Composite(vec!["org".into(), "user".into()]);
        let rec = record(&[("org", "acme".into()), ("user", 3i64.into())]);
        assert_eq!(
            path.extract(&rec).unwrap(),
            Key::Composite(vec!["acme".into(), Scalar::Int(3)])
        );
    }

    #[test]
    fn test_key_path_rejects_missing_and_null() {
        let path = KeyPath::Field("id".into());
        let missing = path.extract(&record(&[("name", "x".into())]));
        assert!(matches!(missing, Err(StorageError::MissingKeyField(f)) if f == "id"));

        let null = path.extract(&record(&[("id", Scalar::Null)]));
        assert!(matches!(null, Err(StorageError::MissingKeyField(_))));
    }

    #[test]
    fn test_index_skips_null_fields() {
        let index = IndexDefinition::new("email", "email");
        assert_eq!(index.extract(&record(&[("email", Scalar::Null)])), None);
        assert_eq!(index.extract(&record(&[])), None);
        assert_eq!(
            index.extract(&record(&[("email", "a@b".into())])),
            Some(Key::from("a@b"))
        );
    }

    #[test]
    fn test_range_contains_and_empty() {
        let range = KeyRange::between(2i64, 4i64);
        assert!(!range.contains(&Key::from(1i64)));
        assert!(range.contains(&Key::from(2i64)));
        assert!(range.contains(&Key::from(4i64)));
        assert!(!range.contains(&Key::from(5i64)));
        assert!(!range.is_empty());

        assert!(KeyRange::between(4i64, 2i64).is_empty());
        let half_open = KeyRange::new(
            Bound::Included(Key::from(3i64)),
            Bound::Excluded(Key::from(3i64)),
        );
        assert!(half_open.is_empty());
        assert!(!KeyQuery::Range(half_open).is_satisfiable());
    }

    #[test]
    fn test_composite_keys_compare_lexicographically() {
        let a = Key::Composite(vec!["a".into(), Scalar::Int(9)]);
        let b = Key::Composite(vec!["b".into(), Scalar::Int(1)]);
        let a_prefix = Key::Composite(vec!["a".into()]);
        assert!(a < b);
        assert!(a_prefix < a);
    }
}
