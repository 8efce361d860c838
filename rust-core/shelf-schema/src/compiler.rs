// SPDX-License-Identifier: PMPL-1.0-or-later
//! Schema compiler: field declarations in, storage layout out.
//!
//! Compilation is pure and deterministic. The order of
//! [`RecordTypeSchema::indexed_fields`] is part of the contract: declared
//! non-key fields first, in declaration order, then the components of a
//! composite primary key.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use shelf_engine::{IndexDefinition, KeyPath, TableDefinition};
use tracing::debug;

use crate::error::SchemaError;
use crate::field::FieldSpec;
use crate::transform::FieldTransformer;

const FIELD_NAME_PATTERN: &str = "^[A-Za-z0-9_]+$";

static FIELD_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(FIELD_NAME_PATTERN).expect("field name pattern is a valid regex"));

fn is_indexable_name(name: &str) -> bool {
    FIELD_NAME.is_match(name)
}

/// Shape of a compiled primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryKey {
    Scalar(String),
    /// Two or more fields, compared as an ordered tuple.
    Composite(Vec<String>),
}

impl PrimaryKey {
    /// Field names in key order.
    pub fn fields(&self) -> &[String] {
        match self {
            PrimaryKey::Scalar(name) => std::slice::from_ref(name),
            PrimaryKey::Composite(names) => names,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, PrimaryKey::Composite(_))
    }

    pub fn key_path(&self) -> KeyPath {
        match self {
            PrimaryKey::Scalar(name) => KeyPath::Field(name.clone()),
            PrimaryKey::Composite(names) => KeyPath::Composite(names.clone()),
        }
    }
}

/// Primary key under construction.
enum KeyAccumulator {
    Empty,
    Scalar(String),
    Composite(Vec<String>),
}

impl KeyAccumulator {
    fn push(self, field: &str) -> Self {
        match self {
            KeyAccumulator::Empty => KeyAccumulator::Scalar(field.to_string()),
            KeyAccumulator::Scalar(first) => {
                KeyAccumulator::Composite(vec![first, field.to_string()])
            }
            KeyAccumulator::Composite(mut fields) => {
                fields.push(field.to_string());
                KeyAccumulator::Composite(fields)
            }
        }
    }

    fn finish(self) -> Option<PrimaryKey> {
        match self {
            KeyAccumulator::Empty => None,
            KeyAccumulator::Scalar(field) => Some(PrimaryKey::Scalar(field)),
            KeyAccumulator::Composite(fields) => Some(PrimaryKey::Composite(fields)),
        }
    }
}

/// Declaration of a record type, compiled into a [`RecordTypeSchema`].
///
/// ```rust
/// use shelf_schema::{FieldSpec, PrimaryKey, RecordTypeDecl};
///
/// let schema = RecordTypeDecl::new("orders")
///     .field(FieldSpec::new("customer").primary_key())
///     .field(FieldSpec::new("number").primary_key())
///     .field(FieldSpec::new("total"))
///     .compile()
///     .unwrap();
///
/// assert_eq!(
///     schema.primary_key(),
///     &PrimaryKey::Composite(vec!["customer".into(), "number".into()])
/// );
/// assert_eq!(schema.indexed_fields(), ["total", "customer", "number"]);
/// ```
#[derive(Debug, Clone)]
pub struct RecordTypeDecl {
    store_name: String,
    version_increment: u32,
    fields: Vec<FieldSpec>,
}

impl RecordTypeDecl {
    pub fn new(store_name: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into(),
            version_increment: 0,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Bump this type's contribution to the storage version. Raise it
    /// whenever the declaration changes shape.
    pub fn version_increment(mut self, increment: u32) -> Self {
        self.version_increment = increment;
        self
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Compile the declaration.
    pub fn compile(self) -> Result<RecordTypeSchema, SchemaError> {
        if self.store_name.is_empty() {
            return Err(SchemaError::EmptyStoreName);
        }

        let mut seen = HashSet::new();
        let mut key = KeyAccumulator::Empty;
        let mut indexed_fields = Vec::new();
        let mut transformed = BTreeMap::new();
        let mut field_names = Vec::with_capacity(self.fields.len());

        for field in self.fields {
            if !seen.insert(field.name.clone()) {
                return Err(SchemaError::DuplicateField {
                    store: self.store_name,
                    field: field.name,
                });
            }
            if !field.suppress_index && !is_indexable_name(&field.name) {
                return Err(SchemaError::InvalidFieldName {
                    store: self.store_name,
                    field: field.name,
                });
            }

            if field.primary_key {
                key = key.push(&field.name);
            } else if !field.suppress_index {
                indexed_fields.push(field.name.clone());
            }
            if let Some(transformer) = field.transform {
                transformed.insert(field.name.clone(), transformer);
            }
            field_names.push(field.name);
        }

        let primary_key = key
            .finish()
            .ok_or_else(|| SchemaError::MissingPrimaryKey(self.store_name.clone()))?;
        if let PrimaryKey::Composite(parts) = &primary_key {
            indexed_fields.extend(parts.iter().cloned());
        }

        debug!(
            store = %self.store_name,
            ?primary_key,
            ?indexed_fields,
            "compiled record type"
        );
        Ok(RecordTypeSchema {
            store_name: self.store_name,
            primary_key,
            indexed_fields,
            transformed,
            fields: field_names,
            version_increment: self.version_increment,
        })
    }
}

/// The immutable storage layout of one record type.
#[derive(Debug, Clone)]
pub struct RecordTypeSchema {
    store_name: String,
    primary_key: PrimaryKey,
    indexed_fields: Vec<String>,
    transformed: BTreeMap<String, Arc<dyn FieldTransformer>>,
    fields: Vec<String>,
    version_increment: u32,
}

impl RecordTypeSchema {
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn primary_key(&self) -> &PrimaryKey {
        &self.primary_key
    }

    pub fn indexed_fields(&self) -> &[String] {
        &self.indexed_fields
    }

    pub fn has_index(&self, field: &str) -> bool {
        self.indexed_fields.iter().any(|f| f == field)
    }

    /// Declared field names, in declaration order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn transformer(&self, field: &str) -> Option<&Arc<dyn FieldTransformer>> {
        self.transformed.get(field)
    }

    /// Names of fields carrying a transformer.
    pub fn transformed_fields(&self) -> impl Iterator<Item = &str> {
        self.transformed.keys().map(String::as_str)
    }

    pub fn version_increment(&self) -> u32 {
        self.version_increment
    }

    /// The engine table this record type maps to. Each index is named after
    /// its field.
    pub fn table_definition(&self) -> TableDefinition {
        let mut table = TableDefinition::new(&self.store_name, self.primary_key.key_path());
        table.indexes = self
            .indexed_fields
            .iter()
            .map(|field| IndexDefinition::new(field, field))
            .collect();
        table
    }
}
