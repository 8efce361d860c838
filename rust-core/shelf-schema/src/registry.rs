// SPDX-License-Identifier: PMPL-1.0-or-later
//! Append-only registry of compiled record types.

use std::sync::Arc;

use tracing::info;

use crate::compiler::{RecordTypeDecl, RecordTypeSchema};
use crate::error::SchemaError;

/// Every record type known to one database, plus the storage version they
/// imply together.
///
/// The version is a fold over the entries, `Σ (version_increment + 1)`, so
/// the set of registered types decides it regardless of registration order.
/// It never decreases as entries are added.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: Vec<Arc<RecordTypeSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and register a declaration.
    pub fn register(&mut self, decl: RecordTypeDecl) -> Result<Arc<RecordTypeSchema>, SchemaError> {
        if self.get(decl.store_name()).is_some() {
            return Err(SchemaError::DuplicateStoreName(decl.store_name().to_string()));
        }
        self.insert(decl.compile()?)
    }

    /// Register an already compiled schema.
    pub fn insert(&mut self, schema: RecordTypeSchema) -> Result<Arc<RecordTypeSchema>, SchemaError> {
        if self.get(schema.store_name()).is_some() {
            return Err(SchemaError::DuplicateStoreName(schema.store_name().to_string()));
        }
        let schema = Arc::new(schema);
        self.entries.push(Arc::clone(&schema));
        info!(
            store = schema.store_name(),
            storage_version = self.storage_version(),
            "registered record type"
        );
        Ok(schema)
    }

    /// Aggregate storage version of all registered types. Zero when empty.
    pub fn storage_version(&self) -> u32 {
        self.entries.iter().fold(0u32, |version, schema| {
            version
                .saturating_add(schema.version_increment())
                .saturating_add(1)
        })
    }

    pub fn get(&self, store_name: &str) -> Option<&Arc<RecordTypeSchema>> {
        self.entries
            .iter()
            .find(|schema| schema.store_name() == store_name)
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<RecordTypeSchema>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
