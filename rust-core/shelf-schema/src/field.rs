// SPDX-License-Identifier: PMPL-1.0-or-later
//! Field declarations.

use std::sync::Arc;

use crate::transform::{DateTransformer, FieldTransformer};

/// One declared field of a record type.
///
/// ```rust
/// use shelf_schema::FieldSpec;
///
/// let id = FieldSpec::new("id").primary_key();
/// let created = FieldSpec::new("createdAt").date();
/// let notes = FieldSpec::new("free-text notes").no_index();
/// assert!(id.is_primary_key());
/// assert!(created.transformer().is_some());
/// assert!(notes.is_index_suppressed());
/// ```
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub(crate) name: String,
    pub(crate) primary_key: bool,
    pub(crate) suppress_index: bool,
    pub(crate) transform: Option<Arc<dyn FieldTransformer>>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: false,
            suppress_index: false,
            transform: None,
        }
    }

    /// Make this field part of the primary key. Declaring a second primary
    /// key field makes the key composite, in declaration order.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Keep this field out of the index set. Such a field may use any name.
    pub fn no_index(mut self) -> Self {
        self.suppress_index = true;
        self
    }

    /// Attach a transformer applied on every read and write of this field.
    pub fn transform(mut self, transformer: Arc<dyn FieldTransformer>) -> Self {
        self.transform = Some(transformer);
        self
    }

    /// Shorthand for `transform(Arc::new(DateTransformer))`.
    pub fn date(self) -> Self {
        self.transform(Arc::new(DateTransformer))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_index_suppressed(&self) -> bool {
        self.suppress_index
    }

    pub fn transformer(&self) -> Option<&Arc<dyn FieldTransformer>> {
        self.transform.as_ref()
    }
}
