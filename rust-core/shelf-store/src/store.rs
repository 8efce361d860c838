// SPDX-License-Identifier: PMPL-1.0-or-later
//! Record stores: schema-mediated CRUD over one table.
//!
//! Every operation runs in its own transaction:
//!
//! ```text
//! Idle → HandleOpening → TransactionOpen → OperationRequested
//!      → (OperationSucceeded → Committed) | (OperationFailed → Aborted)
//! ```
//!
//! Reads use read-only transactions and still commit explicitly. Nothing is
//! retried; an engine failure aborts the transaction and surfaces as
//! [`ShelfError::Operation`].

use std::sync::Arc;

use shelf_engine::{Database, StorageEngine, StorageError, Transaction, TransactionMode};
use shelf_schema::{Record, RecordKey, RecordQuery, RecordTypeSchema, ValueCodec};
use tracing::{debug, instrument, warn};

use crate::error::{OperationKind, ShelfError, ShelfResult};
use crate::shelf::Shelf;

type TransactionOf<E> = <<E as StorageEngine>::Database as Database>::Transaction;

#[derive(Debug, Clone, Copy)]
enum Phase {
    HandleOpening,
    TransactionOpen,
    OperationRequested,
    OperationSucceeded,
    OperationFailed,
    Committed,
    Aborted,
}

/// Parameters of [`RecordStore::select_many`].
///
/// ```rust
/// use shelf_schema::RecordQuery;
/// use shelf_store::Selection;
///
/// let recent = Selection::new()
///     .index("createdAt")
///     .range(RecordQuery::at_least("2024-01-01T00:00:00Z"))
///     .limit(10);
/// assert_eq!(recent.limit, Some(10));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Key or range to match; everything when `None`.
    pub query: Option<RecordQuery>,
    pub limit: Option<usize>,
    /// Index to read through; the primary key when `None`.
    pub index: Option<String>,
}

impl Selection {
    /// Select every record.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exact(mut self, key: impl Into<RecordKey>) -> Self {
        self.query = Some(RecordQuery::Exact(key.into()));
        self
    }

    pub fn range(mut self, query: RecordQuery) -> Self {
        self.query = Some(query);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }
}

/// CRUD access to the records of one registered type.
///
/// Created by [`Shelf::register`]. Cheap to clone; clones share the shelf's
/// database handle.
pub struct RecordStore<E: StorageEngine> {
    shelf: Shelf<E>,
    schema: Arc<RecordTypeSchema>,
    codec: ValueCodec,
}

impl<E: StorageEngine> Clone for RecordStore<E> {
    fn clone(&self) -> Self {
        Self {
            shelf: self.shelf.clone(),
            schema: Arc::clone(&self.schema),
            codec: self.codec.clone(),
        }
    }
}

impl<E: StorageEngine> RecordStore<E> {
    pub(crate) fn new(shelf: Shelf<E>, schema: Arc<RecordTypeSchema>) -> Self {
        let codec = ValueCodec::for_schema(&schema);
        Self {
            shelf,
            schema,
            codec,
        }
    }

    pub fn schema(&self) -> &RecordTypeSchema {
        &self.schema
    }

    pub fn store_name(&self) -> &str {
        self.schema.store_name()
    }

    /// Fetch one record by primary key, or by the value of `index` when it
    /// names an indexed field.
    ///
    /// An index name the schema doesn't know falls back to the primary key.
    #[instrument(skip(self, key), fields(store = %self.schema.store_name()))]
    pub async fn select(
        &self,
        key: impl Into<RecordKey>,
        index: Option<&str>,
    ) -> ShelfResult<Option<Record>> {
        let op = OperationKind::Select;
        let (index, fields) = self.resolve_index(index);
        let query = self.codec.encode_query(&fields, RecordQuery::Exact(key.into()))?;

        let mut tx = self.begin(op, TransactionMode::ReadOnly).await?;
        self.trace(op, Phase::OperationRequested);
        let result = tx.get(self.store_name(), index, &query).await;
        let found = self.finish(op, tx, result).await?;

        found
            .map(|stored| self.codec.from_storage(stored))
            .transpose()
            .map_err(ShelfError::from)
    }

    /// Fetch records in engine key order: primary-key order, or index-value
    /// order (ties by primary key) when reading through an index.
    #[instrument(skip(self, selection), fields(store = %self.schema.store_name()))]
    pub async fn select_many(&self, selection: Selection) -> ShelfResult<Vec<Record>> {
        let op = OperationKind::SelectMany;
        let (index, fields) = self.resolve_index(selection.index.as_deref());
        let query = selection
            .query
            .map(|query| self.codec.encode_query(&fields, query))
            .transpose()?;

        let mut tx = self.begin(op, TransactionMode::ReadOnly).await?;
        self.trace(op, Phase::OperationRequested);
        let result = tx
            .get_many(self.store_name(), index, query.as_ref(), selection.limit)
            .await;
        let rows = self.finish(op, tx, result).await?;

        rows.into_iter()
            .map(|stored| self.codec.from_storage(stored).map_err(ShelfError::from))
            .collect()
    }

    /// Add a record. Fails if its primary key is already taken.
    #[instrument(skip(self, record), fields(store = %self.schema.store_name()))]
    pub async fn insert(&self, record: Record) -> ShelfResult<()> {
        let op = OperationKind::Insert;
        let stored = self.codec.to_storage(record)?;

        let mut tx = self.begin(op, TransactionMode::ReadWrite).await?;
        self.trace(op, Phase::OperationRequested);
        let result = tx.insert(self.store_name(), stored).await;
        self.finish(op, tx, result).await
    }

    /// Insert or fully replace a record.
    #[instrument(skip(self, record), fields(store = %self.schema.store_name()))]
    pub async fn update(&self, record: Record) -> ShelfResult<()> {
        let op = OperationKind::Update;
        let stored = self.codec.to_storage(record)?;

        let mut tx = self.begin(op, TransactionMode::ReadWrite).await?;
        self.trace(op, Phase::OperationRequested);
        let result = tx.put(self.store_name(), stored).await;
        self.finish(op, tx, result).await
    }

    /// Remove the record at primary key `key`. A missing key is not an error.
    #[instrument(skip(self, key), fields(store = %self.schema.store_name()))]
    pub async fn delete(&self, key: impl Into<RecordKey>) -> ShelfResult<()> {
        let op = OperationKind::Delete;
        let key = self
            .codec
            .encode_key(self.schema.primary_key().fields(), key.into())?;

        let mut tx = self.begin(op, TransactionMode::ReadWrite).await?;
        self.trace(op, Phase::OperationRequested);
        let result = tx.delete(self.store_name(), &key).await;
        self.finish(op, tx, result).await
    }

    /// The engine index to read through and the fields its keys address.
    fn resolve_index<'a>(&self, index: Option<&'a str>) -> (Option<&'a str>, Vec<String>) {
        match index {
            Some(name) if self.schema.has_index(name) => (Some(name), vec![name.to_string()]),
            other => {
                if let Some(name) = other {
                    debug!(
                        store = %self.schema.store_name(),
                        index = name,
                        "unknown index, using primary key"
                    );
                }
                (None, self.schema.primary_key().fields().to_vec())
            }
        }
    }

    async fn begin(
        &self,
        op: OperationKind,
        mode: TransactionMode,
    ) -> ShelfResult<TransactionOf<E>> {
        self.trace(op, Phase::HandleOpening);
        let db = self.shelf.database().await?;
        let tx = db
            .begin(&[self.store_name()], mode)
            .await
            .map_err(|source| self.operation_error(op, source))?;
        self.trace(op, Phase::TransactionOpen);
        Ok(tx)
    }

    /// Commit on success, abort on failure.
    async fn finish<T>(
        &self,
        op: OperationKind,
        tx: TransactionOf<E>,
        result: Result<T, StorageError>,
    ) -> ShelfResult<T> {
        match result {
            Ok(value) => {
                self.trace(op, Phase::OperationSucceeded);
                tx.commit()
                    .await
                    .map_err(|source| self.operation_error(op, source))?;
                self.trace(op, Phase::Committed);
                Ok(value)
            }
            Err(source) => {
                self.trace(op, Phase::OperationFailed);
                if let Err(abort_error) = tx.abort().await {
                    warn!(
                        store = %self.schema.store_name(),
                        operation = %op,
                        error = %abort_error,
                        "abort failed"
                    );
                }
                self.trace(op, Phase::Aborted);
                Err(self.operation_error(op, source))
            }
        }
    }

    fn operation_error(&self, operation: OperationKind, source: StorageError) -> ShelfError {
        ShelfError::Operation {
            store: self.schema.store_name().to_string(),
            operation,
            source,
        }
    }

    fn trace(&self, op: OperationKind, phase: Phase) {
        debug!(store = %self.schema.store_name(), operation = %op, ?phase);
    }
}

impl<E: StorageEngine> std::fmt::Debug for RecordStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("store", &self.schema.store_name())
            .finish()
    }
}
