// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core storage engine contract for ShelfDB.
//
// An engine hosts named, versioned databases. Opening a database at a
// version newer than the stored one runs a structural migration callback
// exactly once, before the open completes. All data access happens inside
// transactions that declare their table scope and mode up front; engines
// isolate transactions per table.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::key::{IndexDefinition, Key, KeyPath, KeyQuery, StoredRecord};

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

/// Old and new version handed to a migration callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionChange {
    /// Stored version before the upgrade (0 for a fresh database).
    pub old_version: u32,
    pub new_version: u32,
}

/// Structural editing available only inside a migration callback.
///
/// Changes become visible atomically when the migration returns `Ok`; an
/// `Err` leaves the database exactly as it was.
pub trait SchemaEditor {
    fn table_names(&self) -> Vec<String>;

    fn has_table(&self, name: &str) -> bool;

    /// Create an empty table. Fails with [`StorageError::TableExists`].
    fn create_table(&mut self, name: &str, key_path: KeyPath) -> Result<(), StorageError>;

    /// Drop a table with all its rows and indexes.
    fn drop_table(&mut self, name: &str) -> Result<(), StorageError>;

    /// Add an index to an existing table, indexing any rows already present.
    fn create_index(&mut self, table: &str, index: IndexDefinition) -> Result<(), StorageError>;
}

/// Migration callback run when a database is opened at a newer version.
pub type Migration =
    Arc<dyn Fn(&mut dyn SchemaEditor, VersionChange) -> Result<(), StorageError> + Send + Sync>;

/// A storage engine hosting named, versioned databases.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    type Database: Database;

    /// Open (creating if needed) the database `name` at `version`.
    ///
    /// When `version` exceeds the stored version, `migration` runs once
    /// before this returns. A `version` below the stored one fails with
    /// [`StorageError::VersionTooLow`].
    async fn open(
        &self,
        name: &str,
        version: u32,
        migration: Migration,
    ) -> Result<Self::Database, StorageError>;

    /// Delete the database `name` and all of its data. Destroying a
    /// database that does not exist succeeds.
    async fn destroy(&self, name: &str) -> Result<(), StorageError>;

    /// A human-readable name for this engine, used in logging.
    fn name(&self) -> &str;
}

/// An open, versioned database handle.
#[async_trait]
pub trait Database: Send + Sync {
    type Transaction: Transaction;

    fn name(&self) -> &str;

    /// Version this handle was opened at.
    fn version(&self) -> u32;

    /// Begin a transaction over `tables`.
    ///
    /// Read-write transactions over the same table are serialized; read-only
    /// transactions share. Transactions over disjoint tables never wait on
    /// each other.
    async fn begin(
        &self,
        tables: &[&str],
        mode: TransactionMode,
    ) -> Result<Self::Transaction, StorageError>;
}

/// A unit of work over a fixed set of tables.
///
/// Writes become visible to other transactions only on [`Transaction::commit`].
/// Dropping a transaction without committing aborts it.
#[async_trait]
pub trait Transaction: Send {
    fn mode(&self) -> TransactionMode;

    /// First record matching `query`, by primary key or through `index`.
    async fn get(
        &mut self,
        table: &str,
        index: Option<&str>,
        query: &KeyQuery,
    ) -> Result<Option<StoredRecord>, StorageError>;

    /// Records matching `query` (all records when `None`), in key order:
    /// primary-key order, or index-value order (ties by primary key) when
    /// `index` is given. At most `limit` records are returned.
    async fn get_many(
        &mut self,
        table: &str,
        index: Option<&str>,
        query: Option<&KeyQuery>,
        limit: Option<usize>,
    ) -> Result<Vec<StoredRecord>, StorageError>;

    /// Add a record. Fails with [`StorageError::KeyExists`] if its primary
    /// key is taken.
    async fn insert(&mut self, table: &str, record: StoredRecord) -> Result<(), StorageError>;

    /// Add or replace a record.
    async fn put(&mut self, table: &str, record: StoredRecord) -> Result<(), StorageError>;

    /// Remove the record at `key`, if any.
    async fn delete(&mut self, table: &str, key: &Key) -> Result<(), StorageError>;

    async fn commit(self) -> Result<(), StorageError>;

    async fn abort(self) -> Result<(), StorageError>;
}
