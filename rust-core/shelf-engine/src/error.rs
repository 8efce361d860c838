// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage error types for the ShelfDB engine contract.
//
// One enum covers every failure an engine may report: I/O and backend
// failures, version negotiation, schema (table/index) editing, transaction
// scope violations, and key constraint violations.

use thiserror::Error;

/// Errors that can occur when interacting with a storage engine.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred in the underlying storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or deserialize a stored record.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The stored data is corrupted or in an unexpected format.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// The storage backend is not available (e.g., file locked, task panicked).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Databases are versioned from 1; version 0 cannot be opened.
    #[error("invalid database version {0} (versions start at 1)")]
    InvalidVersion(u32),

    /// The requested version is older than the version already on disk.
    #[error("cannot open database `{database}` at version {requested}: stored version is {stored}")]
    VersionTooLow {
        /// Logical database name.
        database: String,
        /// Version the caller asked for.
        requested: u32,
        /// Version currently stored.
        stored: u32,
    },

    /// The handle was superseded by a newer version or the database was destroyed.
    #[error("database handle for `{0}` is closed")]
    HandleClosed(String),

    /// The named table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// A table with this name already exists.
    #[error("table already exists: {0}")]
    TableExists(String),

    /// The named index does not exist on the table.
    #[error("index `{index}` not found on table `{table}`")]
    IndexNotFound {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
    },

    /// An index with this name already exists on the table.
    #[error("index `{index}` already exists on table `{table}`")]
    IndexExists {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
    },

    /// A transaction touched a table outside the scope it was opened with.
    #[error("table `{0}` is not in this transaction's scope")]
    TableNotInScope(String),

    /// A transaction was requested over zero tables.
    #[error("a transaction must cover at least one table")]
    EmptyScope,

    /// A write was attempted inside a read-only transaction.
    #[error("cannot write to `{0}` inside a read-only transaction")]
    ReadOnlyTransaction(String),

    /// An insert collided with an existing primary key.
    #[error("key {key} already exists in table `{table}`")]
    KeyExists {
        /// Table name.
        table: String,
        /// Debug rendering of the conflicting key.
        key: String,
    },

    /// A record is missing (or has a null) value for a primary-key field.
    #[error("record has no value for key field `{0}`")]
    MissingKeyField(String),

    /// A migration callback rejected the upgrade.
    #[error("migration failed: {0}")]
    Migration(String),
}
