// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ShelfDB Storage Engine
//
// This crate defines the contract of a versioned, transactional key/value
// engine and ships two implementations. Higher layers (`shelf-schema`,
// `shelf-store`) depend only on the traits in [`engine`], so engines can be
// swapped without changing application logic.
//
// # Modules
//
// - [`engine`] -- The `StorageEngine`, `Database`, `Transaction` and
//   `SchemaEditor` traits.
// - [`key`] -- Scalars, keys, key paths, table and index definitions, queries.
// - [`encoding`] -- Order-preserving byte encoding of keys for byte-ordered engines.
// - [`error`] -- The `StorageError` enum covering all engine failure modes.
// - [`memory`] -- An in-memory `BTreeMap`-based engine for testing and
//   ephemeral workloads.
// - [`redb_backend`] -- A persistent engine on redb (feature `redb-backend`).
//
// # Example
//
// ```rust
// use std::sync::Arc;
// use shelf_engine::{
//     Database, InMemoryEngine, Key, KeyPath, KeyQuery, Migration, Scalar, SchemaEditor,
//     StorageEngine, StorageError, StoredRecord, Transaction, TransactionMode, VersionChange,
// };
//
// # tokio_test::block_on(async {
// let engine = InMemoryEngine::new();
// let migration: Migration = Arc::new(
//     |editor: &mut dyn SchemaEditor, _: VersionChange| -> Result<(), StorageError> {
//         editor.create_table("notes", KeyPath::Field("id".into()))
//     },
// );
// let db = engine.open("app", 1, migration).await.unwrap();
//
// let mut tx = db.begin(&["notes"], TransactionMode::ReadWrite).await.unwrap();
// let mut note = StoredRecord::new();
// note.insert("id".into(), Scalar::from("n1"));
// tx.insert("notes", note).await.unwrap();
// tx.commit().await.unwrap();
//
// let mut tx = db.begin(&["notes"], TransactionMode::ReadOnly).await.unwrap();
// let found = tx.get("notes", None, &KeyQuery::Exact(Key::from("n1"))).await.unwrap();
// assert!(found.is_some());
// # });
// ```

pub mod encoding;
pub mod engine;
pub mod error;
pub mod key;
pub mod memory;

// Optional persistent engines, feature-gated.
#[cfg(feature = "redb-backend")]
pub mod redb_backend;

// Re-export the most commonly used types at the crate root for convenience.
pub use engine::{
    Database, Migration, SchemaEditor, StorageEngine, Transaction, TransactionMode, VersionChange,
};
pub use error::StorageError;
pub use key::{
    IndexDefinition, Key, KeyPath, KeyQuery, KeyRange, Scalar, StoredRecord, TableDefinition,
};
pub use memory::{InMemoryEngine, MemoryDatabase, MemoryTransaction};

#[cfg(feature = "redb-backend")]
pub use redb_backend::{RedbDatabase, RedbEngine, RedbTransaction};
