// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory storage engine for ShelfDB.
//
// Each table is a `BTreeMap` keyed by primary key, wrapped in its own tokio
// `RwLock`. A transaction locks the tables in its scope in name order
// (shared for read-only, exclusive for read-write), so transactions over
// disjoint tables never contend. Read-write transactions stage their writes
// in a per-key overlay that reads merge over the table; commit applies it.
// Intended for testing, development, and small ephemeral datasets.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info};

use crate::engine::{
    Database, Migration, SchemaEditor, StorageEngine, Transaction, TransactionMode,
    VersionChange,
};
use crate::error::StorageError;
use crate::key::{IndexDefinition, Key, KeyPath, KeyQuery, StoredRecord, TableDefinition};

/// Uncommitted writes to one table, by primary key. `None` marks a delete.
type Overlay = BTreeMap<Key, Option<StoredRecord>>;

/// Merge `overlay` over `base` (both in key order, over the same bounds),
/// yielding the rows a transaction sees.
fn merge_rows<'a, B, O>(base: B, overlay: O) -> impl Iterator<Item = (&'a Key, &'a StoredRecord)>
where
    B: Iterator<Item = (&'a Key, &'a StoredRecord)>,
    O: Iterator<Item = (&'a Key, &'a Option<StoredRecord>)>,
{
    let mut base = base.peekable();
    let mut overlay = overlay.peekable();
    std::iter::from_fn(move || loop {
        let order = match (base.peek(), overlay.peek()) {
            (None, None) => return None,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((committed, _)), Some((staged, _))) => committed.cmp(staged),
        };
        match order {
            Ordering::Less => return base.next(),
            Ordering::Equal => {
                base.next();
            }
            Ordering::Greater => {}
        }
        if let Some((key, Some(record))) = overlay.next() {
            return Some((key, record));
        }
    })
}

/// One table: its definition and its rows in primary-key order.
#[derive(Debug, Clone)]
struct MemoryTable {
    definition: TableDefinition,
    rows: BTreeMap<Key, StoredRecord>,
}

impl MemoryTable {
    fn new(definition: TableDefinition) -> Self {
        Self {
            definition,
            rows: BTreeMap::new(),
        }
    }

    /// Whether `key` is live once `overlay` is applied.
    fn contains(&self, overlay: &Overlay, key: &Key) -> bool {
        match overlay.get(key) {
            Some(staged) => staged.is_some(),
            None => self.rows.contains_key(key),
        }
    }

    fn scan(
        &self,
        overlay: &Overlay,
        index: Option<&str>,
        query: Option<&KeyQuery>,
        limit: Option<usize>,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        let limit = limit.unwrap_or(usize::MAX);
        if query.is_some_and(|q| !q.is_satisfiable()) {
            return Ok(Vec::new());
        }

        let Some(index) = index else {
            let bounds = query.map_or((Bound::Unbounded, Bound::Unbounded), KeyQuery::bounds);
            let rows = merge_rows(
                self.rows.range::<Key, _>(bounds),
                overlay.range::<Key, _>(bounds),
            );
            return Ok(rows.take(limit).map(|(_, record)| record.clone()).collect());
        };

        let index = self.definition.require_index(index)?;
        let mut hits: Vec<(Key, &Key, &StoredRecord)> =
            merge_rows(self.rows.iter(), overlay.iter())
                .filter_map(|(pk, record)| index.extract(record).map(|ik| (ik, pk, record)))
                .filter(|(ik, _, _)| query.map_or(true, |q| q.matches(ik)))
                .collect();
        hits.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(_, _, record)| record.clone())
            .collect())
    }

    fn apply(&mut self, overlay: Overlay) {
        for (key, staged) in overlay {
            match staged {
                Some(record) => {
                    self.rows.insert(key, record);
                }
                None => {
                    self.rows.remove(&key);
                }
            }
        }
    }
}

/// Shared state of one named database.
#[derive(Debug, Default)]
struct DatabaseSlot {
    version: u32,
    destroyed: bool,
    tables: BTreeMap<String, Arc<RwLock<MemoryTable>>>,
}

/// An in-memory storage engine.
///
/// All data lives in process memory and is lost on drop. Clones share the
/// same databases.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use shelf_engine::{
///     Database, InMemoryEngine, Key, KeyPath, KeyQuery, Migration, Scalar, SchemaEditor,
///     StorageEngine, StoredRecord, Transaction, TransactionMode, VersionChange,
/// };
///
/// # tokio_test::block_on(async {
/// let engine = InMemoryEngine::new();
/// let migration: Migration = Arc::new(|editor: &mut dyn SchemaEditor, _: VersionChange| {
///     editor.create_table("users", KeyPath::Field("id".into()))
/// });
/// let db = engine.open("app", 1, migration).await.unwrap();
///
/// let mut tx = db.begin(&["users"], TransactionMode::ReadWrite).await.unwrap();
/// let mut record = StoredRecord::new();
/// record.insert("id".into(), Scalar::from("u1"));
/// tx.insert("users", record).await.unwrap();
/// tx.commit().await.unwrap();
///
/// let mut tx = db.begin(&["users"], TransactionMode::ReadOnly).await.unwrap();
/// let found = tx.get("users", None, &KeyQuery::Exact(Key::from("u1"))).await.unwrap();
/// assert!(found.is_some());
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryEngine {
    databases: Arc<Mutex<HashMap<String, Arc<RwLock<DatabaseSlot>>>>>,
}

impl InMemoryEngine {
    /// Create a new engine with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored version of `name`, or `None` if it was never opened.
    pub async fn stored_version(&self, name: &str) -> Option<u32> {
        let slot = self.databases.lock().await.get(name).cloned()?;
        let version = slot.read().await.version;
        Some(version)
    }

    /// Names of the tables in `name`, sorted.
    pub async fn table_names(&self, name: &str) -> Vec<String> {
        let Some(slot) = self.databases.lock().await.get(name).cloned() else {
            return Vec::new();
        };
        let names = slot.read().await.tables.keys().cloned().collect();
        names
    }

    /// Definition of `table` in database `name`.
    pub async fn table_definition(&self, name: &str, table: &str) -> Option<TableDefinition> {
        let slot = self.databases.lock().await.get(name).cloned()?;
        let handle = slot.read().await.tables.get(table).cloned()?;
        let definition = handle.read().await.definition.clone();
        Some(definition)
    }
}

#[async_trait]
impl StorageEngine for InMemoryEngine {
    type Database = MemoryDatabase;

    async fn open(
        &self,
        name: &str,
        version: u32,
        migration: Migration,
    ) -> Result<MemoryDatabase, StorageError> {
        if version == 0 {
            return Err(StorageError::InvalidVersion(version));
        }

        let slot = {
            let mut databases = self.databases.lock().await;
            Arc::clone(databases.entry(name.to_string()).or_default())
        };

        let mut state = slot.write().await;
        if version < state.version {
            return Err(StorageError::VersionTooLow {
                database: name.to_string(),
                requested: version,
                stored: state.version,
            });
        }

        if version > state.version {
            let change = VersionChange {
                old_version: state.version,
                new_version: version,
            };

            // Snapshot every table; waits for in-flight transactions to finish.
            let mut editor = MemoryEditor::default();
            for (table_name, table) in &state.tables {
                editor
                    .tables
                    .insert(table_name.clone(), table.read().await.clone());
            }

            info!(
                database = name,
                old_version = change.old_version,
                new_version = change.new_version,
                "migrating in-memory database"
            );
            migration(&mut editor, change)?;

            state.tables = editor
                .tables
                .into_iter()
                .map(|(table_name, table)| (table_name, Arc::new(RwLock::new(table))))
                .collect();
            state.version = version;
        }

        debug!(database = name, version, "opened in-memory database");
        Ok(MemoryDatabase {
            name: name.to_string(),
            version,
            slot: Arc::clone(&slot),
        })
    }

    async fn destroy(&self, name: &str) -> Result<(), StorageError> {
        let removed = self.databases.lock().await.remove(name);
        if let Some(slot) = removed {
            slot.write().await.destroyed = true;
            info!(database = name, "destroyed in-memory database");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// Migration-time view: owned copies of every table.
#[derive(Debug, Default)]
struct MemoryEditor {
    tables: BTreeMap<String, MemoryTable>,
}

impl SchemaEditor for MemoryEditor {
    fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    fn create_table(&mut self, name: &str, key_path: KeyPath) -> Result<(), StorageError> {
        if self.tables.contains_key(name) {
            return Err(StorageError::TableExists(name.to_string()));
        }
        self.tables.insert(
            name.to_string(),
            MemoryTable::new(TableDefinition::new(name, key_path)),
        );
        Ok(())
    }

    fn drop_table(&mut self, name: &str) -> Result<(), StorageError> {
        self.tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    fn create_index(&mut self, table: &str, index: IndexDefinition) -> Result<(), StorageError> {
        let target = self
            .tables
            .get_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        if target.definition.index(&index.name).is_some() {
            return Err(StorageError::IndexExists {
                table: table.to_string(),
                index: index.name,
            });
        }
        // Index order is computed at scan time, so existing rows need no backfill.
        target.definition.indexes.push(index);
        Ok(())
    }
}

/// Handle to an open in-memory database.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    name: String,
    version: u32,
    slot: Arc<RwLock<DatabaseSlot>>,
}

#[async_trait]
impl Database for MemoryDatabase {
    type Transaction = MemoryTransaction;

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    async fn begin(
        &self,
        tables: &[&str],
        mode: TransactionMode,
    ) -> Result<MemoryTransaction, StorageError> {
        let mut scope = tables.to_vec();
        scope.sort_unstable();
        scope.dedup();
        if scope.is_empty() {
            return Err(StorageError::EmptyScope);
        }

        let handles = {
            let slot = self.slot.read().await;
            if slot.destroyed || slot.version != self.version {
                return Err(StorageError::HandleClosed(self.name.clone()));
            }
            scope
                .iter()
                .map(|table| {
                    slot.tables
                        .get(*table)
                        .map(|handle| (table.to_string(), Arc::clone(handle)))
                        .ok_or_else(|| StorageError::TableNotFound(table.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        // Lock in name order so overlapping scopes cannot deadlock.
        let mut locked = BTreeMap::new();
        for (table, handle) in handles {
            let guard = match mode {
                TransactionMode::ReadOnly => TableGuard::Shared(handle.read_owned().await),
                TransactionMode::ReadWrite => TableGuard::Exclusive(handle.write_owned().await),
            };
            locked.insert(table, guard);
        }

        debug!(database = %self.name, tables = ?scope, ?mode, "began transaction");
        Ok(MemoryTransaction {
            mode,
            tables: locked,
            staged: BTreeMap::new(),
        })
    }
}

enum TableGuard {
    Shared(OwnedRwLockReadGuard<MemoryTable>),
    Exclusive(OwnedRwLockWriteGuard<MemoryTable>),
}

impl TableGuard {
    fn table(&self) -> &MemoryTable {
        match self {
            TableGuard::Shared(guard) => guard,
            TableGuard::Exclusive(guard) => guard,
        }
    }
}

/// A transaction against an in-memory database.
pub struct MemoryTransaction {
    mode: TransactionMode,
    tables: BTreeMap<String, TableGuard>,
    /// Writes not yet applied, per table.
    staged: BTreeMap<String, Overlay>,
}

static NO_WRITES: Overlay = BTreeMap::new();

impl MemoryTransaction {
    fn view(&self, table: &str) -> Result<(&MemoryTable, &Overlay), StorageError> {
        let committed = self
            .tables
            .get(table)
            .map(TableGuard::table)
            .ok_or_else(|| StorageError::TableNotInScope(table.to_string()))?;
        Ok((committed, self.staged.get(table).unwrap_or(&NO_WRITES)))
    }

    /// Key of `record` in `table`, checked against the transaction's mode and scope.
    fn write_key(&self, table: &str, record: &StoredRecord) -> Result<Key, StorageError> {
        if self.mode == TransactionMode::ReadOnly {
            return Err(StorageError::ReadOnlyTransaction(table.to_string()));
        }
        let (committed, _) = self.view(table)?;
        committed.definition.key_path.extract(record)
    }

    fn stage(&mut self, table: &str, key: Key, record: Option<StoredRecord>) {
        self.staged
            .entry(table.to_string())
            .or_default()
            .insert(key, record);
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn mode(&self) -> TransactionMode {
        self.mode
    }

    async fn get(
        &mut self,
        table: &str,
        index: Option<&str>,
        query: &KeyQuery,
    ) -> Result<Option<StoredRecord>, StorageError> {
        let (committed, overlay) = self.view(table)?;
        let mut found = committed.scan(overlay, index, Some(query), Some(1))?;
        Ok(found.pop())
    }

    async fn get_many(
        &mut self,
        table: &str,
        index: Option<&str>,
        query: Option<&KeyQuery>,
        limit: Option<usize>,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        let (committed, overlay) = self.view(table)?;
        committed.scan(overlay, index, query, limit)
    }

    async fn insert(&mut self, table: &str, record: StoredRecord) -> Result<(), StorageError> {
        let key = self.write_key(table, &record)?;
        let (committed, overlay) = self.view(table)?;
        if committed.contains(overlay, &key) {
            return Err(StorageError::KeyExists {
                table: table.to_string(),
                key: format!("{key:?}"),
            });
        }
        self.stage(table, key, Some(record));
        Ok(())
    }

    async fn put(&mut self, table: &str, record: StoredRecord) -> Result<(), StorageError> {
        let key = self.write_key(table, &record)?;
        self.stage(table, key, Some(record));
        Ok(())
    }

    async fn delete(&mut self, table: &str, key: &Key) -> Result<(), StorageError> {
        if self.mode == TransactionMode::ReadOnly {
            return Err(StorageError::ReadOnlyTransaction(table.to_string()));
        }
        self.view(table)?;
        self.stage(table, key.clone(), None);
        Ok(())
    }

    async fn commit(self) -> Result<(), StorageError> {
        let MemoryTransaction {
            mut tables, staged, ..
        } = self;
        for (name, overlay) in staged {
            if let Some(TableGuard::Exclusive(guard)) = tables.get_mut(&name) {
                guard.apply(overlay);
            }
        }
        Ok(())
    }

    async fn abort(self) -> Result<(), StorageError> {
        // Staged writes are discarded with the transaction.
        Ok(())
    }
}
