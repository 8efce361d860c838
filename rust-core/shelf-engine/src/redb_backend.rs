// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// redb-backed persistent storage engine for ShelfDB.
//
// Uses redb (pure Rust, B-tree, ACID, single-file database) to provide
// durable, versioned databases. No C/C++ dependencies, builds on any
// platform with a Rust toolchain.
//
// # Design
//
// - One redb file per logical database: `{dir}/{name}.redb`.
// - `__shelf_meta` holds the catalog (version + table definitions) as JSON.
// - `data/{table}`: encoded primary key → CBOR-serialised `StoredRecord`.
//   CBOR keeps non-finite floats, which JSON cannot represent.
// - `index/{table}/{index}`: `index_entry_key(value, pk)` → encoded pk.
// - Keys use the order-preserving encoding from `crate::encoding`, so redb's
//   byte order is the engine's key order.
// - Transactions lock their tables like the in-memory engine and buffer
//   writes; reads merge the buffer over the committed state. Commit applies
//   the buffer in one redb write transaction (fsynced by redb on commit).
// - Every redb call runs on `spawn_blocking`; no redb transaction is held
//   across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info};

use crate::encoding::{encode_key, index_entry_key, ByteRange};
use crate::engine::{
    Database, Migration, SchemaEditor, StorageEngine, Transaction, TransactionMode,
    VersionChange,
};
use crate::error::StorageError;
use crate::key::{IndexDefinition, Key, KeyPath, KeyQuery, StoredRecord, TableDefinition};

/// Catalog table: a single `"catalog"` entry holding the JSON `Catalog`.
const META_TABLE: redb::TableDefinition<&str, &[u8]> = redb::TableDefinition::new("__shelf_meta");

const CATALOG_KEY: &str = "catalog";

type RawTable<'a> = redb::TableDefinition<'a, &'static [u8], &'static [u8]>;

fn data_table_name(table: &str) -> String {
    format!("data/{table}")
}

fn index_table_name(table: &str, index: &str) -> String {
    format!("index/{table}/{index}")
}

fn raw_table(name: &str) -> RawTable<'_> {
    redb::TableDefinition::new(name)
}

fn unavailable<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> StorageError {
    move |e| StorageError::BackendUnavailable(format!("{context}: {e}"))
}

fn corrupted<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> StorageError {
    move |e| StorageError::CorruptedData(format!("{context}: {e}"))
}

fn decode_record(bytes: &[u8]) -> Result<StoredRecord, StorageError> {
    ciborium::from_reader(bytes)
        .map_err(|e| StorageError::SerializationError(format!("decode record: {e}")))
}

fn encode_record(record: &StoredRecord) -> Result<Vec<u8>, StorageError> {
    let mut buf = Vec::new();
    ciborium::into_writer(record, &mut buf)
        .map_err(|e| StorageError::SerializationError(format!("encode record: {e}")))?;
    Ok(buf)
}

/// Persistent structure of one database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Catalog {
    version: u32,
    tables: BTreeMap<String, TableDefinition>,
}

fn read_catalog(db: &redb::Database) -> Result<Catalog, StorageError> {
    let txn = db.begin_read().map_err(unavailable("read txn"))?;
    let table = match txn.open_table(META_TABLE) {
        Ok(t) => t,
        // Table doesn't exist yet, fresh database
        Err(_) => return Ok(Catalog::default()),
    };
    match table.get(CATALOG_KEY).map_err(corrupted("read catalog"))? {
        Some(raw) => serde_json::from_slice(raw.value())
            .map_err(|e| StorageError::CorruptedData(format!("catalog: {e}"))),
        None => Ok(Catalog::default()),
    }
}

fn write_catalog(txn: &redb::WriteTransaction, catalog: &Catalog) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(catalog)
        .map_err(|e| StorageError::SerializationError(format!("encode catalog: {e}")))?;
    let mut meta = txn.open_table(META_TABLE).map_err(unavailable("open meta"))?;
    meta.insert(CATALOG_KEY, bytes.as_slice())
        .map_err(corrupted("write catalog"))?;
    Ok(())
}

/// State shared by every handle to one open database file.
struct RedbShared {
    db: Arc<redb::Database>,
    state: RwLock<SharedState>,
}

struct SharedState {
    catalog: Catalog,
    /// One lock per table; see `RedbDatabase::begin`.
    locks: BTreeMap<String, Arc<RwLock<()>>>,
    destroyed: bool,
}

impl SharedState {
    fn new(catalog: Catalog) -> Self {
        let locks = catalog
            .tables
            .keys()
            .map(|name| (name.clone(), Arc::new(RwLock::new(()))))
            .collect();
        Self {
            catalog,
            locks,
            destroyed: false,
        }
    }
}

/// A persistent storage engine powered by redb.
///
/// Each logical database lives in its own file under the engine directory.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use shelf_engine::redb_backend::RedbEngine;
/// use shelf_engine::{KeyPath, Migration, SchemaEditor, StorageEngine, VersionChange};
///
/// # tokio_test::block_on(async {
/// let engine = RedbEngine::new("/tmp/shelf-data");
/// let migration: Migration = Arc::new(|editor: &mut dyn SchemaEditor, _: VersionChange| {
///     editor.create_table("users", KeyPath::Field("id".into()))
/// });
/// let db = engine.open("app", 1, migration).await.unwrap();
/// # });
/// ```
pub struct RedbEngine {
    dir: PathBuf,
    open: Arc<Mutex<HashMap<String, Arc<RedbShared>>>>,
}

impl RedbEngine {
    /// Create an engine storing database files under `dir`.
    ///
    /// The directory is created on first open.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            open: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Return the directory holding the database files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing database `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.redb"))
    }

    async fn shared(&self, name: &str) -> Result<Arc<RedbShared>, StorageError> {
        let mut open = self.open.lock().await;
        if let Some(shared) = open.get(name) {
            return Ok(Arc::clone(shared));
        }

        let path = self.path_for(name);
        let (db, catalog) = tokio::task::spawn_blocking(
            move || -> Result<(redb::Database, Catalog), StorageError> {
                // Ensure parent directory exists
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(StorageError::Io)?;
                }
                let db = redb::Database::create(&path).map_err(|e| {
                    StorageError::BackendUnavailable(format!(
                        "failed to open redb at {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let catalog = read_catalog(&db)?;
                Ok((db, catalog))
            },
        )
        .await
        .map_err(unavailable("task join"))??;

        debug!(database = name, stored_version = catalog.version, "loaded redb database");
        let shared = Arc::new(RedbShared {
            db: Arc::new(db),
            state: RwLock::new(SharedState::new(catalog)),
        });
        open.insert(name.to_string(), Arc::clone(&shared));
        Ok(shared)
    }
}

impl std::fmt::Debug for RedbEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbEngine").field("dir", &self.dir).finish()
    }
}

#[async_trait]
impl StorageEngine for RedbEngine {
    type Database = RedbDatabase;

    async fn open(
        &self,
        name: &str,
        version: u32,
        migration: Migration,
    ) -> Result<RedbDatabase, StorageError> {
        if version == 0 {
            return Err(StorageError::InvalidVersion(version));
        }

        let shared = self.shared(name).await?;
        let mut state = shared.state.write().await;
        if version < state.catalog.version {
            return Err(StorageError::VersionTooLow {
                database: name.to_string(),
                requested: version,
                stored: state.catalog.version,
            });
        }

        if version > state.catalog.version {
            // Wait for in-flight transactions before restructuring.
            let mut quiesced = Vec::with_capacity(state.locks.len());
            for lock in state.locks.values() {
                quiesced.push(Arc::clone(lock).write_owned().await);
            }

            let change = VersionChange {
                old_version: state.catalog.version,
                new_version: version,
            };
            info!(
                database = name,
                old_version = change.old_version,
                new_version = change.new_version,
                "migrating redb database"
            );

            let db = Arc::clone(&shared.db);
            let catalog = state.catalog.clone();
            let migrated = tokio::task::spawn_blocking(move || {
                migrate(&db, catalog, change, migration)
            })
            .await
            .map_err(unavailable("task join"))??;

            drop(quiesced);
            *state = SharedState::new(migrated);
        }

        debug!(database = name, version, "opened redb database");
        Ok(RedbDatabase {
            name: name.to_string(),
            version,
            shared: Arc::clone(&shared),
        })
    }

    async fn destroy(&self, name: &str) -> Result<(), StorageError> {
        let removed = self.open.lock().await.remove(name);
        if let Some(shared) = removed {
            shared.state.write().await.destroyed = true;
        }

        let path = self.path_for(name);
        tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        })
        .await
        .map_err(unavailable("task join"))??;

        info!(database = name, "destroyed redb database");
        Ok(())
    }

    fn name(&self) -> &str {
        "redb"
    }
}

/// Run `migration` inside one redb write transaction.
fn migrate(
    db: &redb::Database,
    catalog: Catalog,
    change: VersionChange,
    migration: Migration,
) -> Result<Catalog, StorageError> {
    let txn = db.begin_write().map_err(unavailable("write txn"))?;
    let mut editor = RedbEditor {
        txn: &txn,
        catalog,
    };
    // On error the write transaction is dropped, which aborts it.
    migration(&mut editor, change)?;

    let mut catalog = editor.catalog;
    catalog.version = change.new_version;
    write_catalog(&txn, &catalog)?;
    txn.commit().map_err(corrupted("migration commit"))?;
    Ok(catalog)
}

struct RedbEditor<'txn> {
    txn: &'txn redb::WriteTransaction,
    catalog: Catalog,
}

impl SchemaEditor for RedbEditor<'_> {
    fn table_names(&self) -> Vec<String> {
        self.catalog.tables.keys().cloned().collect()
    }

    fn has_table(&self, name: &str) -> bool {
        self.catalog.tables.contains_key(name)
    }

    fn create_table(&mut self, name: &str, key_path: KeyPath) -> Result<(), StorageError> {
        if self.has_table(name) {
            return Err(StorageError::TableExists(name.to_string()));
        }
        let data_name = data_table_name(name);
        self.txn
            .open_table(raw_table(&data_name))
            .map_err(unavailable("create table"))?;
        self.catalog
            .tables
            .insert(name.to_string(), TableDefinition::new(name, key_path));
        Ok(())
    }

    fn drop_table(&mut self, name: &str) -> Result<(), StorageError> {
        let definition = self
            .catalog
            .tables
            .remove(name)
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))?;

        let data_name = data_table_name(name);
        self.txn
            .delete_table(raw_table(&data_name))
            .map_err(unavailable("drop table"))?;
        for index in &definition.indexes {
            let index_name = index_table_name(name, &index.name);
            self.txn
                .delete_table(raw_table(&index_name))
                .map_err(unavailable("drop index"))?;
        }
        Ok(())
    }

    fn create_index(&mut self, table: &str, index: IndexDefinition) -> Result<(), StorageError> {
        let definition = self
            .catalog
            .tables
            .get_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        if definition.index(&index.name).is_some() {
            return Err(StorageError::IndexExists {
                table: table.to_string(),
                index: index.name,
            });
        }

        // Backfill from rows already in the table.
        let data_name = data_table_name(table);
        let index_name = index_table_name(table, &index.name);
        let data = self
            .txn
            .open_table(raw_table(&data_name))
            .map_err(unavailable("open table"))?;
        let mut entries = self
            .txn
            .open_table(raw_table(&index_name))
            .map_err(unavailable("create index"))?;
        for row in data.iter().map_err(corrupted("scan table"))? {
            let (pk, value) = row.map_err(corrupted("scan entry"))?;
            let record = decode_record(value.value())?;
            if let Some(index_key) = index.extract(&record) {
                entries
                    .insert(index_entry_key(&index_key, pk.value()).as_slice(), pk.value())
                    .map_err(corrupted("index insert"))?;
            }
        }

        definition.indexes.push(index);
        Ok(())
    }
}

/// Handle to an open redb database.
pub struct RedbDatabase {
    name: String,
    version: u32,
    shared: Arc<RedbShared>,
}

impl std::fmt::Debug for RedbDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbDatabase")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish()
    }
}

#[async_trait]
impl Database for RedbDatabase {
    type Transaction = RedbTransaction;

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
    ) -> Result<RedbTransaction, StorageError> {
        let mut scope = tables.to_vec();
        scope.sort_unstable();
        scope.dedup();
        if scope.is_empty() {
            return Err(StorageError::EmptyScope);
        }

        let mut definitions = BTreeMap::new();
        let mut locks = Vec::with_capacity(scope.len());
        {
            let state = self.shared.state.read().await;
            if state.destroyed || state.catalog.version != self.version {
                return Err(StorageError::HandleClosed(self.name.clone()));
            }
            for table in &scope {
                let definition = state
                    .catalog
                    .tables
                    .get(*table)
                    .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
                definitions.insert(table.to_string(), definition.clone());
                locks.push(Arc::clone(&state.locks[*table]));
            }
        }

        // Lock in name order so overlapping scopes cannot deadlock.
        let mut guards = Vec::with_capacity(locks.len());
        for lock in locks {
            guards.push(match mode {
                TransactionMode::ReadOnly => TableLock::Shared(lock.read_owned().await),
                TransactionMode::ReadWrite => TableLock::Exclusive(lock.write_owned().await),
            });
        }

        debug!(database = %self.name, tables = ?scope, ?mode, "began transaction");
        Ok(RedbTransaction {
            db: Arc::clone(&self.shared.db),
            mode,
            definitions,
            _locks: guards,
            staged: BTreeMap::new(),
        })
    }
}

enum TableLock {
    Shared(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Exclusive(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// Buffered writes of one table: encoded pk → new record, or `None` for a delete.
type StagedWrites = BTreeMap<Vec<u8>, Option<StoredRecord>>;

/// A transaction against a redb database.
pub struct RedbTransaction {
    db: Arc<redb::Database>,
    mode: TransactionMode,
    definitions: BTreeMap<String, TableDefinition>,
    _locks: Vec<TableLock>,
    staged: BTreeMap<String, StagedWrites>,
}

impl RedbTransaction {
    fn definition(&self, table: &str) -> Result<&TableDefinition, StorageError> {
        self.definitions
            .get(table)
            .ok_or_else(|| StorageError::TableNotInScope(table.to_string()))
    }

    fn require_write(&self, table: &str) -> Result<(), StorageError> {
        if self.mode == TransactionMode::ReadOnly {
            return Err(StorageError::ReadOnlyTransaction(table.to_string()));
        }
        self.definition(table).map(|_| ())
    }

    async fn committed_exists(&self, table: &str, pk: Vec<u8>) -> Result<bool, StorageError> {
        let db = Arc::clone(&self.db);
        let data_name = data_table_name(table);
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let txn = db.begin_read().map_err(unavailable("read txn"))?;
            let data = match txn.open_table(raw_table(&data_name)) {
                Ok(t) => t,
                Err(_) => return Ok(false),
            };
            Ok(data
                .get(pk.as_slice())
                .map_err(corrupted("get"))?
                .is_some())
        })
        .await
        .map_err(unavailable("task join"))?
    }

    fn stage(&mut self, table: &str, pk: Vec<u8>, write: Option<StoredRecord>) {
        self.staged
            .entry(table.to_string())
            .or_default()
            .insert(pk, write);
    }
}

/// One committed row found by a range read: sort key, encoded pk, record.
type ScannedRow = (Vec<u8>, Vec<u8>, StoredRecord);

/// Read committed rows of `definition` within `range`, in byte order.
fn read_range(
    db: &redb::Database,
    definition: &TableDefinition,
    index: Option<&IndexDefinition>,
    range: &ByteRange,
    limit: usize,
) -> Result<Vec<ScannedRow>, StorageError> {
    let txn = db.begin_read().map_err(unavailable("read txn"))?;
    let data_name = data_table_name(&definition.name);
    let data = match txn.open_table(raw_table(&data_name)) {
        Ok(t) => t,
        Err(_) => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    if limit == 0 {
        return Ok(rows);
    }

    match index {
        None => {
            for entry in data
                .range(range.start.as_slice()..)
                .map_err(corrupted("range scan"))?
            {
                let (key, value) = entry.map_err(corrupted("scan entry"))?;
                let key = key.value();
                if !range.before_end(key) {
                    break;
                }
                rows.push((key.to_vec(), key.to_vec(), decode_record(value.value())?));
                if rows.len() >= limit {
                    break;
                }
            }
        }
        Some(index) => {
            let index_name = index_table_name(&definition.name, &index.name);
            let entries = match txn.open_table(raw_table(&index_name)) {
                Ok(t) => t,
                Err(_) => return Ok(Vec::new()),
            };
            for entry in entries
                .range(range.start.as_slice()..)
                .map_err(corrupted("index scan"))?
            {
                let (key, pk) = entry.map_err(corrupted("index entry"))?;
                let key = key.value();
                if !range.before_end(key) {
                    break;
                }
                let pk = pk.value().to_vec();
                let record = match data.get(pk.as_slice()).map_err(corrupted("get"))? {
                    Some(raw) => decode_record(raw.value())?,
                    None => {
                        return Err(StorageError::CorruptedData(format!(
                            "index `{}` points at a missing row",
                            index.name
                        )))
                    }
                };
                rows.push((key.to_vec(), pk, record));
                if rows.len() >= limit {
                    break;
                }
            }
        }
    }
    Ok(rows)
}

/// Apply buffered writes in a single redb write transaction.
fn apply(
    db: &redb::Database,
    definitions: &BTreeMap<String, TableDefinition>,
    staged: BTreeMap<String, StagedWrites>,
) -> Result<(), StorageError> {
    let txn = db.begin_write().map_err(unavailable("write txn"))?;
    for (table, writes) in staged {
        let definition = definitions
            .get(&table)
            .ok_or_else(|| StorageError::TableNotInScope(table.clone()))?;
        let data_name = data_table_name(&table);
        let mut data = txn
            .open_table(raw_table(&data_name))
            .map_err(unavailable("open table"))?;

        let index_names: Vec<String> = definition
            .indexes
            .iter()
            .map(|index| index_table_name(&table, &index.name))
            .collect();
        let mut indexes = Vec::with_capacity(index_names.len());
        for (index, name) in definition.indexes.iter().zip(&index_names) {
            let entries = txn
                .open_table(raw_table(name))
                .map_err(unavailable("open index"))?;
            indexes.push((index, entries));
        }

        for (pk, write) in writes {
            let previous = data
                .get(pk.as_slice())
                .map_err(corrupted("get"))?
                .map(|raw| decode_record(raw.value()))
                .transpose()?;
            if let Some(previous) = previous {
                for (index, entries) in indexes.iter_mut() {
                    if let Some(index_key) = index.extract(&previous) {
                        entries
                            .remove(index_entry_key(&index_key, &pk).as_slice())
                            .map_err(corrupted("index remove"))?;
                    }
                }
            }

            match write {
                Some(record) => {
                    let bytes = encode_record(&record)?;
                    data.insert(pk.as_slice(), bytes.as_slice())
                        .map_err(corrupted("insert"))?;
                    for (index, entries) in indexes.iter_mut() {
                        if let Some(index_key) = index.extract(&record) {
                            entries
                                .insert(index_entry_key(&index_key, &pk).as_slice(), pk.as_slice())
                                .map_err(corrupted("index insert"))?;
                        }
                    }
                }
                None => {
                    data.remove(pk.as_slice()).map_err(corrupted("remove"))?;
                }
            }
        }
    }
    txn.commit().map_err(corrupted("commit"))?;
    Ok(())
}

#[async_trait]
impl Transaction for RedbTransaction {
    fn mode(&self) -> TransactionMode {
        self.mode
    }

    async fn get(
        &mut self,
        table: &str,
        index: Option<&str>,
        query: &KeyQuery,
    ) -> Result<Option<StoredRecord>, StorageError> {
        let mut found = self.get_many(table, index, Some(query), Some(1)).await?;
        Ok(found.pop())
    }

    async fn get_many(
        &mut self,
        table: &str,
        index: Option<&str>,
        query: Option<&KeyQuery>,
        limit: Option<usize>,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        let definition = self.definition(table)?.clone();
        let index = match index {
            Some(name) => Some(definition.require_index(name)?.clone()),
            None => None,
        };
        let range = match index {
            Some(_) => ByteRange::index(query),
            None => ByteRange::primary(query),
        };
        let Some(range) = range else {
            return Ok(Vec::new());
        };
        let limit = limit.unwrap_or(usize::MAX);

        // Each buffered write can hide at most one committed row.
        let staged_len = self.staged.get(table).map_or(0, |writes| writes.len());
        let fetch = limit.saturating_add(staged_len);

        let db = Arc::clone(&self.db);
        let (scan_range, scan_index) = (range.clone(), index.clone());
        let committed = tokio::task::spawn_blocking(move || {
            read_range(&db, &definition, scan_index.as_ref(), &scan_range, fetch)
        })
        .await
        .map_err(unavailable("task join"))??;

        let Some(writes) = self.staged.get(table) else {
            return Ok(committed
                .into_iter()
                .take(limit)
                .map(|(_, _, record)| record)
                .collect());
        };

        let mut merged: Vec<(Vec<u8>, StoredRecord)> = committed
            .into_iter()
            .filter(|(_, pk, _)| !writes.contains_key(pk))
            .map(|(sort_key, _, record)| (sort_key, record))
            .collect();
        for (pk, write) in writes {
            let Some(record) = write else { continue };
            let sort_key = match &index {
                None => Some(pk.clone()),
                Some(index) => index
                    .extract(record)
                    .map(|index_key| index_entry_key(&index_key, pk)),
            };
            if let Some(sort_key) = sort_key.filter(|key| range.contains(key)) {
                merged.push((sort_key, record.clone()));
            }
        }
        merged.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(merged
            .into_iter()
            .take(limit)
            .map(|(_, record)| record)
            .collect())
    }

    async fn insert(&mut self, table: &str, record: StoredRecord) -> Result<(), StorageError> {
        self.require_write(table)?;
        let key = self.definition(table)?.key_path.extract(&record)?;
        let pk = encode_key(&key);

        let exists = match self.staged.get(table).and_then(|writes| writes.get(&pk)) {
            Some(write) => write.is_some(),
            None => self.committed_exists(table, pk.clone()).await?,
        };
        if exists {
            return Err(StorageError::KeyExists {
                table: table.to_string(),
                key: format!("{key:?}"),
            });
        }

        self.stage(table, pk, Some(record));
        Ok(())
    }

    async fn put(&mut self, table: &str, record: StoredRecord) -> Result<(), StorageError> {
        self.require_write(table)?;
        let key = self.definition(table)?.key_path.extract(&record)?;
        self.stage(table, encode_key(&key), Some(record));
        Ok(())
    }

    async fn delete(&mut self, table: &str, key: &Key) -> Result<(), StorageError> {
        self.require_write(table)?;
        self.stage(table, encode_key(key), None);
        Ok(())
    }

    async fn commit(self) -> Result<(), StorageError> {
        let RedbTransaction {
            db,
            definitions,
            _locks,
            staged,
            ..
        } = self;
        if staged.is_empty() {
            return Ok(());
        }

        tokio::task::spawn_blocking(move || apply(&db, &definitions, staged))
            .await
            .map_err(unavailable("task join"))??;
        // Table locks are released only once the writes are durable.
        drop(_locks);
        Ok(())
    }

    async fn abort(self) -> Result<(), StorageError> {
        Ok(())
    }
}
