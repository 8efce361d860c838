// SPDX-License-Identifier: PMPL-1.0-or-later
//! The shelf: registry, configuration and the shared database handle.

use std::sync::Arc;

use parking_lot::RwLock;
use shelf_engine::{Database, StorageEngine};
use shelf_schema::{RecordTypeDecl, RecordTypeSchema, SchemaRegistry};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ShelfConfig;
use crate::error::{ShelfError, ShelfResult};
use crate::migration::build_migration;
use crate::store::RecordStore;

struct ShelfInner<E: StorageEngine> {
    config: ShelfConfig,
    engine: E,
    registry: RwLock<SchemaRegistry>,
    /// Opened lazily; replaced when the registry outgrows its version.
    handle: Mutex<Option<Arc<E::Database>>>,
}

/// Entry point: registers record types and owns the database handle they
/// share.
///
/// Register every record type before the first operation. A type registered
/// later raises the storage version, so the next operation reopens the
/// database and rebuilds every table (dropping their rows).
///
/// # Example
///
/// ```rust
/// use shelf_engine::InMemoryEngine;
/// use shelf_schema::{FieldSpec, Record, RecordTypeDecl};
/// use shelf_store::{Shelf, ShelfConfig};
///
/// # tokio_test::block_on(async {
/// let shelf = Shelf::new(InMemoryEngine::new(), ShelfConfig::new("app"));
/// let users = shelf
///     .register(
///         RecordTypeDecl::new("users")
///             .field(FieldSpec::new("id").primary_key())
///             .field(FieldSpec::new("name")),
///     )
///     .unwrap();
///
/// users.insert(Record::new().with("id", "u1").with("name", "Ada")).await.unwrap();
/// let found = users.select("u1", None).await.unwrap();
/// assert_eq!(found.unwrap().get("name"), Some(&"Ada".into()));
/// # });
/// ```
pub struct Shelf<E: StorageEngine> {
    inner: Arc<ShelfInner<E>>,
}

impl<E: StorageEngine> Clone for Shelf<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: StorageEngine> Shelf<E> {
    pub fn new(engine: E, config: ShelfConfig) -> Self {
        Self {
            inner: Arc::new(ShelfInner {
                config,
                engine,
                registry: RwLock::new(SchemaRegistry::new()),
                handle: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ShelfConfig {
        &self.inner.config
    }

    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    /// Compile and register a record type, returning its store.
    pub fn register(&self, decl: RecordTypeDecl) -> ShelfResult<RecordStore<E>> {
        let schema = self.inner.registry.write().register(decl)?;
        Ok(RecordStore::new(self.clone(), schema))
    }

    /// Storage version implied by the registered record types.
    pub fn storage_version(&self) -> u32 {
        self.inner.registry.read().storage_version()
    }

    /// Registered schemas, in registration order.
    pub fn schemas(&self) -> Vec<Arc<RecordTypeSchema>> {
        self.inner.registry.read().iter().cloned().collect()
    }

    /// Drop the cached handle. The next operation reopens the database.
    pub async fn close(&self) {
        if self.inner.handle.lock().await.take().is_some() {
            debug!(database = %self.inner.config.database_name, "closed database handle");
        }
    }

    /// The shared handle, opened (and migrated) on demand.
    pub(crate) async fn database(&self) -> ShelfResult<Arc<E::Database>> {
        let config = &self.inner.config;
        if config.validate_schema_only {
            return Err(ShelfError::ValidationOnly);
        }

        let mut handle = self.inner.handle.lock().await;
        let (version, schemas) = {
            let registry = self.inner.registry.read();
            (
                registry.storage_version(),
                registry.iter().cloned().collect::<Vec<_>>(),
            )
        };

        if let Some(db) = handle.as_ref() {
            if db.version() == version {
                return Ok(Arc::clone(db));
            }
            debug!(
                database = %config.database_name,
                open_version = db.version(),
                version,
                "registry changed, reopening"
            );
        }
        // Never hand out a stale handle, even if the reopen below fails.
        *handle = None;

        let database = config.database_name.as_str();
        if config.debug_reset {
            warn!(database, "debug_reset set, destroying database");
            self.inner
                .engine
                .destroy(database)
                .await
                .map_err(|source| ShelfError::StorageOpen {
                    database: database.to_string(),
                    source,
                })?;
        }

        let db = self
            .inner
            .engine
            .open(database, version, build_migration(schemas))
            .await
            .map_err(|source| ShelfError::StorageOpen {
                database: database.to_string(),
                source,
            })?;
        info!(
            database,
            version,
            engine = self.inner.engine.name(),
            "opened database"
        );

        let db = Arc::new(db);
        *handle = Some(Arc::clone(&db));
        Ok(db)
    }
}

impl<E: StorageEngine> std::fmt::Debug for Shelf<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shelf")
            .field("config", &self.inner.config)
            .field("engine", &self.inner.engine.name())
            .field("storage_version", &self.storage_version())
            .finish()
    }
}
