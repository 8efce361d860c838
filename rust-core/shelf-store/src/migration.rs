// SPDX-License-Identifier: PMPL-1.0-or-later
//! Structural migration for a set of registered record types.
//!
//! Migration is destructive: every registered table is dropped and recreated
//! with its compiled key and indexes, discarding the rows it held. Tables of
//! types no longer registered are left as they are.

use std::sync::Arc;

use shelf_engine::{Migration, SchemaEditor, StorageError, VersionChange};
use shelf_schema::RecordTypeSchema;
use tracing::{info, warn};

/// Build the migration callback for `schemas`.
pub fn build_migration(schemas: Vec<Arc<RecordTypeSchema>>) -> Migration {
    Arc::new(
        move |editor: &mut dyn SchemaEditor, change: VersionChange| -> Result<(), StorageError> {
            info!(
                old_version = change.old_version,
                new_version = change.new_version,
                tables = schemas.len(),
                "rebuilding tables"
            );
            for schema in &schemas {
                apply_schema(editor, schema)?;
            }
            Ok(())
        },
    )
}

fn apply_schema(editor: &mut dyn SchemaEditor, schema: &RecordTypeSchema) -> Result<(), StorageError> {
    let table = schema.table_definition();
    if editor.has_table(&table.name) {
        warn!(table = %table.name, "dropping table and its rows");
        editor.drop_table(&table.name)?;
    }
    editor.create_table(&table.name, table.key_path)?;
    for index in table.indexes {
        editor.create_index(&table.name, index)?;
    }
    Ok(())
}
