// SPDX-License-Identifier: PMPL-1.0-or-later
//! Errors surfaced by shelves and record stores.

use shelf_engine::StorageError;
use shelf_schema::{CodecError, SchemaError};
use thiserror::Error;

/// Record store operation, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Select,
    SelectMany,
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OperationKind::Select => "select",
            OperationKind::SelectMany => "select_many",
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        })
    }
}

#[derive(Error, Debug)]
pub enum ShelfError {
    /// The record type was not registered.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The engine refused to open or migrate the database. Nothing was cached;
    /// the next operation retries the open.
    #[error("failed to open database `{database}`")]
    StorageOpen {
        database: String,
        #[source]
        source: StorageError,
    },

    /// The engine failed a read or write. The transaction was aborted.
    #[error("{operation} on `{store}` failed")]
    Operation {
        store: String,
        operation: OperationKind,
        #[source]
        source: StorageError,
    },

    #[error("storage is disabled: shelf is in validate-schema-only mode")]
    ValidationOnly,
}

impl ShelfError {
    /// The underlying engine error, if any.
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            ShelfError::StorageOpen { source, .. } | ShelfError::Operation { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

pub type ShelfResult<T> = Result<T, ShelfError>;
