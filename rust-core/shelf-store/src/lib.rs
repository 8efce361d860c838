// SPDX-License-Identifier: PMPL-1.0-or-later
//! ShelfDB Store
//!
//! Schema-driven record stores over a versioned, transactional key/value
//! engine. A [`Shelf`] owns the schema registry and one lazily opened
//! database handle; [`Shelf::register`] compiles a record type and returns
//! its [`RecordStore`], which mediates every read and write through the
//! type's schema and codec.
//!
//! The shelf never installs a tracing subscriber. Operations log their
//! lifecycle at `debug` and database opens, migrations and resets at
//! `info`/`warn`.

pub mod config;
pub mod error;
pub mod migration;
pub mod shelf;
pub mod store;

pub use config::ShelfConfig;
pub use error::{OperationKind, ShelfError, ShelfResult};
pub use shelf::Shelf;
pub use store::{RecordStore, Selection};

pub use shelf_engine::InMemoryEngine;
#[cfg(feature = "redb-backend")]
pub use shelf_engine::RedbEngine;
