// SPDX-License-Identifier: PMPL-1.0-or-later
//! ShelfDB Schema
//!
//! Derives storage layout from declarative record types and converts records
//! between their application and storage forms.
//!
//! - [`RecordTypeDecl`] / [`FieldSpec`] declare a record type;
//!   [`RecordTypeDecl::compile`] yields an immutable [`RecordTypeSchema`].
//! - [`ValueCodec`] applies per-field [`FieldTransformer`]s on every read and
//!   write.
//! - [`SchemaRegistry`] collects compiled types and folds their version
//!   increments into one storage version.

pub mod codec;
pub mod compiler;
pub mod error;
pub mod field;
pub mod registry;
pub mod transform;
pub mod value;

pub use codec::ValueCodec;
pub use compiler::{PrimaryKey, RecordTypeDecl, RecordTypeSchema};
pub use error::{CodecError, SchemaError, TransformError};
pub use field::FieldSpec;
pub use registry::SchemaRegistry;
pub use transform::{DateTransformer, FieldTransformer};
pub use value::{Record, RecordKey, RecordQuery, Value};
