// SPDX-License-Identifier: PMPL-1.0-or-later
//! Value codec: the single conversion point between [`Record`] and
//! [`StoredRecord`].
//!
//! Writes encode every transformed field before they reach the engine; reads
//! decode every transformed field before they reach the caller. Keys and
//! query bounds go through the transformer of the field they address.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use shelf_engine::{Key, KeyQuery, KeyRange, Scalar, StoredRecord};

use crate::compiler::RecordTypeSchema;
use crate::error::CodecError;
use crate::transform::FieldTransformer;
use crate::value::{Record, RecordKey, RecordQuery, Value};

/// Per-field encoders and decoders of one record type.
#[derive(Debug, Clone)]
pub struct ValueCodec {
    transformers: BTreeMap<String, Arc<dyn FieldTransformer>>,
}

impl ValueCodec {
    pub fn for_schema(schema: &RecordTypeSchema) -> Self {
        let transformers = schema
            .transformed_fields()
            .filter_map(|field| {
                schema
                    .transformer(field)
                    .map(|t| (field.to_string(), Arc::clone(t)))
            })
            .collect();
        Self { transformers }
    }

    /// Encode one field value.
    pub fn encode_field(&self, field: &str, value: Value) -> Result<Scalar, CodecError> {
        match self.transformers.get(field) {
            Some(transformer) => {
                transformer
                    .encode(value)
                    .map_err(|source| CodecError::Transform {
                        field: field.to_string(),
                        transformer: transformer.name(),
                        source,
                    })
            }
            None => value
                .into_scalar()
                .map_err(|_| CodecError::UntransformedDate {
                    field: field.to_string(),
                }),
        }
    }

    /// Decode one field value.
    pub fn decode_field(&self, field: &str, scalar: Scalar) -> Result<Value, CodecError> {
        match self.transformers.get(field) {
            Some(transformer) => {
                transformer
                    .decode(scalar)
                    .map_err(|source| CodecError::Transform {
                        field: field.to_string(),
                        transformer: transformer.name(),
                        source,
                    })
            }
            None => Ok(Value::from(scalar)),
        }
    }

    pub fn to_storage(&self, record: Record) -> Result<StoredRecord, CodecError> {
        record
            .into_iter()
            .map(|(field, value)| {
                let scalar = self.encode_field(&field, value)?;
                Ok((field, scalar))
            })
            .collect()
    }

    pub fn from_storage(&self, stored: StoredRecord) -> Result<Record, CodecError> {
        let mut record = Record::new();
        for (field, scalar) in stored {
            let value = self.decode_field(&field, scalar)?;
            record.set(field, value);
        }
        Ok(record)
    }

    /// Encode a key addressing `fields` (the primary key fields, or the single
    /// field of an index).
    pub fn encode_key(&self, fields: &[String], key: RecordKey) -> Result<Key, CodecError> {
        match key {
            RecordKey::Single(value) if fields.len() == 1 => {
                Ok(Key::Single(self.encode_field(&fields[0], value)?))
            }
            RecordKey::Composite(parts) if parts.len() == fields.len() && !parts.is_empty() => {
                let mut parts = fields
                    .iter()
                    .zip(parts)
                    .map(|(field, value)| self.encode_field(field, value))
                    .collect::<Result<Vec<_>, _>>()?;
                if parts.len() == 1 {
                    return Ok(Key::Single(parts.remove(0)));
                }
                Ok(Key::Composite(parts))
            }
            other => Err(CodecError::KeyArity {
                expected: fields.len(),
                found: other.len(),
            }),
        }
    }

    /// Encode a query addressing `fields`.
    pub fn encode_query(&self, fields: &[String], query: RecordQuery) -> Result<KeyQuery, CodecError> {
        let bound = |bound: Bound<RecordKey>| -> Result<Bound<Key>, CodecError> {
            Ok(match bound {
                Bound::Included(key) => Bound::Included(self.encode_key(fields, key)?),
                Bound::Excluded(key) => Bound::Excluded(self.encode_key(fields, key)?),
                Bound::Unbounded => Bound::Unbounded,
            })
        };

        match query {
            RecordQuery::Exact(key) => Ok(KeyQuery::Exact(self.encode_key(fields, key)?)),
            RecordQuery::Range { lower, upper } => {
                Ok(KeyQuery::Range(KeyRange::new(bound(lower)?, bound(upper)?)))
            }
        }
    }
}
