// SPDX-License-Identifier: PMPL-1.0-or-later
//! Schema and codec error types.

use thiserror::Error;

/// Errors raised while compiling or registering a record type.
///
/// All of these are hard failures: the record type is not registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("invalid field name `{field}` in store `{store}`: only [A-Za-z0-9_] may be indexed")]
    InvalidFieldName { store: String, field: String },

    #[error("store `{0}` declares no primary key field")]
    MissingPrimaryKey(String),

    #[error("store `{0}` is already registered")]
    DuplicateStoreName(String),

    #[error("store name must not be empty")]
    EmptyStoreName,

    #[error("field `{field}` declared twice in store `{store}`")]
    DuplicateField { store: String, field: String },
}

/// Errors raised by a [`FieldTransformer`](crate::FieldTransformer).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("unsupported {kind} value: expected {expected}")]
    Unsupported {
        kind: &'static str,
        expected: &'static str,
    },

    #[error("cannot parse `{input}`: {reason}")]
    Parse { input: String, reason: String },

    #[error("value out of range: {0}")]
    OutOfRange(String),
}

/// Errors converting between application and storage representations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("field `{field}` ({transformer}): {source}")]
    Transform {
        field: String,
        transformer: &'static str,
        #[source]
        source: TransformError,
    },

    #[error("field `{field}` holds a date but has no transformer")]
    UntransformedDate { field: String },

    #[error("key has {found} component(s), primary key has {expected}")]
    KeyArity { expected: usize, found: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_culprit() {
        let err = SchemaError::InvalidFieldName {
            store: "users".into(),
            field: "e-mail".into(),
        };
        assert!(err.to_string().contains("e-mail"));
        assert!(SchemaError::MissingPrimaryKey("users".into())
            .to_string()
            .contains("users"));

        let err = CodecError::Transform {
            field: "createdAt".into(),
            transformer: "date",
            source: TransformError::Unsupported {
                kind: "bool",
                expected: "date, text or integer",
            },
        };
        assert!(err.to_string().starts_with("field `createdAt` (date)"));
    }
}
