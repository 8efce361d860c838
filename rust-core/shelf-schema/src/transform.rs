// SPDX-License-Identifier: PMPL-1.0-or-later
//! Field transformers: bidirectional codecs attached to one field.

use std::fmt::Debug;

use chrono::{DateTime, Datelike, SecondsFormat, TimeZone, Utc};
use shelf_engine::Scalar;

use crate::error::TransformError;
use crate::value::Value;

/// Converts one field between its application and storage forms.
///
/// Implementations must round-trip: `decode(encode(v))` equals `v` for every
/// value `encode` accepts, up to the transformer's documented precision.
pub trait FieldTransformer: Debug + Send + Sync {
    /// Short name used in error messages.
    fn name(&self) -> &'static str;

    fn encode(&self, value: Value) -> Result<Scalar, TransformError>;

    fn decode(&self, scalar: Scalar) -> Result<Value, TransformError>;
}

/// Stores dates as canonical UTC text, `YYYY-MM-DDTHH:MM:SS.mmmZ`.
///
/// The text form sorts chronologically, so date fields can be indexed and
/// range-queried. Precision is milliseconds.
///
/// Accepted on encode: [`Value::Date`], RFC 3339 [`Value::Text`], and
/// [`Value::Int`] as Unix epoch milliseconds. [`Value::Null`] passes through.
/// Dates outside years 0000-9999 are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTransformer;

impl DateTransformer {
    /// Years with a four-digit canonical form. Outside this span chrono
    /// writes a signed year, which neither parses back nor sorts.
    const YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

    fn canonical(date: &DateTime<Utc>) -> Result<String, TransformError> {
        if !Self::YEARS.contains(&date.year()) {
            return Err(TransformError::OutOfRange(format!(
                "year {} outside 0000-9999",
                date.year()
            )));
        }
        Ok(date.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    fn parse(text: &str) -> Result<DateTime<Utc>, TransformError> {
        DateTime::parse_from_rfc3339(text)
            .map(|date| date.with_timezone(&Utc))
            .map_err(|e| TransformError::Parse {
                input: text.to_string(),
                reason: e.to_string(),
            })
    }
}

impl FieldTransformer for DateTransformer {
    fn name(&self) -> &'static str {
        "date"
    }

    fn encode(&self, value: Value) -> Result<Scalar, TransformError> {
        let date = match value {
            Value::Null => return Ok(Scalar::Null),
            Value::Date(date) => date,
            Value::Text(text) => Self::parse(&text)?,
            Value::Int(millis) => Utc
                .timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| TransformError::OutOfRange(format!("{millis} ms since epoch")))?,
            other => {
                return Err(TransformError::Unsupported {
                    kind: other.kind(),
                    expected: "date, RFC 3339 text or epoch milliseconds",
                })
            }
        };
        Self::canonical(&date).map(Scalar::Text)
    }

    fn decode(&self, scalar: Scalar) -> Result<Value, TransformError> {
        match scalar {
            Scalar::Null => Ok(Value::Null),
            Scalar::Text(text) => Self::parse(&text).map(Value::Date),
            other => Err(TransformError::Unsupported {
                kind: other.type_name(),
                expected: "date text",
            }),
        }
    }
}
