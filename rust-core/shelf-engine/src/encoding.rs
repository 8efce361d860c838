// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Order-preserving binary encoding for keys.
//
// Byte-ordered engines (redb) compare keys with `memcmp`, so every key is
// encoded such that byte order equals `Key` order:
//
// ```text
// Null   0x00
// Bool   0x01 [0|1]
// Int    0x02 [8 bytes BE, sign bit flipped]
// Float  0x03 [8 bytes BE, total-order transform]
// Text   0x04 [escaped bytes] 0x00 0x00
// Bytes  0x05 [escaped bytes] 0x00 0x00
// ```
//
// Escaping replaces every 0x00 with 0x00 0xFF, which keeps variable-length
// values self-delimiting: a composite key is the plain concatenation of its
// components, and no encoded scalar is a proper prefix of another.

use std::ops::Bound;

use crate::key::{canonical_float, Key, KeyQuery, Scalar};

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_TEXT: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;

/// Append the encoding of one scalar to `out`.
pub fn encode_scalar(out: &mut Vec<u8>, scalar: &Scalar) {
    match scalar {
        Scalar::Null => out.push(TAG_NULL),
        Scalar::Bool(value) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*value));
        }
        Scalar::Int(value) => {
            out.push(TAG_INT);
            out.extend_from_slice(&((*value as u64) ^ (1u64 << 63)).to_be_bytes());
        }
        Scalar::Float(value) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&encode_float(*value));
        }
        Scalar::Text(value) => {
            out.push(TAG_TEXT);
            encode_escaped(out, value.as_bytes());
        }
        Scalar::Bytes(value) => {
            out.push(TAG_BYTES);
            encode_escaped(out, value);
        }
    }
}

/// Encode a key. Composite keys are the concatenation of their components.
pub fn encode_key(key: &Key) -> Vec<u8> {
    let mut out = Vec::new();
    match key {
        Key::Single(scalar) => encode_scalar(&mut out, scalar),
        Key::Composite(parts) => {
            for part in parts {
                encode_scalar(&mut out, part);
            }
        }
    }
    out
}

/// Key of an index entry: the encoded index value followed by the encoded
/// primary key, so entries sort by value and then by primary key.
pub fn index_entry_key(index_key: &Key, primary_key: &[u8]) -> Vec<u8> {
    let mut out = encode_key(index_key);
    out.extend_from_slice(primary_key);
    out
}

fn encode_float(value: f64) -> [u8; 8] {
    let mut bits = canonical_float(value).to_bits();
    if bits & (1u64 << 63) != 0 {
        // Negative: flip all bits.
        bits = !bits;
    } else {
        // Positive or zero: flip the sign bit.
        bits ^= 1u64 << 63;
    }
    bits.to_be_bytes()
}

fn encode_escaped(out: &mut Vec<u8>, bytes: &[u8]) {
    for &byte in bytes {
        out.push(byte);
        if byte == 0x00 {
            out.push(0xFF);
        }
    }
    out.extend_from_slice(&[0x00, 0x00]);
}

/// Compute the upper bound for a prefix scan.
///
/// Given a prefix like `[0x61, 0x62]` ("ab"), returns the next key
/// after all keys starting with that prefix: `[0x61, 0x63]` ("ac").
/// Returns `None` if the prefix is all 0xFF bytes (no upper bound).
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    // Increment the last non-0xFF byte
    while let Some(last) = upper.last_mut() {
        if *last < 0xFF {
            *last += 1;
            return Some(upper);
        }
        upper.pop();
    }
    None // All bytes were 0xFF: no upper bound
}

/// Smallest byte string strictly greater than `key`.
fn successor(key: &[u8]) -> Vec<u8> {
    let mut next = key.to_vec();
    next.push(0x00);
    next
}

/// A half-open byte range `[start, end)` over encoded keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRange {
    pub start: Vec<u8>,
    /// Exclusive end; `None` means unbounded.
    pub end: Option<Vec<u8>>,
}

impl ByteRange {
    /// Every key.
    pub fn full() -> Self {
        Self {
            start: Vec::new(),
            end: None,
        }
    }

    /// Byte range over primary-table keys (each stored key is exactly
    /// `encode_key(pk)`). Returns `None` when nothing can match.
    pub fn primary(query: Option<&KeyQuery>) -> Option<Self> {
        Self::build(query, false)
    }

    /// Byte range over index-table keys (`index_entry_key`), where a query
    /// value matches every entry whose key starts with its encoding.
    pub fn index(query: Option<&KeyQuery>) -> Option<Self> {
        Self::build(query, true)
    }

    fn build(query: Option<&KeyQuery>, prefixed: bool) -> Option<Self> {
        let query = match query {
            Some(query) => query,
            None => return Some(Self::full()),
        };
        if !query.is_satisfiable() {
            return None;
        }
        let (lower, upper) = query.bounds();

        // Everything sharing `encoded` as a prefix sorts before this.
        let past = |encoded: Vec<u8>| -> Option<Vec<u8>> {
            if prefixed {
                prefix_upper_bound(&encoded)
            } else {
                Some(successor(&encoded))
            }
        };

        let start = match lower {
            Bound::Unbounded => Vec::new(),
            Bound::Included(key) => encode_key(key),
            Bound::Excluded(key) => past(encode_key(key))?,
        };
        let end = match upper {
            Bound::Unbounded => None,
            Bound::Included(key) => past(encode_key(key)),
            Bound::Excluded(key) => Some(encode_key(key)),
        };
        Some(Self { start, end })
    }

    /// True when `key` is below the exclusive end.
    pub fn before_end(&self, key: &[u8]) -> bool {
        self.end.as_deref().map_or(true, |end| key < end)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && self.before_end(key)
    }
}
