// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for order-preserving key encoding

#![no_main]

use libfuzzer_sys::fuzz_target;
use shelf_engine::encoding::encode_key;
use shelf_engine::{Key, Scalar};

fn scalar(tag: u8, body: &[u8]) -> Scalar {
    let mut word = [0u8; 8];
    let n = body.len().min(8);
    word[..n].copy_from_slice(&body[..n]);
    match tag % 6 {
        0 => Scalar::Null,
        1 => Scalar::Bool(body.first().is_some_and(|b| b & 1 == 1)),
        2 => Scalar::Int(i64::from_be_bytes(word)),
        3 => Scalar::Float(f64::from_be_bytes(word)),
        4 => Scalar::Text(String::from_utf8_lossy(body).into_owned()),
        _ => Scalar::Bytes(body.to_vec()),
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let split = data.len() / 2;
    let (left, right) = data.split_at(split);
    let a = Key::Single(scalar(left.first().copied().unwrap_or(0), left.get(1..).unwrap_or(&[])));
    let b = Key::Single(scalar(right[0], &right[1..]));

    // NaN has no stable order; everything else must sort the same encoded
    let has_nan = [&a, &b]
        .iter()
        .any(|k| matches!(k, Key::Single(Scalar::Float(f)) if f.is_nan()));
    if !has_nan {
        assert_eq!(a.cmp(&b), encode_key(&a).cmp(&encode_key(&b)));
    }
});
