//! Canonical content hashing
//!
//! The digest is SHA-256 over a canonical text encoding of the oid plus all
//! user fields:
//! - map keys are visited in sorted order, so insertion order never matters
//! - every value carries a type tag, so `"1"` and `1` never collide
//! - integral floats encode as integers, `-0.0` encodes as `0`
//! - timestamps encode as UTC epoch microseconds

use std::fmt::Write as _;

use sha2::{Digest, Sha256};

use crate::model::{to_epoch_micros, FieldMap, Oid, Value, OID_FIELD};

/// Computes the content hash of one object state.
///
/// Bookkeeping fields must already have been stripped from `fields`.
pub fn content_hash(oid: &Oid, fields: &FieldMap) -> String {
    let mut canonical = String::with_capacity(64 + fields.len() * 16);
    canonical.push_str("m{");
    write_key(&mut canonical, OID_FIELD);
    encode_value(&mut canonical, &oid.to_value());
    for (key, value) in fields {
        canonical.push(',');
        write_key(&mut canonical, key);
        encode_value(&mut canonical, value);
    }
    canonical.push('}');

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Canonical encoding of a single value (exposed for tests and diagnostics).
pub fn canonical_encoding(value: &Value) -> String {
    let mut out = String::new();
    encode_value(&mut out, value);
    out
}

fn write_key(out: &mut String, key: &str) {
    let _ = write!(out, "{}:{}=", key.len(), key);
}

fn encode_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push('n'),
        Value::Bool(b) => out.push_str(if *b { "b:1" } else { "b:0" }),
        Value::Int(i) => {
            let _ = write!(out, "i:{}", i);
        }
        Value::Float(f) => encode_float(out, *f),
        Value::Text(s) => {
            let _ = write!(out, "s:{}:{}", s.len(), s);
        }
        Value::Timestamp(ts) => {
            let _ = write!(out, "t:{}", to_epoch_micros(ts));
        }
        Value::List(items) => {
            let _ = write!(out, "l{}[", items.len());
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode_value(out, item);
            }
            out.push(']');
        }
        Value::Map(map) => {
            out.push_str("m{");
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_key(out, key);
                encode_value(out, item);
            }
            out.push('}');
        }
    }
}

fn encode_float(out: &mut String, f: f64) {
    if f.is_nan() {
        out.push_str("f:nan");
    } else if f.is_infinite() {
        out.push_str(if f > 0.0 { "f:inf" } else { "f:-inf" });
    } else if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 {
        let _ = write!(out, "i:{}", f as i64);
    } else {
        let _ = write!(out, "f:{:?}", f);
    }
}
