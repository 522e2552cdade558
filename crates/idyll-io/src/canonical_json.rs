//! Deterministic JSON export of AST values.
//!
//! The goal is stable bytes for fingerprints and golden files:
//! - object keys are sorted lexicographically, at every depth
//! - arrays preserve order (block order is meaningful)
//! - output is minified JSON with no extra whitespace
//!
//! Tool parameters and results are arbitrary JSON and get the same treatment,
//! so two documents that differ only in parameter key order canonicalize to
//! the same bytes.

use serde::Serialize;
use serde_json::{Map, Value};

/// Convert a serializable value to canonical JSON bytes.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let canon = to_canonical_value(value)?;
    let mut out = Vec::new();
    serde_json::to_writer(&mut out, &canon)?;
    Ok(out)
}

/// Convert a serializable value to a canonical JSON string.
pub fn to_canonical_json_string<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canon = to_canonical_value(value)?;
    serde_json::to_string(&canon)
}

/// Canonical JSON, indented for humans. Same key order as the minified form.
pub fn to_canonical_json_pretty<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canon = to_canonical_value(value)?;
    serde_json::to_string_pretty(&canon)
}

fn to_canonical_value<T: Serialize>(value: &T) -> Result<Value, serde_json::Error> {
    Ok(canonicalize_value(serde_json::to_value(value)?))
}

fn canonicalize_value(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut new_map = Map::with_capacity(entries.len());
            for (k, v) in entries {
                new_map.insert(k, canonicalize_value(v));
            }
            Value::Object(new_map)
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize_value).collect()),
        other => other,
    }
}
