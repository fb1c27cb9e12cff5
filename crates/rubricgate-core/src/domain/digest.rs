//! Canonical JSON and SHA-256 digests.
//!
//! Object keys come out in byte order (`serde_json::Map` is BTreeMap-backed)
//! and integer-valued floats are collapsed to integers, so two structurally
//! equal values always produce the same bytes and therefore the same digest.

use serde::Serialize;
use sha2::{Digest, Sha256};

fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(key, v)| (key.clone(), canonicalize(v)))
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        serde_json::Value::Number(n) if !(n.is_i64() || n.is_u64()) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                serde_json::Value::Number(serde_json::Number::from(f as i64))
            }
            _ => serde_json::Value::Number(n.clone()),
        },
        other => other.clone(),
    }
}

/// Compact canonical JSON for a value.
pub fn canonical_json(value: &serde_json::Value) -> serde_json::Result<String> {
    serde_json::to_string(&canonicalize(value))
}

/// SHA-256 hex digest of raw bytes.
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 hex digest of the canonical JSON form of any serializable value.
pub fn digest_of<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let json = serde_json::to_value(value)?;
    Ok(digest_bytes(canonical_json(&json)?.as_bytes()))
}
