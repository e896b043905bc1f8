//! Hashing System - SHA-256 content addresses
//!
//! Every checksum the compiler compares across runs is built here, so the
//! encoding must stay stable: lowercase hex digests over canonical JSON.

use sha2::{Sha256, Digest};
use serde::Serialize;
use serde_json::{Map, Value, to_string};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    let sorted = sort_value(&v);
    to_string(&sorted)
}

/// Recursively order object keys.
pub(crate) fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let sorted_map: serde_json::Map<String, Value> = sorted
                .into_iter()
                .map(|(k, v)| (k.clone(), sort_value(v)))
                .collect();
            Value::Object(sorted_map)
        }
        Value::Array(arr) => {
            Value::Array(arr.iter().map(sort_value).collect())
        }
        _ => v.clone()
    }
}

/// Content checksum of an entity: `hash(raw_content) + "," + hash(attributes)`.
///
/// Callers strip attributes that must not participate before calling. A JSON
/// object always renders, so this cannot fail.
pub fn compute_content_checksum(raw_content: &str, attributes: &Map<String, Value>) -> String {
    let content_hash = sha256_hex(raw_content.as_bytes());
    let canonical = sort_value(&Value::Object(attributes.clone())).to_string();
    let attributes_hash = sha256_hex(canonical.as_bytes());
    format!("{},{}", content_hash, attributes_hash)
}

/// Compute the job checksum of one compiled representation
/// job_checksum = sha256(item_checksum + canonical_rule + engine_version)
pub fn compute_job_checksum(
    item_checksum: &str,
    rule: &impl Serialize,
    engine_version: &str,
) -> Result<String, serde_json::Error> {
    let canonical_rule = canonical_json(rule)?;
    let combined = format!("{}:{}:{}", item_checksum, canonical_rule, engine_version);
    Ok(sha256_hex(combined.as_bytes()))
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}
