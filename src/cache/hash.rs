//! Plan fingerprints for cache keys.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 of the JSON serialization of `value`, as 64 lowercase hex chars.
///
/// Plans serialize deterministically: relation strategies are kept in a
/// sorted map and every other collection preserves insertion order.
pub fn compute_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
