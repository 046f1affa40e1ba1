//! Content hashing for deterministic identifiers.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute SHA256 hash of a serializable value.
///
/// The value is serialized to JSON before hashing, so identical inputs
/// always produce the same 64-character lowercase hexadecimal string.
pub fn compute_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&json);
    Ok(format!("{:x}", hasher.finalize()))
}

/// `prefix` followed by the first 16 hex characters of the value's hash.
pub fn short_id<T: Serialize>(prefix: &str, value: &T) -> Result<String, serde_json::Error> {
    let hash = compute_hash(value)?;
    Ok(format!("{}_{}", prefix, &hash[..16]))
}
