//! Canonical serialization and content addressing.
//!
//! All digests in the pipeline are SHA-256 over compact canonical JSON.
//! Canonical means: typed structs (fixed field order), `BTreeMap` for keyed
//! collections, and normalized unordered sets. No pretty printing.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A lowercase-hex SHA-256 digest (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines and filenames.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute SHA-256 of bytes, returning lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ContentHash(hex::encode(hasher.finalize()))
}

/// Serialize a value to compact canonical JSON bytes.
///
/// Serialization failures here indicate a non-serializable model type, which
/// is a programming error surfaced to the caller.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

/// Hash a serializable value via canonical JSON.
pub fn hash_canonical<T: Serialize>(value: &T) -> Result<ContentHash, serde_json::Error> {
    Ok(sha256_hex(&canonical_json(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_sha256_hex_known_vector() {
        let hash = sha256_hex(b"hello world");
        assert_eq!(
            hash.as_str(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_btreemap_ordering_is_stable() {
        let mut a = BTreeMap::new();
        a.insert("z".to_string(), 1);
        a.insert("a".to_string(), 2);

        let mut b = BTreeMap::new();
        b.insert("a".to_string(), 2);
        b.insert("z".to_string(), 1);

        assert_eq!(
            hash_canonical(&a).unwrap(),
            hash_canonical(&b).unwrap()
        );
    }

    #[test]
    fn test_short_prefix() {
        let hash = sha256_hex(b"x");
        assert_eq!(hash.short().len(), 12);
    }
}
