//! Content-addressed hashing for declarations and generated artifacts.
//!
//! The hash covers the serialized semantic content only, so two models
//! loaded from byte-different but equivalent files hash the same.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// A 32-byte SHA-256 content hash.
pub type ContentHash = [u8; 32];

/// Compute the SHA-256 content hash of any serializable value.
pub fn content_hash<T: Serialize>(value: &T) -> ContentHash {
    // Derived `Serialize` impls over owned data never fail.
    let json = serde_json::to_vec(value).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&json);
    hasher.finalize().into()
}

/// Compute the SHA-256 hash of raw text (generated source files).
pub fn text_hash(text: &str) -> ContentHash {
    Sha256::digest(text.as_bytes()).into()
}

/// Format a content hash as a hex string.
pub fn hash_hex(hash: &ContentHash) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_hash() {
        let h1 = content_hash(&"OnRspUserLogin");
        let h2 = content_hash(&"OnRspUserLogin");
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_inputs_different_hash() {
        let h1 = content_hash(&"ReqUserLogin");
        let h2 = content_hash(&"ReqUserLogout");
        assert_ne!(h1, h2);
    }

    #[test]
    fn text_hash_matches_for_equal_text() {
        assert_eq!(text_hash("pub fn a() {}"), text_hash("pub fn a() {}"));
        assert_ne!(text_hash("pub fn a() {}"), text_hash("pub fn b() {}"));
    }

    #[test]
    fn hash_hex_format() {
        let hex = hash_hex(&content_hash(&42u32));
        assert_eq!(hex.len(), 64);
    }
}
