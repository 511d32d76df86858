//! Key digests

use sha2::{Digest, Sha256};

/// Hex length of a digest produced by [`digest`]
pub const DIGEST_LEN: usize = 64;

/// Hash a cache key (a request or source URL) to a lowercase hex SHA-256 digest
pub fn digest(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
