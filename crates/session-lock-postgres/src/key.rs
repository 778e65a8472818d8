//! Deriving advisory lock keys from names.
//!
//! Advisory locks are keyed by `bigint`. Sessions take the integer directly;
//! callers that think in names can derive one here. Every process that
//! contends for the same resource must derive its key the same way.

use sha2::{Digest, Sha256};

/// Maps `name` onto the advisory lock key space.
///
/// Uses the first eight bytes of the SHA-256 digest of `name`, so the result
/// is stable across processes, platforms and releases.
pub fn advisory_key(name: &str) -> i64 {
    let digest = Sha256::digest(name.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}
