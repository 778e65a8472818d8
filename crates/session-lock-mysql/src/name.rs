//! MySQL lock name length handling.
//!
//! MySQL rejects user-level lock names longer than 64 characters. Longer
//! names are shortened to a readable prefix followed by a digest of the whole
//! name, so two long names sharing a prefix still map to different locks.

use std::borrow::Cow;
use std::fmt::Write;

use sha2::{Digest, Sha512};

/// Maximum length, in characters, of a MySQL lock name.
pub const MAX_NAME_LENGTH: usize = 64;

/// Bytes of the SHA-512 digest kept (hex encoded: 40 characters).
const DIGEST_BYTES: usize = 20;
const SEPARATOR: char = '#';

/// Returns a name MySQL will accept for `GET_LOCK` and friends.
///
/// Names within the limit are returned unchanged.
pub fn fit_lock_name(name: &str) -> Cow<'_, str> {
    if name.chars().count() <= MAX_NAME_LENGTH {
        return Cow::Borrowed(name);
    }

    let digest = Sha512::digest(name.as_bytes());
    let mut hex = String::with_capacity(DIGEST_BYTES * 2);
    for byte in &digest[..DIGEST_BYTES] {
        let _ = write!(hex, "{:02x}", byte);
    }

    let prefix_len = MAX_NAME_LENGTH - hex.len() - SEPARATOR.len_utf8();
    let prefix: String = name.chars().take(prefix_len).collect();
    Cow::Owned(format!("{}{}{}", prefix, SEPARATOR, hex))
}
