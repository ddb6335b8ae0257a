//! Password digest helper.
//!
//! Passwords are hashed client-side with SHA-256 and only the hex digest ever
//! crosses the wire or reaches the store. The server compares digests; it never
//! sees a plaintext password.

use sha2::{Digest, Sha256};

/// Hex SHA-256 digest length in characters.
pub const DIGEST_LEN: usize = 64;

/// Returns the lowercase hex SHA-256 digest of `password`.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    let mut out = String::with_capacity(DIGEST_LEN);
    for byte in digest {
        use std::fmt::Write;
        // Writing to a String cannot fail.
        let _ = write!(out, "{byte:02x}");
    }
    out
}
