//! Hash utilities for ticketflow.
//!
//! Content hashes key the duplicate cache, so they must stay stable across
//! process restarts and releases.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Stable content hash of a ticket: trimmed `subject || body`.
///
/// # Example
/// ```
/// use ticketflow::utils::hash::content_hash;
///
/// assert_eq!(content_hash(" VPN down ", "help"), content_hash("VPN down", "help\n"));
/// ```
pub fn content_hash(subject: &str, body: &str) -> String {
    let key = format!("{}||{}", subject.trim(), body.trim());
    sha256_hex(key.as_bytes())
}
