//! Content digests for stored bodies.

use sha2::{Digest, Sha256};

/// Hex SHA-256 of a response body.
pub fn content_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}
