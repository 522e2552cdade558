//! Content fingerprints over canonical JSON.

use serde::Serialize;

use idyll_core::Block;

use crate::canonical_json::to_canonical_json_bytes;

/// Return lowercase hex SHA-256 of bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash canonical JSON bytes using SHA-256 and return lowercase hex.
pub fn sha256_canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = to_canonical_json_bytes(value)?;
    Ok(sha256_hex(&bytes))
}

/// Structural fingerprint of a block tree.
///
/// Equal fingerprints mean equal trees: same ids, kinds, content, attributes
/// and nesting. The document id is not part of it, so a copy of a document
/// under a new id fingerprints the same.
pub fn fingerprint(blocks: &[Block]) -> Result<String, serde_json::Error> {
    sha256_canonical_json(&blocks)
}
