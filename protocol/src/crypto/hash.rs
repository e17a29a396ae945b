//! # Hashing Utilities
//!
//! Two hash functions, two jobs:
//!
//! - **SHA-256** derives transaction identifiers. The consensus engine's
//!   indexer and the external query tooling both speak hex SHA-256, so the
//!   identifier format stays in that family.
//! - **BLAKE3** derives symmetric keys (`derive_key` mode) and chains the
//!   in-process engine's anchor. Nothing outside the node ever sees these.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of `data` as a fixed-size array.
///
/// # Example
///
/// ```
/// use bftx_protocol::crypto::sha256;
///
/// let hash = sha256(b"steel coils, 40ft container");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 over the concatenation of several byte strings, without building
/// the concatenation in memory first.
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Compute the BLAKE3 digest of `data`.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// BLAKE3 in key-derivation mode.
///
/// `context` must be a hardcoded, globally unique string: it is what keeps a
/// key derived for sealing payloads from ever colliding with a key derived
/// for anything else out of the same secret.
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    blake3::derive_key(context, key_material)
}
