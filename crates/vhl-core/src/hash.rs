use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::LabError;
use crate::serde::to_canonical_json_bytes;

/// Number of hex characters kept from a digest when fingerprinting.
pub const FINGERPRINT_LEN: usize = 8;

/// SHA-256 hex digest of the UTF-8 bytes of `content`.
pub fn compute_sha256(content: &str) -> String {
    compute_sha256_bytes(content.as_bytes())
}

pub fn compute_sha256_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Short fingerprint of a pair of parameter sets.
///
/// Both sets are encoded as canonical JSON and concatenated before hashing,
/// so insertion order of the caller's maps never changes the result.
pub fn params_fingerprint<A: Serialize, B: Serialize>(
    first: &A,
    second: &B,
) -> Result<String, LabError> {
    let mut bytes = to_canonical_json_bytes(first)?;
    bytes.extend(to_canonical_json_bytes(second)?);
    let digest = compute_sha256_bytes(&bytes);
    Ok(digest[..FINGERPRINT_LEN].to_string())
}
