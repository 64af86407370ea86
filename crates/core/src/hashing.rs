//! Stable hashing used for deterministic seed derivation.
//!
//! Seeds must reproduce across processes and machines, so everything here
//! hashes UTF-8 bytes with SHA-256 rather than relying on `std::hash`.

use std::fmt::Display;

use sha2::{Digest, Sha256};

/// Number of leading hex digits of the digest folded into a seed.
const SEED_HEX_DIGITS: usize = 12;

/// Modulus applied to the folded digest (largest signed 32-bit prime).
pub const SEED_MODULUS: u64 = 2_147_483_647;

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Derive a non-negative seed from an ordered list of parts.
///
/// The parts are rendered with `Display`, joined with `|`, hashed, and the
/// first 12 hex digits of the digest are reduced modulo [`SEED_MODULUS`].
pub fn stable_seed(parts: &[&dyn Display]) -> i64 {
    let raw = parts
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("|");
    let digest = sha256_hex(raw.as_bytes());
    // 12 hex digits always fit in a u64.
    let folded = u64::from_str_radix(&digest[..SEED_HEX_DIGITS], 16).unwrap_or_default();
    (folded % SEED_MODULUS) as i64
}
