//! Hashing, message authentication and key derivation.
//!
//! Provides:
//! - Keccak-256 (the pre-standard SHA-3 variant used throughout devp2p)
//! - A running Keccak-256 accumulator for frame MACs
//! - SHA-256 and HMAC-SHA256 (ECIES)
//! - The NIST SP 800-56 concatenation KDF

use crate::CryptoError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use sha3::{Digest, Keccak256};

/// 32-byte hash output.
pub type HashOutput = [u8; 32];

type HmacSha256 = Hmac<Sha256>;

/// Compute Keccak-256 of input data.
#[must_use]
pub fn keccak256(data: &[u8]) -> HashOutput {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// Compute Keccak-256 over the concatenation of several parts.
#[must_use]
pub fn keccak256_concat(parts: &[&[u8]]) -> HashOutput {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Compute SHA-256 of input data.
#[must_use]
pub fn sha256(data: &[u8]) -> HashOutput {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// HMAC-SHA256 over the concatenation of `parts`.
#[must_use]
pub fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> HashOutput {
    let mut mac = hmac_with_key(key);
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Verify an HMAC-SHA256 tag over the concatenation of `parts` in constant time.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidMac`] if the tag does not match.
pub fn hmac_sha256_verify(key: &[u8], parts: &[&[u8]], tag: &[u8]) -> Result<(), CryptoError> {
    let mut mac = hmac_with_key(key);
    for part in parts {
        mac.update(part);
    }
    mac.verify_slice(tag).map_err(|_| CryptoError::InvalidMac)
}

fn hmac_with_key(key: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length; the error branch is unreachable.
    match <HmacSha256 as Mac>::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts any key length"),
    }
}

/// NIST SP 800-56 concatenation KDF over SHA-256.
///
/// Hashes `counter ‖ key_material ‖ ""` for counter = 1, 2, … (32-bit big
/// endian), concatenates the digests and truncates to `key_len`.
#[must_use]
pub fn concat_kdf(key_material: &[u8], key_len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(key_len.div_ceil(32) * 32);
    let mut counter: u32 = 0;

    while key.len() < key_len {
        counter += 1;
        let mut hasher = Sha256::new();
        hasher.update(counter.to_be_bytes());
        hasher.update(key_material);
        key.extend_from_slice(&hasher.finalize());
    }

    key.truncate(key_len);
    key
}

/// XOR two 32-byte values.
#[must_use]
pub fn xor_32(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b.iter())) {
        *o = x ^ y;
    }
    out
}

/// Running Keccak-256 state used as a frame MAC accumulator.
///
/// Every [`update`](Self::update) absorbs more data; [`digest`](Self::digest)
/// reads the current digest without resetting the state.
#[derive(Clone)]
pub struct KeccakMac {
    state: Keccak256,
}

impl KeccakMac {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Keccak256::new(),
        }
    }

    /// Absorb data.
    pub fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    /// Current digest of everything absorbed so far.
    #[must_use]
    pub fn digest(&self) -> HashOutput {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.state.clone().finalize());
        out
    }

    /// Absorb `data` and return the resulting digest.
    pub fn update_digest(&mut self, data: &[u8]) -> HashOutput {
        self.update(data);
        self.digest()
    }
}

impl Default for KeccakMac {
    fn default() -> Self {
        Self::new()
    }
}
