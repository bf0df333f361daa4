//! # RLPx Crypto
//!
//! Cryptographic primitives for the RLPx transport.
//!
//! This crate provides:
//! - secp256k1 keypairs with raw 64-byte public keys
//! - ECDH shared-secret derivation
//! - Recoverable ECDSA signatures (sign / recover)
//! - ECIES encryption for handshake messages
//! - Keccak-256, SHA-256, HMAC-SHA256 and the NIST concatenation KDF
//! - Secure random number generation
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Notes |
//! |----------|-----------|-------|
//! | Key Exchange | ECDH secp256k1 | x-coordinate of the shared point |
//! | Signatures | ECDSA secp256k1 | 65 bytes, `r ‖ s ‖ v` |
//! | Handshake Encryption | ECIES (AES-128-CTR + HMAC-SHA256) | 113 bytes overhead |
//! | Hash | Keccak-256 | pre-standard SHA-3 padding |
//! | KDF | NIST SP 800-56 concatenation KDF over SHA-256 | |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod constant_time;
pub mod ecies;
pub mod error;
pub mod hash;
pub mod keys;
pub mod random;
pub mod signatures;

pub use error::CryptoError;
pub use keys::{KeyPair, PublicKey, SecretKey, SharedSecret};
pub use signatures::RecoverableSignature;

/// Raw public key size (uncompressed point without the `0x04` prefix)
pub const PUBLIC_KEY_SIZE: usize = 64;

/// Secret key size
pub const SECRET_KEY_SIZE: usize = 32;

/// Recoverable signature size (`r ‖ s ‖ recovery id`)
pub const SIGNATURE_SIZE: usize = 65;

/// ECDH shared secret size
pub const SHARED_SECRET_SIZE: usize = 32;

/// Keccak-256 / SHA-256 output size
pub const HASH_SIZE: usize = 32;

/// Fixed ciphertext expansion of [`ecies::encrypt`]:
/// `0x04 ‖ ephemeral_pubkey(64) ‖ iv(16) ‖ … ‖ tag(32)`
pub const ECIES_OVERHEAD: usize = 1 + PUBLIC_KEY_SIZE + ecies::IV_SIZE + ecies::TAG_SIZE;
