//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key is malformed or not a point on the curve
    #[error("invalid key")]
    InvalidKey,

    /// Signature could not be parsed or recovery failed
    #[error("invalid signature")]
    InvalidSignature,

    /// ECIES decryption failed
    #[error("decryption failed: {0}")]
    DecryptionFailed(&'static str),

    /// ECIES tag did not authenticate the ciphertext
    #[error("invalid MAC")]
    InvalidMac,

    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,
}
