//! Recoverable ECDSA signatures over secp256k1.
//!
//! Signatures are 65 bytes: `r(32) ‖ s(32) ‖ v(1)` where `v` is the recovery
//! id in `0..=3`. The signer's public key can be recovered from a signature
//! and the 32-byte message hash, which is how the handshake learns the
//! initiator's ephemeral key.
//!
//! ## Usage
//!
//! ```ignore
//! use rlpx_crypto::{KeyPair, RecoverableSignature};
//!
//! let pair = KeyPair::generate()?;
//! let hash = [7u8; 32];
//! let sig = RecoverableSignature::sign(pair.secret(), &hash)?;
//! assert_eq!(sig.recover(&hash)?, *pair.public());
//! ```

use crate::keys::{PublicKey, SecretKey};
use crate::{CryptoError, SIGNATURE_SIZE};
use secp256k1::SECP256K1;
use secp256k1::ecdsa::{RecoverableSignature as SecpSignature, RecoveryId};

/// Recoverable ECDSA signature (65 bytes)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature([u8; SIGNATURE_SIZE]);

impl RecoverableSignature {
    /// Sign a 32-byte message hash.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if the recovery id produced by
    /// the backend is outside `0..=3`.
    pub fn sign(secret: &SecretKey, hash: &[u8; 32]) -> Result<Self, CryptoError> {
        let message = secp256k1::Message::from_digest(*hash);
        let signature = SECP256K1.sign_ecdsa_recoverable(&message, &secret.to_secp());
        let (recovery_id, compact) = signature.serialize_compact();

        let v = u8::try_from(recovery_id.to_i32()).map_err(|_| CryptoError::InvalidSignature)?;
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes[..64].copy_from_slice(&compact);
        bytes[64] = v;
        Ok(Self(bytes))
    }

    /// Recover the public key that produced this signature over `hash`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if the signature is malformed
    /// or no key can be recovered.
    pub fn recover(&self, hash: &[u8; 32]) -> Result<PublicKey, CryptoError> {
        let recovery_id = RecoveryId::from_i32(i32::from(self.0[64]))
            .map_err(|_| CryptoError::InvalidSignature)?;
        let signature = SecpSignature::from_compact(&self.0[..64], recovery_id)
            .map_err(|_| CryptoError::InvalidSignature)?;
        let message = secp256k1::Message::from_digest(*hash);
        let key = SECP256K1
            .recover_ecdsa(&message, &signature)
            .map_err(|_| CryptoError::InvalidSignature)?;
        Ok(PublicKey::from_secp(&key))
    }

    /// Create a signature from raw bytes. No validation happens until
    /// [`recover`](Self::recover).
    #[must_use]
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a signature from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if the slice is not exactly 65 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; SIGNATURE_SIZE] =
            slice.try_into().map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Self(bytes))
    }

    /// Get signature as bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    /// Convert to bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        self.0
    }
}

impl std::fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecoverableSignature(v={})", self.0[64])
    }
}
