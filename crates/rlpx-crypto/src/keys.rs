//! secp256k1 keys and ECDH key agreement.
//!
//! Public keys travel on the wire as raw 64-byte `x ‖ y` coordinates,
//! without the `0x04` uncompressed-point prefix. Every public key accepted
//! from the network is validated to lie on the curve.

use crate::hash::keccak256;
use crate::random::random_32;
use crate::{CryptoError, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE};
use secp256k1::SECP256K1;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// secp256k1 secret scalar (32 bytes), zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; SECRET_KEY_SIZE]);

/// Raw secp256k1 public key (64 bytes, no prefix).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

/// ECDH shared secret: x-coordinate of the shared point.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

/// A secret key together with its public key.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl SecretKey {
    /// Import a secret key, rejecting zero and out-of-range scalars.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the bytes are not a valid scalar.
    pub fn from_bytes(bytes: [u8; SECRET_KEY_SIZE]) -> Result<Self, CryptoError> {
        secp256k1::SecretKey::from_slice(&bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self(bytes))
    }

    /// Import a secret key from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] for a slice that is not 32
    /// bytes and [`CryptoError::InvalidKey`] for an invalid scalar.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; SECRET_KEY_SIZE] =
            slice
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: SECRET_KEY_SIZE,
                    actual: slice.len(),
                })?;
        Self::from_bytes(bytes)
    }

    /// Generate a new random secret key from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomFailed`] if the CSPRNG fails.
    pub fn generate() -> Result<Self, CryptoError> {
        loop {
            // Out-of-range draws have probability ~2^-128; retry them.
            if let Ok(key) = Self::from_bytes(random_32()?) {
                return Ok(key);
            }
        }
    }

    /// Export as bytes.
    ///
    /// # Security
    ///
    /// The returned bytes contain the raw private key. Handle with care.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_SIZE] {
        self.0
    }

    /// Derive the public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_secp(&secp256k1::PublicKey::from_secret_key(
            SECP256K1,
            &self.to_secp(),
        ))
    }

    /// ECDH with a remote public key.
    #[must_use]
    pub fn ecdh(&self, remote: &PublicKey) -> SharedSecret {
        let point = secp256k1::ecdh::shared_secret_point(&remote.to_secp(), &self.to_secp());
        let mut x = [0u8; 32];
        x.copy_from_slice(&point[..32]);
        SharedSecret(x)
    }

    pub(crate) fn to_secp(&self) -> secp256k1::SecretKey {
        // Validity is checked on construction.
        match secp256k1::SecretKey::from_slice(&self.0) {
            Ok(key) => key,
            Err(_) => unreachable!("secret key validated on construction"),
        }
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

impl PublicKey {
    /// Import a raw 64-byte public key, validating that it is on the curve.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the point is not on secp256k1.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Result<Self, CryptoError> {
        let mut prefixed = [0u8; PUBLIC_KEY_SIZE + 1];
        prefixed[0] = 0x04;
        prefixed[1..].copy_from_slice(&bytes);
        secp256k1::PublicKey::from_slice(&prefixed).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self(bytes))
    }

    /// Import a raw public key from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the slice is not 64 bytes or the
    /// point is not on the curve.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; PUBLIC_KEY_SIZE] = slice.try_into().map_err(|_| CryptoError::InvalidKey)?;
        Self::from_bytes(bytes)
    }

    /// Export the raw 64-byte key.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0
    }

    /// Borrow the raw 64-byte key.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub(crate) fn from_secp(key: &secp256k1::PublicKey) -> Self {
        let serialized = key.serialize_uncompressed();
        let mut raw = [0u8; PUBLIC_KEY_SIZE];
        raw.copy_from_slice(&serialized[1..]);
        Self(raw)
    }

    pub(crate) fn to_secp(self) -> secp256k1::PublicKey {
        let mut prefixed = [0u8; PUBLIC_KEY_SIZE + 1];
        prefixed[0] = 0x04;
        prefixed[1..].copy_from_slice(&self.0);
        // Validity is checked on construction.
        match secp256k1::PublicKey::from_slice(&prefixed) {
            Ok(key) => key,
            Err(_) => unreachable!("public key validated on construction"),
        }
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({:02x}{:02x}{:02x}{:02x}..)", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl SharedSecret {
    /// Get shared secret as bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl KeyPair {
    /// Generate a fresh random keypair.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomFailed`] if the CSPRNG fails.
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self::from_secret(SecretKey::generate()?))
    }

    /// Build a keypair from an existing secret key.
    #[must_use]
    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Deterministic keypair whose secret is `keccak256(seed)`.
    ///
    /// Intended for tests and reproducible node identities.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] in the negligible case that the
    /// hash is not a valid scalar.
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self::from_secret(SecretKey::from_bytes(keccak256(seed))?))
    }

    /// Secret half.
    #[must_use]
    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// Public half.
    #[must_use]
    pub fn public(&self) -> &PublicKey {
        &self.public
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public).finish()
    }
}
