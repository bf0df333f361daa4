//! ECIES over secp256k1, as used by the RLPx handshake.
//!
//! Ciphertext layout:
//!
//! ```text
//! 0x04 ‖ ephemeral_pubkey(64) ‖ iv(16) ‖ AES-128-CTR(plaintext) ‖ HMAC-SHA256 tag(32)
//! ```
//!
//! The key material is the ECDH x-coordinate between the ephemeral key and
//! the recipient, stretched with [`concat_kdf`] to 32 bytes. The first half
//! is the AES key; SHA-256 of the second half is the MAC key. The tag covers
//! `iv ‖ ciphertext ‖ shared_mac_data`.

use crate::hash::{concat_kdf, hmac_sha256, hmac_sha256_verify, sha256};
use crate::keys::{KeyPair, PublicKey, SecretKey};
use crate::random::random_16;
use crate::{CryptoError, ECIES_OVERHEAD, PUBLIC_KEY_SIZE};
use aes::cipher::{KeyIvInit, StreamCipher};
use zeroize::Zeroize;

/// AES-CTR IV size
pub const IV_SIZE: usize = 16;

/// HMAC-SHA256 tag size
pub const TAG_SIZE: usize = 32;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// Encrypt `plaintext` to `recipient` with a fresh ephemeral key and IV.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the CSPRNG fails.
pub fn encrypt(
    recipient: &PublicKey,
    plaintext: &[u8],
    shared_mac_data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = KeyPair::generate()?;
    let iv = random_16()?;
    encrypt_with(&ephemeral, &iv, recipient, plaintext, shared_mac_data)
}

/// Encrypt with a caller-supplied ephemeral key and IV.
///
/// Deterministic; only for reproducible tests. Never reuse an ephemeral
/// key/IV pair.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyLength`] if the derived keys have the
/// wrong size (never for a well-formed recipient).
pub fn encrypt_with(
    ephemeral: &KeyPair,
    iv: &[u8; IV_SIZE],
    recipient: &PublicKey,
    plaintext: &[u8],
    shared_mac_data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let (mut enc_key, mut mac_key) = derive_keys(ephemeral.secret(), recipient);

    let mut out = Vec::with_capacity(plaintext.len() + ECIES_OVERHEAD);
    out.push(0x04);
    out.extend_from_slice(ephemeral.public().as_bytes());
    out.extend_from_slice(iv);

    let body_start = out.len();
    out.extend_from_slice(plaintext);
    apply_ctr(&enc_key, iv, &mut out[body_start..])?;

    let tag = hmac_sha256(&mac_key, &[&out[1 + PUBLIC_KEY_SIZE..], shared_mac_data]);
    out.extend_from_slice(&tag);

    enc_key.zeroize();
    mac_key.zeroize();
    Ok(out)
}

/// Decrypt an ECIES message addressed to `secret`.
///
/// # Errors
///
/// - [`CryptoError::DecryptionFailed`] if the message is too short or does
///   not start with `0x04`
/// - [`CryptoError::InvalidKey`] if the embedded ephemeral key is not on the curve
/// - [`CryptoError::InvalidMac`] if the tag does not authenticate
pub fn decrypt(
    secret: &SecretKey,
    data: &[u8],
    shared_mac_data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if data.len() < ECIES_OVERHEAD {
        return Err(CryptoError::DecryptionFailed("message too short"));
    }
    if data[0] != 0x04 {
        return Err(CryptoError::DecryptionFailed("unknown point format"));
    }

    let ephemeral = PublicKey::from_slice(&data[1..=PUBLIC_KEY_SIZE])?;
    let (mut enc_key, mut mac_key) = derive_keys(secret, &ephemeral);

    let iv_start = 1 + PUBLIC_KEY_SIZE;
    let tag_start = data.len() - TAG_SIZE;
    let result = hmac_sha256_verify(
        &mac_key,
        &[&data[iv_start..tag_start], shared_mac_data],
        &data[tag_start..],
    )
    .and_then(|()| {
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&data[iv_start..iv_start + IV_SIZE]);
        let mut plaintext = data[iv_start + IV_SIZE..tag_start].to_vec();
        apply_ctr(&enc_key, &iv, &mut plaintext)?;
        Ok(plaintext)
    });

    enc_key.zeroize();
    mac_key.zeroize();
    result
}

fn derive_keys(secret: &SecretKey, remote: &PublicKey) -> ([u8; 16], [u8; 32]) {
    let shared = secret.ecdh(remote);
    let mut key = concat_kdf(shared.as_bytes(), 32);

    let mut enc_key = [0u8; 16];
    enc_key.copy_from_slice(&key[..16]);
    let mac_key = sha256(&key[16..]);

    key.zeroize();
    (enc_key, mac_key)
}

fn apply_ctr(key: &[u8; 16], iv: &[u8; IV_SIZE], buf: &mut [u8]) -> Result<(), CryptoError> {
    let mut cipher =
        Aes128Ctr::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidKeyLength {
            expected: 16,
            actual: key.len(),
        })?;
    cipher.apply_keystream(buf);
    Ok(())
}
