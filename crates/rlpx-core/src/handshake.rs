//! Auth / ack message codec.
//!
//! Two wire forms exist for each message:
//!
//! - **Plain**: fixed-size plaintext, ECIES-encrypted without shared MAC
//!   data. Auth is `sig(65) ‖ keccak(ephemeral-pubkey)(32) ‖ pubkey(64) ‖
//!   nonce(32) ‖ 0x00`, ack is `ephemeral-pubkey(64) ‖ nonce(32) ‖ 0x00`.
//! - **EIP-8**: an RLP list followed by 100..=150 random padding bytes,
//!   ECIES-encrypted behind a 2-byte big-endian length prefix that doubles as
//!   the ECIES shared MAC data. Receivers accept lists longer than expected
//!   and ignore the extra elements.
//!
//! Decoders detect the form structurally: an uncompressed-point marker at
//! offset 0 selects the plain form, falling back to EIP-8 if that does not
//! decrypt.

use crate::error::SessionError;
use crate::config::SUPPORTED_RLPX_VERSION;
use rlp::{Rlp, RlpStream};
use rlpx_crypto::random::{fill_random, random_range};
use rlpx_crypto::{ECIES_OVERHEAD, PublicKey, RecoverableSignature, SecretKey, ecies};
use rlpx_crypto::hash::keccak256;

/// Plain auth plaintext size
pub const AUTH_PLAIN_SIZE: usize = 65 + 32 + 64 + 32 + 1;

/// Plain auth ciphertext size
pub const AUTH_CIPHERTEXT_SIZE: usize = AUTH_PLAIN_SIZE + ECIES_OVERHEAD;

/// Plain ack plaintext size
pub const ACK_PLAIN_SIZE: usize = 64 + 32 + 1;

/// Plain ack ciphertext size
pub const ACK_CIPHERTEXT_SIZE: usize = ACK_PLAIN_SIZE + ECIES_OVERHEAD;

/// EIP-8 padding bounds (inclusive)
pub const EIP8_PADDING_MIN: usize = 100;
/// Upper EIP-8 padding bound
pub const EIP8_PADDING_MAX: usize = 150;

const NONCE_SIZE: usize = 32;

/// Handshake message wire form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageFormat {
    /// Fixed-size legacy form
    Plain,
    /// Variable-length RLP form with an authenticated size prefix
    Eip8,
}

/// Initiator's auth message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthMessage {
    /// Signature by the initiator's ephemeral key over `ecdh-token ⊕ nonce`
    pub signature: RecoverableSignature,
    /// Initiator's static public key
    pub public_key: PublicKey,
    /// Initiator nonce
    pub nonce: [u8; NONCE_SIZE],
    /// Advertised version (4 for the plain form)
    pub version: u64,
}

impl AuthMessage {
    /// Fixed-size plaintext. The ephemeral public key only contributes its
    /// hash.
    #[must_use]
    pub fn encode_plain(&self, ephemeral_public: &PublicKey) -> Vec<u8> {
        let mut out = Vec::with_capacity(AUTH_PLAIN_SIZE);
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&keccak256(ephemeral_public.as_bytes()));
        out.extend_from_slice(self.public_key.as_bytes());
        out.extend_from_slice(&self.nonce);
        out.push(0);
        out
    }

    /// RLP plaintext `[sig, pubkey, nonce, version]` with random padding.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Crypto`] if the CSPRNG fails.
    pub fn encode_eip8(&self) -> Result<Vec<u8>, SessionError> {
        let mut stream = RlpStream::new_list(4);
        stream
            .append(&self.signature.to_bytes().to_vec())
            .append(&self.public_key.to_bytes().to_vec())
            .append(&self.nonce.to_vec())
            .append(&self.version);
        pad_eip8(stream.out().to_vec())
    }

    fn decode_plain(message: &[u8]) -> Result<Self, SessionError> {
        if message.len() != AUTH_PLAIN_SIZE {
            return Err(SessionError::InvalidMessage("invalid auth message length"));
        }
        if message[AUTH_PLAIN_SIZE - 1] != 0 {
            return Err(SessionError::InvalidMessage("invalid auth flag"));
        }

        let signature = RecoverableSignature::from_slice(&message[..65])?;
        let public_key = PublicKey::from_slice(&message[65 + 32..65 + 32 + 64])?;
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&message[65 + 32 + 64..AUTH_PLAIN_SIZE - 1]);

        Ok(Self {
            signature,
            public_key,
            nonce,
            version: SUPPORTED_RLPX_VERSION,
        })
    }

    fn decode_eip8(message: &[u8]) -> Result<Self, SessionError> {
        let list = leading_list(message)?;
        if item_count(&list)? < 4 {
            return Err(SessionError::InvalidMessage("auth list too short"));
        }

        let signature = RecoverableSignature::from_slice(fixed_field(&list, 0, 65)?)?;
        let public_key = PublicKey::from_slice(fixed_field(&list, 1, 64)?)?;
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(fixed_field(&list, 2, NONCE_SIZE)?);
        let version = list
            .val_at::<u64>(3)
            .map_err(|_| SessionError::InvalidMessage("invalid auth version"))?;

        Ok(Self {
            signature,
            public_key,
            nonce,
            version,
        })
    }
}

/// Responder's ack message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckMessage {
    /// Responder's ephemeral public key
    pub ephemeral_public: PublicKey,
    /// Responder nonce
    pub nonce: [u8; NONCE_SIZE],
    /// Advertised version (4 for the plain form)
    pub version: u64,
}

impl AckMessage {
    /// Fixed-size plaintext.
    #[must_use]
    pub fn encode_plain(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ACK_PLAIN_SIZE);
        out.extend_from_slice(self.ephemeral_public.as_bytes());
        out.extend_from_slice(&self.nonce);
        out.push(0);
        out
    }

    /// RLP plaintext `[ephemeral-pubkey, nonce, version]` with random padding.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Crypto`] if the CSPRNG fails.
    pub fn encode_eip8(&self) -> Result<Vec<u8>, SessionError> {
        let mut stream = RlpStream::new_list(3);
        stream
            .append(&self.ephemeral_public.to_bytes().to_vec())
            .append(&self.nonce.to_vec())
            .append(&self.version);
        pad_eip8(stream.out().to_vec())
    }

    fn decode_plain(message: &[u8]) -> Result<Self, SessionError> {
        if message.len() != ACK_PLAIN_SIZE {
            return Err(SessionError::InvalidMessage("invalid ack message length"));
        }
        if message[ACK_PLAIN_SIZE - 1] != 0 {
            return Err(SessionError::InvalidMessage("invalid known byte"));
        }

        let ephemeral_public = PublicKey::from_slice(&message[..64])?;
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&message[64..64 + NONCE_SIZE]);

        Ok(Self {
            ephemeral_public,
            nonce,
            version: SUPPORTED_RLPX_VERSION,
        })
    }

    fn decode_eip8(message: &[u8]) -> Result<Self, SessionError> {
        let list = leading_list(message)?;
        if item_count(&list)? < 3 {
            return Err(SessionError::InvalidMessage("ack list too short"));
        }

        let ephemeral_public = PublicKey::from_slice(fixed_field(&list, 0, 64)?)?;
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(fixed_field(&list, 1, NONCE_SIZE)?);
        let version = list
            .val_at::<u64>(2)
            .map_err(|_| SessionError::InvalidMessage("invalid ack version"))?;

        Ok(Self {
            ephemeral_public,
            nonce,
            version,
        })
    }
}

/// A decoded handshake message and where it sat in the input.
#[derive(Debug, Clone)]
pub struct Decoded<'a, M> {
    /// Parsed message
    pub message: M,
    /// Wire form it arrived in
    pub format: MessageFormat,
    /// Exact ciphertext bytes of the message (MAC seed material)
    pub raw: &'a [u8],
    /// Bytes following the message
    pub rest: &'a [u8],
}

/// Encrypt a handshake plaintext to `recipient` in the given form.
///
/// # Errors
///
/// Returns [`SessionError::InvalidMessage`] if an EIP-8 message does not fit
/// the 16-bit size prefix and [`SessionError::Crypto`] on encryption failure.
pub fn seal(plaintext: &[u8], recipient: &PublicKey, format: MessageFormat) -> Result<Vec<u8>, SessionError> {
    match format {
        MessageFormat::Plain => Ok(ecies::encrypt(recipient, plaintext, &[])?),
        MessageFormat::Eip8 => {
            let size = u16::try_from(plaintext.len() + ECIES_OVERHEAD)
                .map_err(|_| SessionError::InvalidMessage("handshake message too large"))?;
            let prefix = size.to_be_bytes();
            let sealed = ecies::encrypt(recipient, plaintext, &prefix)?;

            let mut out = Vec::with_capacity(2 + sealed.len());
            out.extend_from_slice(&prefix);
            out.extend_from_slice(&sealed);
            Ok(out)
        }
    }
}

/// Decrypt and parse an auth message addressed to `secret`.
///
/// # Errors
///
/// Returns [`SessionError::InvalidMessage`] for short input or malformed
/// contents and [`SessionError::Crypto`] if neither form decrypts.
pub fn decode_auth<'a>(secret: &SecretKey, data: &'a [u8]) -> Result<Decoded<'a, AuthMessage>, SessionError> {
    if data.len() < AUTH_CIPHERTEXT_SIZE {
        return Err(SessionError::InvalidMessage("auth ciphertext too short"));
    }
    let opened = open(secret, data, AUTH_CIPHERTEXT_SIZE)?;
    let message = match opened.format {
        MessageFormat::Plain => AuthMessage::decode_plain(&opened.plaintext)?,
        MessageFormat::Eip8 => AuthMessage::decode_eip8(&opened.plaintext)?,
    };
    Ok(opened.into_decoded(message, data))
}

/// Decrypt and parse an ack message addressed to `secret`.
///
/// # Errors
///
/// Returns [`SessionError::InvalidMessage`] for short input or malformed
/// contents and [`SessionError::Crypto`] if neither form decrypts.
pub fn decode_ack<'a>(secret: &SecretKey, data: &'a [u8]) -> Result<Decoded<'a, AckMessage>, SessionError> {
    if data.len() < ACK_CIPHERTEXT_SIZE {
        return Err(SessionError::InvalidMessage("ack ciphertext too short"));
    }
    let opened = open(secret, data, ACK_CIPHERTEXT_SIZE)?;
    let message = match opened.format {
        MessageFormat::Plain => AckMessage::decode_plain(&opened.plaintext)?,
        MessageFormat::Eip8 => AckMessage::decode_eip8(&opened.plaintext)?,
    };
    Ok(opened.into_decoded(message, data))
}

struct Opened {
    plaintext: Vec<u8>,
    format: MessageFormat,
    size: usize,
}

impl Opened {
    fn into_decoded<M>(self, message: M, data: &[u8]) -> Decoded<'_, M> {
        let (raw, rest) = data.split_at(self.size);
        Decoded {
            message,
            format: self.format,
            raw,
            rest,
        }
    }
}

fn open(secret: &SecretKey, data: &[u8], plain_ciphertext_size: usize) -> Result<Opened, SessionError> {
    if data[0] == 0x04 {
        match ecies::decrypt(secret, &data[..plain_ciphertext_size], &[]) {
            Ok(plaintext) => {
                return Ok(Opened {
                    plaintext,
                    format: MessageFormat::Plain,
                    size: plain_ciphertext_size,
                });
            }
            Err(e) => {
                tracing::trace!("plain handshake decrypt failed ({}), trying EIP-8", e);
            }
        }
    }

    let size = usize::from(u16::from_be_bytes([data[0], data[1]])) + 2;
    if data.len() < size {
        return Err(SessionError::InvalidMessage("handshake ciphertext truncated"));
    }
    let plaintext = ecies::decrypt(secret, &data[2..size], &data[..2])?;

    Ok(Opened {
        plaintext,
        format: MessageFormat::Eip8,
        size,
    })
}

fn pad_eip8(mut data: Vec<u8>) -> Result<Vec<u8>, SessionError> {
    let pad_len = random_range(EIP8_PADDING_MIN, EIP8_PADDING_MAX)?;
    let start = data.len();
    data.resize(start + pad_len, 0);
    fill_random(&mut data[start..])?;
    Ok(data)
}

/// The RLP list at the start of `message`, without trailing padding.
fn leading_list(message: &[u8]) -> Result<Rlp<'_>, SessionError> {
    let info = Rlp::new(message)
        .payload_info()
        .map_err(|_| SessionError::InvalidMessage("invalid rlp"))?;
    let end = info.header_len + info.value_len;
    if end > message.len() {
        return Err(SessionError::InvalidMessage("rlp list truncated"));
    }
    let list = Rlp::new(&message[..end]);
    if !list.is_list() {
        return Err(SessionError::InvalidMessage("expected rlp list"));
    }
    Ok(list)
}

fn item_count(list: &Rlp<'_>) -> Result<usize, SessionError> {
    list.item_count()
        .map_err(|_| SessionError::InvalidMessage("invalid rlp"))
}

fn fixed_field<'a>(list: &Rlp<'a>, index: usize, len: usize) -> Result<&'a [u8], SessionError> {
    let data = list
        .at(index)
        .and_then(|item| item.data())
        .map_err(|_| SessionError::InvalidMessage("invalid rlp field"))?;
    if data.len() != len {
        return Err(SessionError::InvalidMessage("unexpected field length"));
    }
    Ok(data)
}
