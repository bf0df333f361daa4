//! Symmetric frame protection derived from the handshake.
//!
//! After the handshake both sides hold the same secrets:
//!
//! ```text
//! shared_secret = keccak(ecdhe ‖ keccak(responder_nonce ‖ initiator_nonce))
//! token         = keccak(shared_secret)
//! aes_secret    = keccak(ecdhe ‖ shared_secret)
//! mac_secret    = keccak(ecdhe ‖ aes_secret)
//! ```
//!
//! Frames are encrypted with AES-256-CTR (zero IV, one continuous stream per
//! direction) and authenticated by two running Keccak-256 accumulators. The
//! accumulator digest is whitened through a single AES-256 block keyed with
//! `mac_secret` before each header/body MAC is folded in.

use crate::error::{FrameError, SessionError};
use crate::frame::ceil16;
use crate::{HEADER_SIZE, MAC_SIZE};
use aes::cipher::{BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use rlpx_crypto::SharedSecret;
use rlpx_crypto::constant_time::{verify_16, xor_16};
use rlpx_crypto::hash::{KeccakMac, keccak256, keccak256_concat, xor_32};
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Encrypts outbound frames and authenticates inbound ones.
///
/// Implementations are stateful: frames must pass through in wire order.
pub trait FrameCipher {
    /// Produce `header_ct ‖ header_mac ‖ body_ct ‖ body_mac`.
    ///
    /// `body` must already be padded to a 16-byte boundary.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Format`] for an unpadded body, or
    /// [`SessionError::NotReady`] if the cipher is not set up.
    fn encrypt_frame(&mut self, header: &[u8; HEADER_SIZE], body: &[u8]) -> crate::Result<Vec<u8>>;

    /// Authenticate and decrypt the header at the start of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Format`] if fewer than 32 bytes are given and
    /// [`SessionError::Authentication`] on a MAC mismatch.
    fn decrypt_header(&mut self, data: &[u8]) -> crate::Result<[u8; HEADER_SIZE]>;

    /// Authenticate and decrypt a body of `body_size` unpadded bytes at the
    /// start of `data`, returning exactly `body_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Format`] if the padded body and its MAC are not
    /// fully present and [`SessionError::Authentication`] on a MAC mismatch.
    fn decrypt_body(&mut self, data: &[u8], body_size: usize) -> crate::Result<Vec<u8>>;
}

/// Identity framing with zero MACs.
///
/// Used by the multiplexer before (or without) a session, and in tests that
/// exercise framing alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFrameCipher;

impl FrameCipher for PlainFrameCipher {
    fn encrypt_frame(&mut self, header: &[u8; HEADER_SIZE], body: &[u8]) -> crate::Result<Vec<u8>> {
        if body.len() % 16 != 0 {
            return Err(FrameError::Format("body not padded").into());
        }
        let mut out = Vec::with_capacity(HEADER_SIZE + MAC_SIZE + body.len() + MAC_SIZE);
        out.extend_from_slice(header);
        out.extend_from_slice(&[0u8; MAC_SIZE]);
        out.extend_from_slice(body);
        out.extend_from_slice(&[0u8; MAC_SIZE]);
        Ok(out)
    }

    fn decrypt_header(&mut self, data: &[u8]) -> crate::Result<[u8; HEADER_SIZE]> {
        if data.len() < HEADER_SIZE + MAC_SIZE {
            return Err(FrameError::Format("insufficient data for header").into());
        }
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&data[..HEADER_SIZE]);
        Ok(header)
    }

    fn decrypt_body(&mut self, data: &[u8], body_size: usize) -> crate::Result<Vec<u8>> {
        if data.len() < ceil16(body_size) + MAC_SIZE {
            return Err(FrameError::Format("insufficient data for body").into());
        }
        Ok(data[..body_size].to_vec())
    }
}

/// Secrets agreed by the handshake.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionSecrets {
    shared_secret: [u8; 32],
    token: [u8; 32],
    aes_secret: [u8; 32],
    mac_secret: [u8; 32],
}

impl SessionSecrets {
    /// Derive the session secrets from the ephemeral ECDH result and both
    /// nonces.
    #[must_use]
    pub fn derive(
        ephemeral_shared: &SharedSecret,
        initiator_nonce: &[u8; 32],
        responder_nonce: &[u8; 32],
    ) -> Self {
        let ecdhe = ephemeral_shared.as_bytes();
        let nonce_hash = keccak256_concat(&[&responder_nonce[..], &initiator_nonce[..]]);
        let shared_secret = keccak256_concat(&[&ecdhe[..], &nonce_hash[..]]);
        let token = keccak256(&shared_secret);
        let aes_secret = keccak256_concat(&[&ecdhe[..], &shared_secret[..]]);
        let mac_secret = keccak256_concat(&[&ecdhe[..], &aes_secret[..]]);

        Self {
            shared_secret,
            token,
            aes_secret,
            mac_secret,
        }
    }

    /// `keccak(ecdhe ‖ keccak(responder_nonce ‖ initiator_nonce))`
    #[must_use]
    pub fn shared_secret(&self) -> &[u8; 32] {
        &self.shared_secret
    }

    /// `keccak(shared_secret)`
    #[must_use]
    pub fn token(&self) -> &[u8; 32] {
        &self.token
    }

    /// Frame encryption key
    #[must_use]
    pub fn aes_secret(&self) -> &[u8; 32] {
        &self.aes_secret
    }

    /// MAC whitening key
    #[must_use]
    pub fn mac_secret(&self) -> &[u8; 32] {
        &self.mac_secret
    }
}

impl std::fmt::Debug for SessionSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSecrets").finish_non_exhaustive()
    }
}

/// Handshake values that seed the two MAC accumulators.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeTranscript<'a> {
    /// Nonce sent in the auth message
    pub initiator_nonce: &'a [u8; 32],
    /// Nonce sent in the ack message
    pub responder_nonce: &'a [u8; 32],
    /// Raw auth ciphertext as sent on the wire
    pub auth: &'a [u8],
    /// Raw ack ciphertext as sent on the wire
    pub ack: &'a [u8],
}

/// Live frame cipher of an established session.
pub struct SessionCipher {
    enc: Aes256Ctr,
    dec: Aes256Ctr,
    mac_enc: aes::Aes256,
    egress_mac: KeccakMac,
    ingress_mac: KeccakMac,
}

impl SessionCipher {
    /// Set up stream ciphers and MAC accumulators for one side.
    ///
    /// The initiator's egress MAC starts from
    /// `keccak(mac_secret ⊕ responder_nonce ‖ auth)` and its ingress MAC from
    /// `keccak(mac_secret ⊕ initiator_nonce ‖ ack)`; the responder uses the
    /// same two accumulators the other way round.
    #[must_use]
    pub fn new(secrets: &SessionSecrets, is_initiator: bool, transcript: &HandshakeTranscript<'_>) -> Self {
        let mut auth_mac = KeccakMac::new();
        auth_mac.update(&xor_32(&secrets.mac_secret, transcript.responder_nonce));
        auth_mac.update(transcript.auth);

        let mut ack_mac = KeccakMac::new();
        ack_mac.update(&xor_32(&secrets.mac_secret, transcript.initiator_nonce));
        ack_mac.update(transcript.ack);

        let (egress_mac, ingress_mac) = if is_initiator {
            (auth_mac, ack_mac)
        } else {
            (ack_mac, auth_mac)
        };

        let iv = [0u8; 16];
        Self {
            enc: Aes256Ctr::new(&secrets.aes_secret.into(), &iv.into()),
            dec: Aes256Ctr::new(&secrets.aes_secret.into(), &iv.into()),
            mac_enc: aes::Aes256::new(&secrets.mac_secret.into()),
            egress_mac,
            ingress_mac,
        }
    }

    /// Outbound MAC accumulator
    #[must_use]
    pub fn egress_mac(&self) -> &KeccakMac {
        &self.egress_mac
    }

    /// Inbound MAC accumulator
    #[must_use]
    pub fn ingress_mac(&self) -> &KeccakMac {
        &self.ingress_mac
    }
}

/// Fold `seed` into `mac` through the whitening block and return the new
/// 16-byte tag.
fn update_mac(mac_enc: &aes::Aes256, mac: &mut KeccakMac, seed: &[u8; 16]) -> [u8; 16] {
    let mut block = aes::Block::from(first_16(&mac.digest()));
    mac_enc.encrypt_block(&mut block);

    let mut whitened = [0u8; 16];
    whitened.copy_from_slice(&block);
    first_16(&mac.update_digest(&xor_16(&whitened, seed)))
}

fn first_16(digest: &[u8; 32]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

impl FrameCipher for SessionCipher {
    fn encrypt_frame(&mut self, header: &[u8; HEADER_SIZE], body: &[u8]) -> crate::Result<Vec<u8>> {
        if body.len() % 16 != 0 {
            return Err(FrameError::Format("body not padded").into());
        }

        let mut out = Vec::with_capacity(HEADER_SIZE + MAC_SIZE + body.len() + MAC_SIZE);

        let mut header_ct = *header;
        self.enc.apply_keystream(&mut header_ct);
        let header_mac = update_mac(&self.mac_enc, &mut self.egress_mac, &header_ct);
        out.extend_from_slice(&header_ct);
        out.extend_from_slice(&header_mac);

        let body_start = out.len();
        out.extend_from_slice(body);
        self.enc.apply_keystream(&mut out[body_start..]);
        self.egress_mac.update(&out[body_start..]);
        let seed = first_16(&self.egress_mac.digest());
        let body_mac = update_mac(&self.mac_enc, &mut self.egress_mac, &seed);
        out.extend_from_slice(&body_mac);

        Ok(out)
    }

    fn decrypt_header(&mut self, data: &[u8]) -> crate::Result<[u8; HEADER_SIZE]> {
        if data.len() < HEADER_SIZE + MAC_SIZE {
            return Err(FrameError::Format("insufficient data for header").into());
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&data[..HEADER_SIZE]);
        let mut mac = [0u8; MAC_SIZE];
        mac.copy_from_slice(&data[HEADER_SIZE..HEADER_SIZE + MAC_SIZE]);

        let expected = update_mac(&self.mac_enc, &mut self.ingress_mac, &header);
        if !verify_16(&expected, &mac) {
            return Err(SessionError::Authentication("invalid header mac").into());
        }

        self.dec.apply_keystream(&mut header);
        Ok(header)
    }

    fn decrypt_body(&mut self, data: &[u8], body_size: usize) -> crate::Result<Vec<u8>> {
        let read_size = ceil16(body_size);
        if data.len() < read_size + MAC_SIZE {
            return Err(FrameError::Format("insufficient data for body").into());
        }

        let mut body = data[..read_size].to_vec();
        let mut mac = [0u8; MAC_SIZE];
        mac.copy_from_slice(&data[read_size..read_size + MAC_SIZE]);

        self.ingress_mac.update(&body);
        let seed = first_16(&self.ingress_mac.digest());
        let expected = update_mac(&self.mac_enc, &mut self.ingress_mac, &seed);
        if !verify_16(&expected, &mac) {
            return Err(SessionError::Authentication("invalid body mac").into());
        }

        self.dec.apply_keystream(&mut body);
        body.truncate(body_size);
        Ok(body)
    }
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCipher").finish_non_exhaustive()
    }
}
