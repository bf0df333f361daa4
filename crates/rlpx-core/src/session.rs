//! RLPx session: handshake state and the resulting frame cipher.
//!
//! A session is created once per connection with the local static key and a
//! fresh ephemeral key. The handshake runs in four steps:
//!
//! 1. Initiator: [`create_auth_message`](RlpxSession::create_auth_message),
//!    [`encrypt_auth_message`](RlpxSession::encrypt_auth_message)
//! 2. Responder: [`decode_authentication`](RlpxSession::decode_authentication)
//! 3. Responder: [`create_auth_ack_message`](RlpxSession::create_auth_ack_message),
//!    [`encrypt_auth_ack_message`](RlpxSession::encrypt_auth_ack_message)
//! 4. Initiator: [`decode_auth_ack_message`](RlpxSession::decode_auth_ack_message)
//!
//! Once both nonces and both raw ciphertexts are known, each side calls
//! [`setup_cipher`](RlpxSession::setup_cipher) and the session becomes a
//! [`FrameCipher`].

use crate::cipher::{FrameCipher, HandshakeTranscript, SessionCipher, SessionSecrets};
use crate::config::HandshakeConfig;
use crate::error::{FrameError, SessionError};
use crate::frame::{ceil16, decode_body_size};
use crate::handshake::{self, AckMessage, AuthMessage, MessageFormat};
use crate::{HEADER_SIZE, MAC_SIZE};
use rlpx_crypto::hash::xor_32;
use rlpx_crypto::random::random_32;
use rlpx_crypto::{KeyPair, PublicKey, RecoverableSignature};

/// Which side of the connection this session is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Dialed the connection and sends auth
    Initiator,
    /// Accepted the connection and sends ack
    Responder,
}

impl Role {
    fn name(self) -> &'static str {
        match self {
            Self::Initiator => "initiator",
            Self::Responder => "responder",
        }
    }
}

/// Handshake progress, derived from which values are known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing sent or received yet
    Idle,
    /// Own message sent or peer's received; cipher not set up
    AwaitingPeerMessage,
    /// Cipher set up; frames can flow
    Ready,
}

/// Result of [`RlpxSession::decrypt`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedFrame {
    /// Decrypted header
    pub header: [u8; HEADER_SIZE],
    /// Decrypted body, truncated to the declared body size
    pub body: Vec<u8>,
    /// Bytes consumed from the input
    pub bytes_read: usize,
}

/// Per-connection handshake and cipher state.
pub struct RlpxSession {
    keys: KeyPair,
    ephemeral: KeyPair,
    role: Role,
    config: HandshakeConfig,

    remote_pubkey: Option<PublicKey>,
    remote_ephemeral: Option<PublicKey>,
    initiator_nonce: Option<[u8; 32]>,
    responder_nonce: Option<[u8; 32]>,
    auth_init: Option<Vec<u8>>,
    auth_ack: Option<Vec<u8>>,
    remote_version: Option<u64>,
    got_eip8_auth: bool,
    got_eip8_ack: bool,

    secrets: Option<SessionSecrets>,
    cipher: Option<SessionCipher>,
}

impl RlpxSession {
    /// Create a session with a freshly generated ephemeral key.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Crypto`] if key generation fails.
    pub fn new(keys: KeyPair, role: Role, config: HandshakeConfig) -> Result<Self, SessionError> {
        let ephemeral = KeyPair::generate()?;
        Ok(Self::with_ephemeral(keys, ephemeral, role, config))
    }

    /// Create a session with a caller-supplied ephemeral key.
    #[must_use]
    pub fn with_ephemeral(keys: KeyPair, ephemeral: KeyPair, role: Role, config: HandshakeConfig) -> Self {
        Self {
            keys,
            ephemeral,
            role,
            config,
            remote_pubkey: None,
            remote_ephemeral: None,
            initiator_nonce: None,
            responder_nonce: None,
            auth_init: None,
            auth_ack: None,
            remote_version: None,
            got_eip8_auth: false,
            got_eip8_ack: false,
            secrets: None,
            cipher: None,
        }
    }

    fn require_role(&self, role: Role) -> Result<(), SessionError> {
        if self.role == role {
            Ok(())
        } else {
            Err(SessionError::WrongRole(role.name()))
        }
    }

    // ------------------------------------------------------------------
    // Auth (initiator -> responder)
    // ------------------------------------------------------------------

    /// Build the auth message for `remote`.
    ///
    /// The signature is made with the ephemeral key over
    /// `ecdh(static, remote) ⊕ nonce`. A random nonce is drawn unless one is
    /// supplied.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WrongRole`] on a responder,
    /// [`SessionError::InvalidMessage`] if an auth was already created and
    /// [`SessionError::Crypto`] if signing or randomness fails.
    pub fn create_auth_message(
        &mut self,
        remote: &PublicKey,
        nonce: Option<[u8; 32]>,
    ) -> Result<AuthMessage, SessionError> {
        self.require_role(Role::Initiator)?;
        if self.initiator_nonce.is_some() {
            return Err(SessionError::InvalidMessage("auth already created"));
        }

        let nonce = match nonce {
            Some(n) => n,
            None => random_32()?,
        };
        let token = self.keys.secret().ecdh(remote);
        let signature = RecoverableSignature::sign(self.ephemeral.secret(), &xor_32(token.as_bytes(), &nonce))?;

        self.remote_pubkey = Some(*remote);
        self.initiator_nonce = Some(nonce);

        Ok(AuthMessage {
            signature,
            public_key: *self.keys.public(),
            nonce,
            version: self.config.version,
        })
    }

    /// Encrypt `auth` to the remote static key and remember the ciphertext.
    ///
    /// Uses the EIP-8 form when [`HandshakeConfig::eip8_auth`] is set.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WrongRole`] on a responder,
    /// [`SessionError::MissingHandshakeValue`] if no remote key is known and
    /// [`SessionError::Crypto`] on encryption failure.
    pub fn encrypt_auth_message(&mut self, auth: &AuthMessage) -> Result<Vec<u8>, SessionError> {
        self.require_role(Role::Initiator)?;
        let remote = self
            .remote_pubkey
            .ok_or(SessionError::MissingHandshakeValue("remote_pubkey"))?;

        let (plaintext, format) = if self.config.eip8_auth {
            (auth.encode_eip8()?, MessageFormat::Eip8)
        } else {
            (auth.encode_plain(self.ephemeral.public()), MessageFormat::Plain)
        };
        let ciphertext = handshake::seal(&plaintext, &remote, format)?;

        tracing::debug!("auth message sealed ({:?}, {} bytes)", format, ciphertext.len());
        self.auth_init = Some(ciphertext.clone());
        Ok(ciphertext)
    }

    /// Decrypt and verify an auth message, recovering the initiator's
    /// ephemeral key. Returns any bytes following the message.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WrongRole`] on an initiator,
    /// [`SessionError::InvalidMessage`] for malformed input and
    /// [`SessionError::Crypto`] if decryption or key recovery fails.
    pub fn decode_authentication<'a>(&mut self, data: &'a [u8]) -> Result<&'a [u8], SessionError> {
        self.require_role(Role::Responder)?;

        let decoded = handshake::decode_auth(self.keys.secret(), data)?;
        let auth = decoded.message;

        let token = self.keys.secret().ecdh(&auth.public_key);
        let remote_ephemeral = auth.signature.recover(&xor_32(token.as_bytes(), &auth.nonce))?;

        self.auth_init = Some(decoded.raw.to_vec());
        self.remote_pubkey = Some(auth.public_key);
        self.remote_ephemeral = Some(remote_ephemeral);
        self.initiator_nonce = Some(auth.nonce);
        self.remote_version = Some(auth.version);
        self.got_eip8_auth = decoded.format == MessageFormat::Eip8;

        tracing::debug!(
            "auth decoded ({:?}, version {}, {} trailing bytes)",
            decoded.format,
            auth.version,
            decoded.rest.len()
        );
        Ok(decoded.rest)
    }

    // ------------------------------------------------------------------
    // Ack (responder -> initiator)
    // ------------------------------------------------------------------

    /// Build the ack message carrying the local ephemeral key.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WrongRole`] on an initiator,
    /// [`SessionError::InvalidMessage`] if an ack was already created and
    /// [`SessionError::Crypto`] if randomness fails.
    pub fn create_auth_ack_message(&mut self, nonce: Option<[u8; 32]>) -> Result<AckMessage, SessionError> {
        self.require_role(Role::Responder)?;
        if self.responder_nonce.is_some() {
            return Err(SessionError::InvalidMessage("ack already created"));
        }

        let nonce = match nonce {
            Some(n) => n,
            None => random_32()?,
        };
        self.responder_nonce = Some(nonce);

        Ok(AckMessage {
            ephemeral_public: *self.ephemeral.public(),
            nonce,
            version: self.config.version,
        })
    }

    /// Encrypt `ack` to the initiator and remember the ciphertext.
    ///
    /// Answers in the EIP-8 form if the auth arrived in it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WrongRole`] on an initiator,
    /// [`SessionError::MissingHandshakeValue`] before an auth was decoded and
    /// [`SessionError::Crypto`] on encryption failure.
    pub fn encrypt_auth_ack_message(&mut self, ack: &AckMessage) -> Result<Vec<u8>, SessionError> {
        self.require_role(Role::Responder)?;
        let remote = self
            .remote_pubkey
            .ok_or(SessionError::MissingHandshakeValue("remote_pubkey"))?;

        let (plaintext, format) = if self.got_eip8_auth {
            (ack.encode_eip8()?, MessageFormat::Eip8)
        } else {
            (ack.encode_plain(), MessageFormat::Plain)
        };
        let ciphertext = handshake::seal(&plaintext, &remote, format)?;

        tracing::debug!("ack message sealed ({:?}, {} bytes)", format, ciphertext.len());
        self.auth_ack = Some(ciphertext.clone());
        Ok(ciphertext)
    }

    /// Decrypt an ack message. Returns any bytes following it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WrongRole`] on a responder,
    /// [`SessionError::InvalidMessage`] for malformed input and
    /// [`SessionError::Crypto`] if decryption fails.
    pub fn decode_auth_ack_message<'a>(&mut self, data: &'a [u8]) -> Result<&'a [u8], SessionError> {
        self.require_role(Role::Initiator)?;

        let decoded = handshake::decode_ack(self.keys.secret(), data)?;
        let ack = decoded.message;

        self.auth_ack = Some(decoded.raw.to_vec());
        self.remote_ephemeral = Some(ack.ephemeral_public);
        self.responder_nonce = Some(ack.nonce);
        self.remote_version = Some(ack.version);
        self.got_eip8_ack = decoded.format == MessageFormat::Eip8;

        tracing::debug!(
            "ack decoded ({:?}, version {}, {} trailing bytes)",
            decoded.format,
            ack.version,
            decoded.rest.len()
        );
        Ok(decoded.rest)
    }

    // ------------------------------------------------------------------
    // Key derivation
    // ------------------------------------------------------------------

    /// Derive the session secrets and set up the frame cipher.
    ///
    /// Calling it again once the session is ready has no effect.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingHandshakeValue`] naming the first
    /// handshake value that is not yet known.
    pub fn setup_cipher(&mut self) -> Result<(), SessionError> {
        if self.cipher.is_some() {
            tracing::trace!("cipher already set up");
            return Ok(());
        }

        let responder_nonce = self
            .responder_nonce
            .ok_or(SessionError::MissingHandshakeValue("responder_nonce"))?;
        let initiator_nonce = self
            .initiator_nonce
            .ok_or(SessionError::MissingHandshakeValue("initiator_nonce"))?;
        let auth = self
            .auth_init
            .as_deref()
            .ok_or(SessionError::MissingHandshakeValue("auth_init"))?;
        let ack = self
            .auth_ack
            .as_deref()
            .ok_or(SessionError::MissingHandshakeValue("auth_ack"))?;
        let remote_ephemeral = self
            .remote_ephemeral
            .ok_or(SessionError::MissingHandshakeValue("remote_ephemeral_pubkey"))?;

        let ecdhe = self.ephemeral.secret().ecdh(&remote_ephemeral);
        let secrets = SessionSecrets::derive(&ecdhe, &initiator_nonce, &responder_nonce);
        let transcript = HandshakeTranscript {
            initiator_nonce: &initiator_nonce,
            responder_nonce: &responder_nonce,
            auth,
            ack,
        };
        let cipher = SessionCipher::new(&secrets, self.is_initiator(), &transcript);

        tracing::debug!("{} session cipher ready", self.role.name());
        self.secrets = Some(secrets);
        self.cipher = Some(cipher);
        Ok(())
    }

    /// Decrypt one complete frame from the start of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Format`] if the frame is incomplete,
    /// [`SessionError::Authentication`] on a MAC mismatch and
    /// [`SessionError::NotReady`] before [`setup_cipher`](Self::setup_cipher).
    pub fn decrypt(&mut self, data: &[u8]) -> crate::Result<DecryptedFrame> {
        let header = self.decrypt_header(data)?;
        let body_size = decode_body_size(&header);

        let bytes_read = HEADER_SIZE + MAC_SIZE + ceil16(body_size) + MAC_SIZE;
        if data.len() < bytes_read {
            return Err(FrameError::Format("insufficient body length").into());
        }

        let body = self.decrypt_body(&data[HEADER_SIZE + MAC_SIZE..], body_size)?;
        Ok(DecryptedFrame {
            header,
            body,
            bytes_read,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Handshake progress
    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.cipher.is_some() {
            SessionState::Ready
        } else if self.auth_init.is_some() || self.auth_ack.is_some() {
            SessionState::AwaitingPeerMessage
        } else {
            SessionState::Idle
        }
    }

    /// Whether the frame cipher is set up
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.cipher.is_some()
    }

    /// Session role
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether this side dialed the connection
    #[must_use]
    pub fn is_initiator(&self) -> bool {
        self.role == Role::Initiator
    }

    /// Local static public key
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        self.keys.public()
    }

    /// Local ephemeral public key
    #[must_use]
    pub fn ephemeral_public_key(&self) -> &PublicKey {
        self.ephemeral.public()
    }

    /// Remote static public key, once known
    #[must_use]
    pub fn remote_pubkey(&self) -> Option<&PublicKey> {
        self.remote_pubkey.as_ref()
    }

    /// Remote ephemeral public key, once known
    #[must_use]
    pub fn remote_ephemeral_pubkey(&self) -> Option<&PublicKey> {
        self.remote_ephemeral.as_ref()
    }

    /// Initiator nonce, once known
    #[must_use]
    pub fn initiator_nonce(&self) -> Option<&[u8; 32]> {
        self.initiator_nonce.as_ref()
    }

    /// Responder nonce, once known
    #[must_use]
    pub fn responder_nonce(&self) -> Option<&[u8; 32]> {
        self.responder_nonce.as_ref()
    }

    /// Version advertised by the peer (4 for the plain form)
    #[must_use]
    pub fn remote_version(&self) -> Option<u64> {
        self.remote_version
    }

    /// Whether the peer's auth used the EIP-8 form
    #[must_use]
    pub fn got_eip8_auth(&self) -> bool {
        self.got_eip8_auth
    }

    /// Whether the peer's ack used the EIP-8 form
    #[must_use]
    pub fn got_eip8_ack(&self) -> bool {
        self.got_eip8_ack
    }

    /// Derived secrets, once ready
    #[must_use]
    pub fn secrets(&self) -> Option<&SessionSecrets> {
        self.secrets.as_ref()
    }

    /// Frame cipher, once ready
    #[must_use]
    pub fn cipher(&self) -> Option<&SessionCipher> {
        self.cipher.as_ref()
    }

    fn cipher_mut(&mut self) -> Result<&mut SessionCipher, SessionError> {
        self.cipher.as_mut().ok_or(SessionError::NotReady)
    }
}

impl FrameCipher for RlpxSession {
    fn encrypt_frame(&mut self, header: &[u8; HEADER_SIZE], body: &[u8]) -> crate::Result<Vec<u8>> {
        self.cipher_mut()?.encrypt_frame(header, body)
    }

    fn decrypt_header(&mut self, data: &[u8]) -> crate::Result<[u8; HEADER_SIZE]> {
        self.cipher_mut()?.decrypt_header(data)
    }

    fn decrypt_body(&mut self, data: &[u8], body_size: usize) -> crate::Result<Vec<u8>> {
        self.cipher_mut()?.decrypt_body(data, body_size)
    }
}

impl std::fmt::Debug for RlpxSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RlpxSession")
            .field("role", &self.role)
            .field("state", &self.state())
            .field("remote_pubkey", &self.remote_pubkey)
            .field("remote_version", &self.remote_version)
            .finish_non_exhaustive()
    }
}
