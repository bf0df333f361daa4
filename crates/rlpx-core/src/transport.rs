//! Per-connection transport façade.
//!
//! [`MultiplexedSession`] owns one [`RlpxSession`] bound to one
//! [`Multiplexer`] and exposes two boundary queues: encoded wire messages
//! for the I/O driver to write, and decoded packets for the application.
//! Inbound bytes go through [`MultiplexedSession::add_message`], which runs
//! the handshake until the cipher is ready and frame decoding afterwards.
//!
//! ```text
//!   add_packet ──► Multiplexer ──► frames ──► outbound queue ──► socket
//!   socket ──► add_message ──► handshake | Multiplexer::decode ──► inbound queue
//! ```

use crate::config::{MultiplexerConfig, TransportConfig};
use crate::error::{SessionError, TransportError};
use crate::multiplexer::Multiplexer;
use crate::packet::Packet;
use crate::queue::SyncQueue;
use crate::session::{RlpxSession, Role};
use rlpx_crypto::{KeyPair, PublicKey};
use std::sync::Arc;
use tracing::{debug, info};

/// Handshake-driving, packet-multiplexing connection endpoint.
#[derive(Debug)]
pub struct MultiplexedSession {
    mux: Multiplexer<RlpxSession>,
    hello: Packet,
    outbound: Arc<SyncQueue<Vec<u8>>>,
    inbound: Arc<SyncQueue<Packet>>,
    handshake_finished: bool,
}

impl MultiplexedSession {
    /// Create a connection endpoint.
    ///
    /// With `remote_pubkey` this side is the initiator and its auth message
    /// is queued for sending immediately; without it this side waits for
    /// the peer's auth. `hello` is sent as soon as the handshake completes;
    /// its protocol is registered here.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`](crate::ConfigError) for invalid limits and
    /// session errors if the auth message cannot be built.
    pub fn new(
        keys: KeyPair,
        hello: Packet,
        remote_pubkey: Option<PublicKey>,
        config: TransportConfig,
    ) -> crate::Result<Self> {
        config.validate()?;
        let role = if remote_pubkey.is_some() {
            Role::Initiator
        } else {
            Role::Responder
        };
        let session = RlpxSession::new(keys, role, config.handshake)?;
        Self::from_session(session, hello, remote_pubkey, config.multiplexer)
    }

    /// Create an endpoint around an existing, fresh session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingHandshakeValue`] for an initiator
    /// session without `remote_pubkey`, plus the errors of
    /// [`new`](Self::new).
    pub fn from_session(
        session: RlpxSession,
        hello: Packet,
        remote_pubkey: Option<PublicKey>,
        config: MultiplexerConfig,
    ) -> crate::Result<Self> {
        config.validate()?;
        let mut mux = Multiplexer::with_cipher(config, session);
        mux.add_protocol(hello.protocol_id)?;

        let mut this = Self {
            mux,
            hello,
            outbound: Arc::new(SyncQueue::new()),
            inbound: Arc::new(SyncQueue::new()),
            handshake_finished: false,
        };

        if this.is_initiator() {
            let remote = remote_pubkey.ok_or(SessionError::MissingHandshakeValue("remote_pubkey"))?;
            this.send_init_msg(&remote)?;
        }
        Ok(this)
    }

    fn send_init_msg(&mut self, remote: &PublicKey) -> crate::Result<()> {
        let session = self.mux.cipher_mut();
        let auth = session.create_auth_message(remote, None)?;
        let auth_ct = session.encrypt_auth_message(&auth)?;
        debug!("queueing auth message ({} bytes)", auth_ct.len());
        self.outbound.enq(auth_ct)?;
        Ok(())
    }

    /// Register an additional sub-protocol.
    ///
    /// # Errors
    ///
    /// Returns [`MultiplexerError::DuplicateProtocol`](crate::MultiplexerError::DuplicateProtocol)
    /// for a known id (including the hello protocol).
    pub fn add_protocol(&mut self, id: u16) -> crate::Result<()> {
        Ok(self.mux.add_protocol(id)?)
    }

    /// Feed bytes received from the peer.
    ///
    /// During the handshake the bytes must start with the peer's auth (on a
    /// responder) or ack (on an initiator); anything after it is decoded as
    /// frames. Decoded packets land in the inbound queue.
    ///
    /// # Errors
    ///
    /// Every error is fatal to the connection: handshake failures,
    /// authentication failures and malformed frames alike.
    pub fn add_message(&mut self, msg: &[u8]) -> crate::Result<()> {
        if self.handshake_finished {
            self.add_message_post_handshake(msg)
        } else {
            self.add_message_during_handshake(msg)
        }
    }

    /// Frame `packet` and queue the resulting wire messages, one per frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotReady`] before the handshake completes,
    /// plus multiplexer and cipher errors.
    pub fn add_packet(&mut self, packet: Packet) -> crate::Result<()> {
        if !self.is_ready() {
            return Err(TransportError::NotReady.into());
        }

        self.mux.add_packet(packet)?;
        for frame in self.mux.pop_all_frames() {
            let bytes = self.mux.encode_frame(&frame)?;
            self.outbound.enq(bytes)?;
        }
        Ok(())
    }

    fn add_message_during_handshake(&mut self, msg: &[u8]) -> crate::Result<()> {
        if self.is_ready() {
            return Err(TransportError::HandshakeAfterReady.into());
        }

        let session = self.mux.cipher_mut();
        let rest = if session.is_initiator() {
            let rest = session.decode_auth_ack_message(msg)?;
            session.setup_cipher()?;
            rest
        } else {
            let rest = session.decode_authentication(msg)?;
            let ack = session.create_auth_ack_message(None)?;
            let ack_ct = session.encrypt_auth_ack_message(&ack)?;
            debug!("queueing ack message ({} bytes)", ack_ct.len());
            self.outbound.enq(ack_ct)?;
            session.setup_cipher()?;
            rest
        };

        if !rest.is_empty() {
            self.add_message_post_handshake(rest)?;
        }

        self.handshake_finished = true;
        info!(
            "handshake finished as {:?} (remote version {:?})",
            self.mux.cipher().role(),
            self.mux.cipher().remote_version()
        );

        let hello = self.hello.clone();
        self.add_packet(hello)
    }

    fn add_message_post_handshake(&mut self, msg: &[u8]) -> crate::Result<()> {
        for packet in self.mux.decode(msg)? {
            self.inbound.enq(packet)?;
        }
        Ok(())
    }

    /// Whether the frame cipher is set up
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.mux.cipher().is_ready()
    }

    /// Whether the handshake message exchange has completed
    #[must_use]
    pub fn handshake_finished(&self) -> bool {
        self.handshake_finished
    }

    /// Whether this side dialed the connection
    #[must_use]
    pub fn is_initiator(&self) -> bool {
        self.mux.cipher().is_initiator()
    }

    /// Peer's static public key; known up front on the initiator and after
    /// the auth on the responder.
    #[must_use]
    pub fn remote_pubkey(&self) -> Option<&PublicKey> {
        self.mux.cipher().remote_pubkey()
    }

    /// Underlying handshake session
    #[must_use]
    pub fn session(&self) -> &RlpxSession {
        self.mux.cipher()
    }

    /// Underlying multiplexer
    #[must_use]
    pub fn multiplexer(&self) -> &Multiplexer<RlpxSession> {
        &self.mux
    }

    /// Queue of encoded wire messages, in send order
    #[must_use]
    pub fn outbound_queue(&self) -> Arc<SyncQueue<Vec<u8>>> {
        Arc::clone(&self.outbound)
    }

    /// Queue of decoded packets, in arrival order
    #[must_use]
    pub fn inbound_queue(&self) -> Arc<SyncQueue<Packet>> {
        Arc::clone(&self.inbound)
    }

    /// Close both queues, waking any blocked reader.
    pub fn close(&self) {
        self.outbound.close();
        self.inbound.close();
    }
}
