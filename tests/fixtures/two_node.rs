//! Two-node test fixture for integration testing
//!
//! Wires two [`MultiplexedSession`]s back to back in memory:
//! - Handshake establishment
//! - Packet exchange in both directions
//! - Direct access to the raw wire messages for tampering tests
//!
//! # Example
//!
//! ```no_run
//! use rlpx_integration_tests::fixtures::TwoNodeFixture;
//!
//! let mut fixture = TwoNodeFixture::new().unwrap();
//! fixture.establish_session().unwrap();
//! fixture.send_to_responder(rlpx_core::Packet::new(0, 1, b"hi".to_vec())).unwrap();
//! ```

use rlpx_core::{MultiplexedSession, Packet, TransportConfig};
use rlpx_crypto::KeyPair;

/// Hello packet sent by the initiator once the handshake completes
pub fn initiator_hello() -> Packet {
    Packet::new(0, 0, b"hello from initiator".to_vec())
}

/// Hello packet sent by the responder once the handshake completes
pub fn responder_hello() -> Packet {
    Packet::new(0, 0, b"hello from responder".to_vec())
}

/// Initiator/responder pair connected through in-memory queues
pub struct TwoNodeFixture {
    /// Dialing side
    pub initiator: MultiplexedSession,
    /// Listening side
    pub responder: MultiplexedSession,
}

impl TwoNodeFixture {
    /// Create a fixture with default configuration.
    ///
    /// # Errors
    ///
    /// Propagates façade construction failures.
    pub fn new() -> rlpx_core::Result<Self> {
        Self::new_with_config(TransportConfig::default())
    }

    /// Create a fixture with deterministic identities and `config` on both sides.
    ///
    /// # Errors
    ///
    /// Propagates façade construction failures.
    pub fn new_with_config(config: TransportConfig) -> rlpx_core::Result<Self> {
        let initiator_keys = KeyPair::from_seed(b"fixture-initiator")?;
        let responder_keys = KeyPair::from_seed(b"fixture-responder")?;
        let responder_pub = *responder_keys.public();

        let initiator =
            MultiplexedSession::new(initiator_keys, initiator_hello(), Some(responder_pub), config)?;
        let responder = MultiplexedSession::new(responder_keys, responder_hello(), None, config)?;
        Ok(Self {
            initiator,
            responder,
        })
    }

    /// Deliver everything the initiator has queued. Returns the message count.
    ///
    /// # Errors
    ///
    /// Propagates the responder's decode errors.
    pub fn flush_to_responder(&mut self) -> rlpx_core::Result<usize> {
        pump(&self.initiator, &mut self.responder)
    }

    /// Deliver everything the responder has queued. Returns the message count.
    ///
    /// # Errors
    ///
    /// Propagates the initiator's decode errors.
    pub fn flush_to_initiator(&mut self) -> rlpx_core::Result<usize> {
        pump(&self.responder, &mut self.initiator)
    }

    /// Run the handshake and swap hello packets, leaving both inbound
    /// queues empty.
    ///
    /// # Errors
    ///
    /// Propagates handshake failures.
    pub fn establish_session(&mut self) -> rlpx_core::Result<()> {
        self.flush_to_responder()?;
        self.flush_to_initiator()?;
        self.flush_to_responder()?;
        self.drain_initiator_inbound();
        self.drain_responder_inbound();
        Ok(())
    }

    /// Queue `packet` on the initiator and deliver it.
    ///
    /// # Errors
    ///
    /// Propagates send and decode failures.
    pub fn send_to_responder(&mut self, packet: Packet) -> rlpx_core::Result<()> {
        self.initiator.add_packet(packet)?;
        self.flush_to_responder()?;
        Ok(())
    }

    /// Queue `packet` on the responder and deliver it.
    ///
    /// # Errors
    ///
    /// Propagates send and decode failures.
    pub fn send_to_initiator(&mut self, packet: Packet) -> rlpx_core::Result<()> {
        self.responder.add_packet(packet)?;
        self.flush_to_initiator()?;
        Ok(())
    }

    /// Register `id` on both sides.
    ///
    /// # Errors
    ///
    /// Returns a duplicate-protocol error if either side knows `id`.
    pub fn add_protocol(&mut self, id: u16) -> rlpx_core::Result<()> {
        self.initiator.add_protocol(id)?;
        self.responder.add_protocol(id)
    }

    /// Packets the initiator has received so far
    pub fn drain_initiator_inbound(&self) -> Vec<Packet> {
        drain(&self.initiator)
    }

    /// Packets the responder has received so far
    pub fn drain_responder_inbound(&self) -> Vec<Packet> {
        drain(&self.responder)
    }
}

fn pump(from: &MultiplexedSession, to: &mut MultiplexedSession) -> rlpx_core::Result<usize> {
    let queue = from.outbound_queue();
    let mut count = 0;
    while let Some(msg) = queue.try_deq()? {
        to.add_message(&msg)?;
        count += 1;
    }
    Ok(count)
}

fn drain(session: &MultiplexedSession) -> Vec<Packet> {
    let queue = session.inbound_queue();
    let mut packets = Vec::new();
    while let Ok(Some(packet)) = queue.try_deq() {
        packets.push(packet);
    }
    packets
}
