//! Packets exchanged between sub-protocols.

use bytes::Bytes;

/// One logical message of a sub-protocol.
///
/// Equality only considers `(protocol_id, cmd_id, payload)`; the priority
/// hint and reassembly bookkeeping are transport concerns.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Sub-protocol id
    pub protocol_id: u16,

    /// Command id within the sub-protocol
    pub cmd_id: u8,

    /// Opaque command payload
    pub payload: Bytes,

    /// Request delivery ahead of normal traffic
    pub prioritize: bool,

    /// Declared payload size while chunks are still being reassembled
    pub total_payload_size: Option<usize>,
}

impl Packet {
    /// Create a normal-priority packet.
    pub fn new(protocol_id: u16, cmd_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            protocol_id,
            cmd_id,
            payload: payload.into(),
            prioritize: false,
            total_payload_size: None,
        }
    }

    /// Create a prioritized packet.
    pub fn priority(protocol_id: u16, cmd_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            prioritize: true,
            ..Self::new(protocol_id, cmd_id, payload)
        }
    }

    /// Payload length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.protocol_id == other.protocol_id
            && self.cmd_id == other.cmd_id
            && self.payload == other.payload
    }
}

impl Eq for Packet {}

impl std::fmt::Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Packet(protocol_id={} cmd_id={} payload_size={} prioritize={})",
            self.protocol_id,
            self.cmd_id,
            self.payload.len(),
            self.prioritize
        )
    }
}
