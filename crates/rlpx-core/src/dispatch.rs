//! Sub-protocol command registry.
//!
//! Maps `(protocol_id, cmd_id)` pairs to typed handlers and rewrites packet
//! addressing for peers that predate per-frame protocol ids.
//!
//! With [`Addressing::CommandOffset`] every packet travels on protocol 0 and
//! each sub-protocol owns a contiguous command range, in registration order:
//!
//! ```text
//! p2p   (max_cmd_id 15)  -> 0x00..=0x0f
//! eth   (max_cmd_id 16)  -> 0x10..=0x20
//! next  ...              -> 0x21..
//! ```

use crate::error::DispatchError;
use crate::packet::Packet;
use bytes::Bytes;
use std::collections::HashMap;

/// First handshake version that carries the protocol id in frame headers
pub const PROTOCOL_ID_ADDRESSING_VERSION: u64 = 5;

/// A registered sub-protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubProtocol {
    /// Protocol id used in frame headers
    pub id: u16,
    /// Capability name
    pub name: String,
    /// Capability version
    pub version: u64,
    /// Highest command id reserved by this protocol
    pub max_cmd_id: u8,
}

impl SubProtocol {
    /// Describe a sub-protocol.
    pub fn new(id: u16, name: impl Into<String>, version: u64, max_cmd_id: u8) -> Self {
        Self {
            id,
            name: name.into(),
            version,
            max_cmd_id,
        }
    }
}

/// How packets name their sub-protocol on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Addressing {
    /// Protocol id in the frame header, command ids unchanged
    #[default]
    ProtocolId,
    /// Protocol 0 only; command ids shifted into per-protocol ranges
    CommandOffset,
}

impl Addressing {
    /// Addressing mode to use with a peer advertising `version`.
    #[must_use]
    pub fn for_version(version: u64) -> Self {
        if version < PROTOCOL_ID_ADDRESSING_VERSION {
            Self::CommandOffset
        } else {
            Self::ProtocolId
        }
    }
}

/// A typed sub-protocol message.
pub trait Command: Sized {
    /// Command id within its protocol
    const ID: u8;

    /// Serialize the payload.
    fn encode(&self) -> Bytes;

    /// Parse a payload.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Decode`] for a malformed payload.
    fn decode(payload: &[u8]) -> Result<Self, DispatchError>;
}

type Handler = Box<dyn FnMut(&[u8]) -> Result<(), DispatchError> + Send>;

/// Routes inbound packets to registered handlers.
pub struct Dispatcher {
    addressing: Addressing,
    protocols: Vec<SubProtocol>,
    handlers: HashMap<(u16, u8), Handler>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Addressing::default())
    }
}

impl Dispatcher {
    /// Empty registry.
    #[must_use]
    pub fn new(addressing: Addressing) -> Self {
        Self {
            addressing,
            protocols: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Current addressing mode
    #[must_use]
    pub fn addressing(&self) -> Addressing {
        self.addressing
    }

    /// Switch addressing, typically once the peer's version is known.
    pub fn set_addressing(&mut self, addressing: Addressing) {
        self.addressing = addressing;
    }

    /// Registered sub-protocols in registration order
    #[must_use]
    pub fn protocols(&self) -> &[SubProtocol] {
        &self.protocols
    }

    /// Register a sub-protocol. Registration order defines the command
    /// ranges used with [`Addressing::CommandOffset`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::DuplicateProtocol`] for a known id.
    pub fn register_protocol(&mut self, protocol: SubProtocol) -> Result<(), DispatchError> {
        if self.protocols.iter().any(|p| p.id == protocol.id) {
            return Err(DispatchError::DuplicateProtocol(protocol.id));
        }
        tracing::debug!(
            "registered sub-protocol {} v{} as {}",
            protocol.name,
            protocol.version,
            protocol.id
        );
        self.protocols.push(protocol);
        Ok(())
    }

    fn protocol(&self, id: u16) -> Result<&SubProtocol, DispatchError> {
        self.protocols
            .iter()
            .find(|p| p.id == id)
            .ok_or(DispatchError::UnknownProtocol(id))
    }

    /// Install `handler` for command `M` of `protocol_id`, replacing any
    /// previous one.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownProtocol`] for an unregistered protocol
    /// and [`DispatchError::CommandOutOfRange`] if `M::ID` exceeds its
    /// `max_cmd_id`.
    pub fn on<M, F>(&mut self, protocol_id: u16, mut handler: F) -> Result<(), DispatchError>
    where
        M: Command,
        F: FnMut(M) -> Result<(), DispatchError> + Send + 'static,
    {
        let protocol = self.protocol(protocol_id)?;
        if M::ID > protocol.max_cmd_id {
            return Err(DispatchError::CommandOutOfRange {
                protocol_id,
                cmd_id: M::ID,
            });
        }
        self.handlers.insert(
            (protocol_id, M::ID),
            Box::new(move |payload| handler(M::decode(payload)?)),
        );
        Ok(())
    }

    /// Command offset of `protocol_id` under [`Addressing::CommandOffset`].
    fn offset(&self, protocol_id: u16) -> Result<usize, DispatchError> {
        let mut offset = 0usize;
        for protocol in &self.protocols {
            if protocol.id == protocol_id {
                return Ok(offset);
            }
            offset += usize::from(protocol.max_cmd_id) + 1;
        }
        Err(DispatchError::UnknownProtocol(protocol_id))
    }

    /// Build the wire packet for a typed command.
    ///
    /// # Errors
    ///
    /// See [`to_wire`](Self::to_wire).
    pub fn encode<M: Command>(&self, protocol_id: u16, command: &M) -> Result<Packet, DispatchError> {
        self.to_wire(Packet::new(protocol_id, M::ID, command.encode()))
    }

    /// Rewrite a logical packet to wire addressing.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownProtocol`] for an unregistered protocol
    /// and [`DispatchError::CommandOutOfRange`] if the command does not fit
    /// the protocol's range.
    pub fn to_wire(&self, mut packet: Packet) -> Result<Packet, DispatchError> {
        let protocol = self.protocol(packet.protocol_id)?;
        let out_of_range = DispatchError::CommandOutOfRange {
            protocol_id: packet.protocol_id,
            cmd_id: packet.cmd_id,
        };
        if packet.cmd_id > protocol.max_cmd_id {
            return Err(out_of_range);
        }

        if self.addressing == Addressing::CommandOffset {
            let wire_cmd = self.offset(packet.protocol_id)? + usize::from(packet.cmd_id);
            packet.cmd_id = u8::try_from(wire_cmd).map_err(|_| out_of_range)?;
            packet.protocol_id = 0;
        }
        Ok(packet)
    }

    /// Resolve a received packet to its logical `(protocol_id, cmd_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownProtocol`] if no registered protocol
    /// claims the packet and [`DispatchError::CommandOutOfRange`] for a
    /// command beyond the protocol's range.
    pub fn resolve(&self, packet: &Packet) -> Result<(u16, u8), DispatchError> {
        match self.addressing {
            Addressing::ProtocolId => {
                let protocol = self.protocol(packet.protocol_id)?;
                if packet.cmd_id > protocol.max_cmd_id {
                    return Err(DispatchError::CommandOutOfRange {
                        protocol_id: protocol.id,
                        cmd_id: packet.cmd_id,
                    });
                }
                Ok((protocol.id, packet.cmd_id))
            }
            Addressing::CommandOffset => {
                let wire_cmd = usize::from(packet.cmd_id);
                let mut offset = 0usize;
                for protocol in &self.protocols {
                    let end = offset + usize::from(protocol.max_cmd_id);
                    if wire_cmd <= end {
                        // offset <= wire_cmd <= 255 here
                        return Ok((protocol.id, (wire_cmd - offset) as u8));
                    }
                    offset = end + 1;
                }
                Err(DispatchError::CommandOutOfRange {
                    protocol_id: packet.protocol_id,
                    cmd_id: packet.cmd_id,
                })
            }
        }
    }

    /// Decode and deliver a received packet to its handler.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownCommand`] when no handler is
    /// installed, plus resolution and handler errors.
    pub fn dispatch(&mut self, packet: &Packet) -> Result<(), DispatchError> {
        let (protocol_id, cmd_id) = self.resolve(packet)?;
        let handler = self
            .handlers
            .get_mut(&(protocol_id, cmd_id))
            .ok_or(DispatchError::UnknownCommand { protocol_id, cmd_id })?;
        tracing::trace!(
            "dispatching command {} of protocol {} ({} bytes)",
            cmd_id,
            protocol_id,
            packet.len()
        );
        handler(&packet.payload)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("addressing", &self.addressing)
            .field("protocols", &self.protocols)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
