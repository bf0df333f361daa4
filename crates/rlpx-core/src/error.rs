//! Error types for the RLPx core.
//!
//! Every error here is fatal to the connection it was raised on. Nothing is
//! retried or resynchronized internally; the owner of the connection is
//! expected to tear it down.

use thiserror::Error;

/// Core protocol errors
#[derive(Debug, Error)]
pub enum Error {
    /// Frame encoding error
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Session / handshake error
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Multiplexer bookkeeping error
    #[error("multiplexer error: {0}")]
    Multiplexer(#[from] MultiplexerError),

    /// Transport state-machine misuse
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration rejected by validation
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Command registry / dispatch error
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Cryptographic error
    #[error("crypto error: {0}")]
    Crypto(#[from] rlpx_crypto::CryptoError),
}

/// Frame-level errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Frame would not fit the window it was created for
    #[error("frame size {size} exceeds window {window}")]
    FrameTooLarge {
        /// Frame size on the wire
        size: usize,
        /// Window size
        window: usize,
    },

    /// Body size does not fit the 3-byte header field
    #[error("body size {0} exceeds 24-bit limit")]
    BodyTooLarge(usize),

    /// Window size is not a usable multiple of the padding unit
    #[error("invalid window size: {0}")]
    InvalidWindowSize(usize),

    /// Header is malformed
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    /// Not enough bytes for the declared frame layout
    #[error("format error: {0}")]
    Format(&'static str),

    /// Priority packet did not fit a single small frame
    #[error("invalid priority packet: {0}")]
    PriorityFrame(&'static str),

    /// Packet payload exceeds the configured maximum
    #[error("payload of {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge {
        /// Payload size
        size: usize,
        /// Configured maximum
        limit: usize,
    },
}

/// Session-level errors (handshake and frame cipher)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Frame cipher used before the handshake completed
    #[error("session not ready")]
    NotReady,

    /// Operation reserved for the other side of the handshake
    #[error("operation requires {0} role")]
    WrongRole(&'static str),

    /// `setup_cipher` called before a handshake value was known
    #[error("missing handshake value: {0}")]
    MissingHandshakeValue(&'static str),

    /// Handshake message decrypted but its contents are malformed
    #[error("invalid handshake message: {0}")]
    InvalidMessage(&'static str),

    /// Frame MAC or handshake authentication failed
    #[error("authentication failed: {0}")]
    Authentication(&'static str),

    /// Cryptographic primitive failure during the handshake
    #[error("crypto error: {0}")]
    Crypto(#[from] rlpx_crypto::CryptoError),
}

/// Multiplexer bookkeeping errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MultiplexerError {
    /// Frame or packet for a protocol id that was never registered
    #[error("unknown protocol id {0}")]
    UnknownProtocol(u16),

    /// `add_protocol` called twice for the same id
    #[error("protocol {0} already added")]
    DuplicateProtocol(u16),

    /// Chunked-0 frame for a sequence that is already being reassembled
    #[error("chunked-0 frame for open sequence {sequence_id} of protocol {protocol_id}")]
    DuplicateChunk {
        /// Protocol id
        protocol_id: u16,
        /// Sequence id
        sequence_id: u16,
    },

    /// More chunk data than the declared total
    #[error("too much data for chunk buffer {sequence_id} of protocol {protocol_id}")]
    ChunkOverflow {
        /// Protocol id
        protocol_id: u16,
        /// Sequence id
        sequence_id: u16,
    },

    /// Decrypted header could not be parsed
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    /// Decrypted body could not be parsed
    #[error("invalid body: {0}")]
    InvalidBody(&'static str),

    /// Too many chunked packets reassembling at once on one protocol
    #[error("protocol {protocol_id} has more than {limit} chunked packets in flight")]
    TooManyChunkBuffers {
        /// Protocol id
        protocol_id: u16,
        /// Open buffer limit
        limit: usize,
    },

    /// Declared reassembly size exceeds the configured maximum
    #[error("declared payload of {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge {
        /// Declared size
        size: usize,
        /// Configured maximum
        limit: usize,
    },
}

/// Transport façade errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Packet submitted before the handshake finished
    #[error("handshake not finished")]
    NotReady,

    /// Handshake processing requested after the session became ready
    #[error("handshake already finished")]
    HandshakeAfterReady,

    /// Queue was closed
    #[error("queue closed")]
    Closed,
}

/// Command dispatch errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No sub-protocol registered under this id
    #[error("unknown sub-protocol {0}")]
    UnknownProtocol(u16),

    /// Sub-protocol id registered twice
    #[error("sub-protocol {0} already registered")]
    DuplicateProtocol(u16),

    /// No handler for a command
    #[error("no handler for command {cmd_id} of protocol {protocol_id}")]
    UnknownCommand {
        /// Protocol id
        protocol_id: u16,
        /// Command id
        cmd_id: u8,
    },

    /// Command id outside the protocol's reserved range
    #[error("command {cmd_id} out of range for protocol {protocol_id}")]
    CommandOutOfRange {
        /// Protocol id
        protocol_id: u16,
        /// Command id
        cmd_id: u8,
    },

    /// Payload could not be decoded into the command type
    #[error("invalid command payload: {0}")]
    Decode(&'static str),
}

/// Configuration validation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value is out of its permitted range
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Constraint that failed
        reason: &'static str,
    },
}

/// Result alias for core operations
pub type Result<T> = std::result::Result<T, Error>;
