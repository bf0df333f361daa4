//! # RLPx Core
//!
//! The encrypted, multiplexed transport of the devp2p stack.
//!
//! This crate provides:
//! - Frame encoding and decoding, including chunked frames
//! - The ECIES handshake (legacy and EIP-8 message formats)
//! - Frame cipher and MAC state derived from the handshake
//! - A windowed, priority-aware sub-protocol multiplexer
//! - A queue-based transport façade tying the above together
//! - Command registry and dispatch for sub-protocols
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MultiplexedSession                          │
//! │   (handshake driver, inbound/outbound queues)                   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Multiplexer                              │
//! │   (per-protocol queues, chunking, reassembly, scheduling)       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         RlpxSession                              │
//! │   (auth/ack exchange, AES-CTR + Keccak MAC frame cipher)        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No sockets are involved: bytes leave through
//! [`MultiplexedSession::outbound_queue`] and arrive through
//! [`MultiplexedSession::add_message`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod cipher;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod multiplexer;
pub mod packet;
pub mod queue;
pub mod session;
pub mod transport;

pub use cipher::{FrameCipher, PlainFrameCipher, SessionCipher, SessionSecrets};
pub use config::{HandshakeConfig, MultiplexerConfig, TransportConfig};
pub use dispatch::{Addressing, Command, Dispatcher, SubProtocol};
pub use error::{
    ConfigError, DispatchError, Error, FrameError, MultiplexerError, Result, SessionError,
    TransportError,
};
pub use frame::{Frame, FrameType};
pub use handshake::{AckMessage, AuthMessage, MessageFormat};
pub use multiplexer::Multiplexer;
pub use packet::Packet;
pub use queue::SyncQueue;
pub use session::{DecryptedFrame, Role, RlpxSession, SessionState};
pub use transport::MultiplexedSession;

/// Frame header size in bytes
pub const HEADER_SIZE: usize = 16;

/// Truncated MAC size in bytes
pub const MAC_SIZE: usize = 16;

/// Padding unit for frame bodies
pub const PADDING: usize = 16;
