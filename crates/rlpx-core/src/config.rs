//! Transport configuration.
//!
//! Plain immutable structs with constant defaults. All of them deserialize
//! with per-field defaults, so a partial TOML/JSON document is valid.

use crate::error::ConfigError;
use crate::{MAC_SIZE, HEADER_SIZE, PADDING};
use serde::{Deserialize, Serialize};

/// Default total window shared by all active protocols
pub const DEFAULT_MAX_WINDOW_SIZE: usize = 8 * 1024;

/// Default size limit for a prioritized frame
pub const DEFAULT_MAX_PRIORITY_FRAME_SIZE: usize = 1024;

/// Default maximum packet payload
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Handshake version advertised by this implementation
pub const SUPPORTED_RLPX_VERSION: u64 = 4;

/// Smallest window that still leaves room for payload in a chunk
pub const MIN_WINDOW_SIZE: usize = HEADER_SIZE + MAC_SIZE + PADDING + MAC_SIZE;

/// Multiplexer limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplexerConfig {
    /// Bytes per scheduling round, divided among active protocols
    pub max_window_size: usize,

    /// Largest frame accepted for a prioritized packet
    pub max_priority_frame_size: usize,

    /// Largest packet payload accepted on send and on reassembly
    pub max_payload_size: usize,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            max_window_size: DEFAULT_MAX_WINDOW_SIZE,
            max_priority_frame_size: DEFAULT_MAX_PRIORITY_FRAME_SIZE,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl MultiplexerConfig {
    /// Check the limits for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a window that is not a multiple of
    /// the padding unit or too small to carry payload, a priority limit
    /// larger than the window, or a zero payload limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_window_size % PADDING != 0 {
            return Err(ConfigError::Invalid {
                field: "max_window_size",
                reason: "must be a multiple of 16",
            });
        }
        if self.max_window_size < MIN_WINDOW_SIZE {
            return Err(ConfigError::Invalid {
                field: "max_window_size",
                reason: "must be at least 64",
            });
        }
        if self.max_priority_frame_size > self.max_window_size {
            return Err(ConfigError::Invalid {
                field: "max_priority_frame_size",
                reason: "must not exceed max_window_size",
            });
        }
        if self.max_payload_size == 0 {
            return Err(ConfigError::Invalid {
                field: "max_payload_size",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

/// Handshake options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Initiator sends the variable-length (EIP-8) auth form
    pub eip8_auth: bool,

    /// Version advertised in variable-length messages
    pub version: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            eip8_auth: false,
            version: SUPPORTED_RLPX_VERSION,
        }
    }
}

/// Per-connection transport configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Multiplexer limits
    pub multiplexer: MultiplexerConfig,

    /// Handshake options
    pub handshake: HandshakeConfig,
}

impl TransportConfig {
    /// Validate all nested sections.
    ///
    /// # Errors
    ///
    /// Propagates [`MultiplexerConfig::validate`] failures.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.multiplexer.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.multiplexer.max_window_size, 8192);
        assert_eq!(config.multiplexer.max_priority_frame_size, 1024);
        assert_eq!(config.multiplexer.max_payload_size, 10 * 1024 * 1024);
        assert!(!config.handshake.eip8_auth);
        assert_eq!(config.handshake.version, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unaligned_window() {
        let config = MultiplexerConfig {
            max_window_size: 1000,
            max_priority_frame_size: 512,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "max_window_size",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_tiny_window() {
        let config = MultiplexerConfig {
            max_window_size: 48,
            max_priority_frame_size: 48,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_priority_above_window() {
        let config = MultiplexerConfig {
            max_window_size: 512,
            max_priority_frame_size: 1024,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TransportConfig =
            serde_json::from_str(r#"{"multiplexer": {"max_window_size": 4096}}"#).unwrap();
        assert_eq!(config.multiplexer.max_window_size, 4096);
        assert_eq!(config.multiplexer.max_priority_frame_size, 1024);
        assert_eq!(config.handshake, HandshakeConfig::default());
    }
}
