//! Configuration file for the `rlpx` CLI.

use rlpx_core::TransportConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Per-connection transport settings
    pub transport: TransportConfig,
    /// Node identity
    pub node: NodeConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Node identity configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    /// Seed for a deterministic identity; a random key is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_seed: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.transport.validate()?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        if self.node.identity_seed.as_deref() == Some("") {
            anyhow::bail!("identity_seed must not be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport.multiplexer.max_window_size, 8192);
        assert_eq!(config.transport.handshake.version, 4);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [transport.multiplexer]
            max_window_size = 4096

            [transport.handshake]
            eip8_auth = true
            "#,
        )
        .unwrap();
        assert_eq!(config.transport.multiplexer.max_window_size, 4096);
        assert_eq!(config.transport.multiplexer.max_priority_frame_size, 1024);
        assert!(config.transport.handshake.eip8_auth);
        assert_eq!(config.transport.handshake.version, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.transport.multiplexer.max_window_size = 1000;
        assert!(config.validate().is_err());

        config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.node.identity_seed = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let mut config = Config::default();
        config.node.identity_seed = Some("node-1".to_string());
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.transport, deserialized.transport);
        assert_eq!(deserialized.node.identity_seed.as_deref(), Some("node-1"));
    }
}
