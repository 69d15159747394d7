//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - `XSTREAM_*` environment variables

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Negotiation configuration.
    #[serde(default)]
    pub negotiation: NegotiationConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| StreamError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| StreamError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(domain) = std::env::var("XSTREAM_DOMAIN") {
            config.connection.domain = domain;
        }
        if let Ok(resource) = std::env::var("XSTREAM_RESOURCE") {
            config.connection.resource = Some(resource);
        }
        if let Ok(method) = std::env::var("XSTREAM_COMPRESSION_METHOD") {
            config.connection.compression_method = method;
        }
        if let Ok(val) = std::env::var("XSTREAM_REQUIRE_ENCRYPTION") {
            if let Ok(val) = val.parse() {
                config.negotiation.require_encryption = val;
            }
        }

        config
    }
}

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Remote service domain.
    pub domain: String,

    /// Preferred resource identifier; the server may assign another.
    pub resource: Option<String>,

    /// Compression method offered during negotiation.
    pub compression_method: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            resource: None,
            compression_method: "zlib".to_string(),
        }
    }
}

/// Negotiation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Refuse streams whose endpoint never offers the encryption upgrade.
    pub require_encryption: bool,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            require_encryption: true,
        }
    }
}
