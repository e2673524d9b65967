//! Server configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use tandem_protocol::ROOM_CAPACITY;
use tandem_utils::{config_file, Result, TandemError};

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
}

/// Relay server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Unix socket path override (defaults to the XDG runtime socket)
    pub socket_path: Option<String>,
    /// Optional TCP listen address, e.g. "0.0.0.0:7140"
    pub tcp_listen: Option<String>,
    /// Maximum participants per room
    pub room_capacity: usize,
    /// Outbound message queue length per connection
    pub outbound_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            tcp_listen: None,
            room_capacity: ROOM_CAPACITY,
            outbound_buffer: 64,
        }
    }
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the default location
    pub fn load() -> Result<AppConfig> {
        let path = config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(AppConfig::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<AppConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| TandemError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration from string
    pub fn parse(content: &str, path: &Path) -> Result<AppConfig> {
        toml::from_str(content).map_err(|e| TandemError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate configuration
    pub fn validate(config: &AppConfig) -> Result<()> {
        if config.server.room_capacity == 0 || config.server.room_capacity > 16 {
            return Err(TandemError::config(
                "room_capacity must be between 1 and 16",
            ));
        }

        if config.server.outbound_buffer < 8 {
            return Err(TandemError::config("outbound_buffer must be at least 8"));
        }

        Ok(())
    }

    /// Load and validate
    pub fn load_and_validate() -> Result<AppConfig> {
        let config = Self::load()?;
        Self::validate(&config)?;
        Ok(config)
    }
}
