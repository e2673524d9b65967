//! Client configuration
//!
//! The client reads the `[client]` table of the shared config file at
//! `$XDG_CONFIG_HOME/tandem/config.toml`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tandem_utils::{config_file, socket_path, Result, TandemError};

use crate::transport::TransportConfig;

/// Client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address (unix://path or tcp://host:port); defaults to the
    /// XDG runtime socket
    pub connect_addr: Option<String>,
    /// Minimum spacing between transform emissions
    pub transform_interval_ms: u64,
    /// Attempt budget for one connect() call
    pub retry_attempts: u32,
    /// Fixed delay between attempts
    pub retry_delay_ms: u64,
    /// Event broadcast channel capacity
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_addr: None,
            transform_interval_ms: 50,
            retry_attempts: 5,
            retry_delay_ms: 1000,
            event_capacity: 256,
        }
    }
}

/// Shape of the shared config file; only the client table is read here
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    client: ClientConfig,
}

impl ClientConfig {
    /// Load from the default location; a missing file yields defaults
    pub fn load() -> Result<Self> {
        let path = config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TandemError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse from string
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| TandemError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(file.client)
    }

    /// Validate ranges
    pub fn validate(&self) -> Result<()> {
        if self.transform_interval_ms < 8 {
            return Err(TandemError::config(
                "transform_interval_ms must be at least 8 (120Hz max)",
            ));
        }
        if self.retry_attempts == 0 {
            return Err(TandemError::config("retry_attempts must be at least 1"));
        }
        if self.event_capacity < 16 {
            return Err(TandemError::config("event_capacity must be at least 16"));
        }
        Ok(())
    }

    /// Build the transport tunables
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            connect_addr: self
                .connect_addr
                .clone()
                .unwrap_or_else(|| format!("unix://{}", socket_path().to_string_lossy())),
            max_attempts: self.retry_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            transform_interval: Duration::from_millis(self.transform_interval_ms),
            event_capacity: self.event_capacity,
        }
    }
}
