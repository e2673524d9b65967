//! Error types for tandem
//!
//! Provides a unified error type used across all tandem crates.

use std::path::PathBuf;

/// Main error type for tandem operations
#[derive(Debug, thiserror::Error)]
pub enum TandemError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Connection Errors ===

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Server not running at {path}")]
    ServerNotRunning { path: PathBuf },

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Connection failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    // === Session Errors ===

    #[error("Room {room_id} is full")]
    RoomFull { room_id: String },

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TandemError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::ConnectionClosed)
    }
}

/// Result type alias using TandemError
pub type Result<T> = std::result::Result<T, TandemError>;
