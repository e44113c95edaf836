//! Haplane Error Types

use thiserror::Error;

/// Result type alias for haplane operations
pub type Result<T> = std::result::Result<T, Error>;

/// Haplane error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Cluster state errors
    #[error("Cluster state not initialized")]
    NotInitialized,

    #[error("Invalid role for operator override: {0}")]
    InvalidRole(String),

    #[error("Invalid chassis serial: {0}")]
    InvalidSerial(String),

    #[error("Heartbeat from foreign cluster: expected id {expected}, got {got}")]
    ClusterMismatch { expected: u32, got: u32 },

    // Wire errors
    #[error("Malformed heartbeat frame: {0}")]
    MalformedFrame(String),

    #[error("Heartbeat frame checksum mismatch")]
    ChecksumMismatch,

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Datapath errors
    #[error("Datapath operation failed: {0}")]
    Datapath(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is a fatal precondition violation
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::NotInitialized)
    }

    /// Check if this error came from decoding a heartbeat off the wire
    pub fn is_wire(&self) -> bool {
        matches!(self, Error::MalformedFrame(_) | Error::ChecksumMismatch)
    }
}
