//! Error types for the transport poller
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for transport operations
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Event service error: {0}")]
    Service(String),

    #[error("Event service unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Check if the next poll cycle may succeed where this one failed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransportError::Service(_)
                | TransportError::Unavailable(_)
                | TransportError::Io(_)
        )
    }
}
