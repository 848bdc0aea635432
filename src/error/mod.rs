//! Error types for the realtime bridge.

use thiserror::Error;

/// Primary error type for all bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Transport open failed: {0}")]
    TransportOpen(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl BridgeError {
    /// Whether the failure happened before any transport was established
    /// and is fixable by the operator (credential or configuration).
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential(_) | Self::Configuration(_) | Self::Authentication(_)
        )
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BridgeError>;
