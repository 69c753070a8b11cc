//! Error types for the discovery layer.

use thiserror::Error;

/// Result type for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Errors that can occur while announcing or listening.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Socket setup or I/O failure.
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),

    /// Datagram failed envelope validation (magic, version, size).
    #[error("codec error: {0}")]
    Codec(String),

    /// Announcement JSON could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
