//! Error types for the licensing module.
//!
//! Only configuration and integrity problems surface as errors. Content
//! quality problems (malformed XML, bad signature, missing fields) are
//! absorbed by the validation pipeline and reported as "no valid license".

use chrono::{DateTime, Utc};
use leasehold_discovery::DiscoveryError;
use thiserror::Error;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// No usable license content after the full validation pipeline.
    #[error("no valid license found")]
    LicenseNotFound,

    /// The configured license source does not exist.
    #[error("license file not found: {0}")]
    LicenseFileNotFound(String),

    /// License has expired and nobody is listening for expiration.
    #[error("license expired on {0}")]
    Expired(DateTime<Utc>),

    /// The floating lease provider failed or returned an unverifiable license.
    #[error("floating license unavailable: {0}")]
    FloatingLicenseUnavailable(String),

    /// Public key material could not be decoded.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Input to the license generator cannot be expressed as a license.
    #[error("invalid license format: {0}")]
    InvalidLicenseFormat(String),

    /// A license was invalidated but no invalidation listener is registered.
    #[error("license invalidated, but no invalidation listener is registered")]
    NoInvalidationListener,

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Discovery channel error.
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
