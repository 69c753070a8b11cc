//! Validator configuration.

use crate::host::HostIdentity;
use crate::network_time::NetworkTimeConfig;
use leasehold_discovery::{DiscoveryConfig, MultipleLicenseUsage};
use std::time::Duration;
use uuid::Uuid;

/// Default interval between automatic re-validations.
pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default bound on a single lease provider call.
pub const DEFAULT_LEASE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a [`LicenseValidator`](crate::LicenseValidator).
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Interval between automatic re-validations.
    pub lease_timeout: Duration,
    /// Whether floating-license markers are honoured.
    pub floating_licenses_enabled: bool,
    /// Client id sent with floating lease requests.
    pub floating_client_id: Uuid,
    /// Bound on a single lease provider call.
    pub lease_request_timeout: Duration,
    /// Network time cross-check.
    pub network_time: NetworkTimeConfig,
    /// Duplicate-use detection on the LAN.
    pub discovery: DiscoveryConfig,
    /// How to treat the same license asserted by another process.
    pub multiple_license_usage: MultipleLicenseUsage,
    /// Machine and user names reported to lease servers and peers.
    pub host: HostIdentity,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
            floating_licenses_enabled: true,
            floating_client_id: Uuid::new_v4(),
            lease_request_timeout: DEFAULT_LEASE_REQUEST_TIMEOUT,
            network_time: NetworkTimeConfig::default(),
            discovery: DiscoveryConfig::default(),
            multiple_license_usage: MultipleLicenseUsage::Deny,
            host: HostIdentity::collect(),
        }
    }
}
