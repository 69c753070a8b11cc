//! Leasehold license validation.
//!
//! A [`LicenseValidator`] checks that a signed XML license is authentic and
//! current, then keeps checking it:
//!
//! - **Signature**: licenses carry an enveloped Ed25519 XML signature
//!   verified against the vendor's [`PublicKey`].
//! - **Leases**: floating licenses are leased from a license server and
//!   subscriptions re-leased before they run out, through host-supplied
//!   [`FloatingLeaseProvider`] and [`SubscriptionLeaseProvider`] impls.
//! - **Clock**: after each successful check the expiration is cross-checked
//!   against network time.
//! - **Duplicates**: presence is announced on the LAN and the same license
//!   seen elsewhere invalidates the local one.
//!
//! [`LicenseGenerator`] is the issuing counterpart.

mod config;
mod document;
mod error;
mod generator;
mod host;
mod lease;
pub mod network_time;
mod signature;
mod source;
mod validator;
mod xml;

pub use config::{DEFAULT_LEASE_REQUEST_TIMEOUT, DEFAULT_LEASE_TIMEOUT, ValidatorConfig};
pub use document::{
    FLOATING_LICENSE_ELEMENT, LICENSE_ELEMENT, LicenseDocument, LicenseType, RESERVED_ATTRIBUTES,
    format_expiration, parse_expiration,
};
pub use error::{LicenseError, LicenseResult};
pub use generator::LicenseGenerator;
pub use host::HostIdentity;
pub use lease::{FloatingLeaseProvider, LeaseError, SubscriptionLeaseProvider};
pub use network_time::{NetworkTime, NetworkTimeChecker, NetworkTimeConfig};
pub use signature::{PublicKey, is_well_formed, verify};
pub use source::{ContentSource, FileSource, StringSource};
pub use validator::{InvalidationReason, LicenseValidator, LicenseValidatorBuilder};

pub use leasehold_discovery::{Announcement, DiscoveryConfig, MultipleLicenseUsage, Verdict};
