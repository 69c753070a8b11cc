//! LAN presence discovery for Leasehold.
//!
//! Detects two or more processes asserting the same license id on one
//! network segment:
//!
//! - **Host**: a background listener on a well-known multicast group that
//!   hands decoded [`Announcement`]s to its owner over a channel.
//! - **Client**: publishes an [`Announcement`] on demand (each successful
//!   validation and each scheduled re-validation).
//! - **Policy**: [`assess`] decides whether a received announcement is a
//!   duplicate use of the local license.
//!
//! The wire format is one JSON envelope per UDP datagram; see [`codec`].

mod announcement;
mod client;
pub mod codec;
mod config;
mod error;
mod host;
mod policy;

pub use announcement::{Announcement, Presence};
pub use client::DiscoveryClient;
pub use config::{DEFAULT_MULTICAST_GROUP, DEFAULT_PORT, DiscoveryConfig};
pub use error::{DiscoveryError, DiscoveryResult};
pub use host::DiscoveryHost;
pub use policy::{LocalIdentity, MultipleLicenseUsage, Verdict, assess};
