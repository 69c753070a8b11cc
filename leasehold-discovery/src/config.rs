//! Discovery channel configuration.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Default administratively-scoped multicast group for announcements.
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 43, 91);

/// Default UDP port for announcements.
pub const DEFAULT_PORT: u16 = 12391;

/// Configuration for the discovery host and client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Whether duplicate-use detection runs at all.
    pub enabled: bool,
    /// Multicast group announcements are sent to.
    pub multicast_group: Ipv4Addr,
    /// UDP port announcements are sent to and received on.
    pub port: u16,
    /// Local interface used to join the group (`0.0.0.0` lets the OS pick).
    pub interface: Ipv4Addr,
    /// Multicast TTL; 1 keeps announcements on the local segment.
    pub multicast_ttl: u32,
    /// Deliver our own datagrams back to listeners on this host.
    /// Needed so two processes on one machine see each other.
    pub multicast_loop: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            multicast_group: DEFAULT_MULTICAST_GROUP,
            port: DEFAULT_PORT,
            interface: Ipv4Addr::UNSPECIFIED,
            multicast_ttl: 1,
            multicast_loop: true,
        }
    }
}

impl DiscoveryConfig {
    /// Returns the destination address for published announcements.
    #[must_use]
    pub fn target(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.multicast_group, self.port))
    }
}
