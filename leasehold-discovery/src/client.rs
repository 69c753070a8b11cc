//! Discovery client: publishes this process's presence.

use crate::announcement::{Announcement, Presence};
use crate::codec;
use crate::config::DiscoveryConfig;
use crate::error::DiscoveryResult;
use chrono::Utc;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tracing::debug;

/// Sends presence announcements to the multicast channel.
pub struct DiscoveryClient {
    socket: UdpSocket,
    target: SocketAddr,
    presence: Presence,
}

impl DiscoveryClient {
    /// Creates a client for the given presence. Must be called from within a
    /// tokio runtime.
    pub fn new(config: &DiscoveryConfig, presence: Presence) -> DiscoveryResult<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_multicast_ttl_v4(config.multicast_ttl)?;
        socket.set_multicast_loop_v4(config.multicast_loop)?;
        if !config.interface.is_unspecified() {
            socket.set_multicast_if_v4(&config.interface)?;
        }
        socket.set_nonblocking(true)?;
        socket.bind(&SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).into())?;

        Ok(Self {
            socket: UdpSocket::from_std(socket.into())?,
            target: config.target(),
            presence,
        })
    }

    /// Returns the presence this client announces.
    #[must_use]
    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    /// Returns where announcements are sent.
    #[must_use]
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Publishes one announcement and returns what was sent.
    pub async fn publish_presence(&self) -> DiscoveryResult<Announcement> {
        let announcement = self.presence.announce(Utc::now());
        let datagram = codec::encode(&announcement)?;
        self.socket.send_to(&datagram, self.target).await?;
        debug!(
            target = %self.target,
            user_id = %announcement.user_id,
            "presence published"
        );
        Ok(announcement)
    }
}
