//! Discovery host: listens on the multicast channel for announcements.

use crate::announcement::Announcement;
use crate::codec::{self, MAX_DATAGRAM_SIZE};
use crate::config::DiscoveryConfig;
use crate::error::DiscoveryResult;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the channel handing announcements to the consumer.
const CHANNEL_CAPACITY: usize = 64;

/// Pause after a receive error so a broken socket cannot spin the loop.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(200);

/// Background listener for presence announcements.
///
/// Decoded announcements are delivered on the channel returned by
/// [`DiscoveryHost::start`]. The listener stops when the host is dropped,
/// when [`DiscoveryHost::stop`] is called, or when the receiver is dropped.
pub struct DiscoveryHost {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl DiscoveryHost {
    /// Binds the discovery port, joins the multicast group and spawns the
    /// listener. Must be called from within a tokio runtime.
    pub fn start(
        config: &DiscoveryConfig,
    ) -> DiscoveryResult<(Self, mpsc::Receiver<Announcement>)> {
        let socket = bind_shared(config)?;
        let local_addr = socket.local_addr()?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));

        info!(%local_addr, group = %config.multicast_group, "discovery host listening");

        let task = tokio::spawn(listen(socket, tx, running.clone()));

        Ok((
            Self {
                local_addr,
                running,
                task,
            },
            rx,
        ))
    }

    /// Returns the bound local address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns whether the listener is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Stops the listener. Idempotent.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            debug!(local_addr = %self.local_addr, "discovery host stopping");
        }
        self.task.abort();
    }
}

impl Drop for DiscoveryHost {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Creates the listening socket with address reuse, so every validator
/// process on this machine can bind the same well-known port.
fn bind_shared(config: &DiscoveryConfig) -> DiscoveryResult<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;

    let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port));
    socket.bind(&SockAddr::from(bind_addr))?;
    socket.join_multicast_v4(&config.multicast_group, &config.interface)?;

    Ok(UdpSocket::from_std(socket.into())?)
}

async fn listen(socket: UdpSocket, tx: mpsc::Sender<Announcement>, running: Arc<AtomicBool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 1];

    while running.load(Ordering::SeqCst) {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!(error = %e, "discovery receive failed");
                tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                continue;
            }
        };

        let announcement = match codec::decode(&buf[..len]) {
            Ok(a) => a,
            Err(e) => {
                debug!(%from, error = %e, "ignoring malformed discovery datagram");
                continue;
            }
        };

        debug!(
            %from,
            sender_id = %announcement.sender_id,
            user_id = %announcement.user_id,
            "announcement received"
        );

        if tx.send(announcement).await.is_err() {
            debug!("announcement consumer dropped, discovery host exiting");
            break;
        }
    }

    running.store(false, Ordering::SeqCst);
}
