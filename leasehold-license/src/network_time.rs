//! Network time cross-check (SNTP, RFC 4330 client mode).
//!
//! Asks a fallback-ordered list of time servers for the current UTC time so a
//! license cannot be kept alive by winding the local clock back. The check is
//! best-effort: an unreachable network or silent servers yield
//! [`NetworkTime::Unknown`], which never invalidates anything.

use chrono::{DateTime, Utc};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket as StdUdpSocket};
use std::time::Duration;
use thiserror::Error;
use tokio::net::{UdpSocket, lookup_host};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default time servers, tried in order.
pub const DEFAULT_TIME_SERVERS: &[&str] = &[
    "time.nist.gov",
    "time-a-g.nist.gov",
    "time-b-g.nist.gov",
    "time-a-wwv.nist.gov",
    "time-b-wwv.nist.gov",
    "time-a-b.nist.gov",
    "time-b-b.nist.gov",
    "utcnist.colorado.edu",
    "time.google.com",
    "time.cloudflare.com",
    "pool.ntp.org",
];

/// Standard NTP port.
pub const NTP_PORT: u16 = 123;

/// SNTP packet size.
const PACKET_SIZE: usize = 48;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET_SECS: i64 = 2_208_988_800;

/// LI = 0, VN = 3, Mode = 3 (client).
const CLIENT_REQUEST_HEADER: u8 = 0b00_011_011;

/// Address used only to ask the OS for a route; nothing is sent to it.
const ROUTE_PROBE_ADDR: &str = "192.0.2.1:123";

/// Errors from a single time-server exchange.
#[derive(Debug, Error)]
pub enum NtpError {
    /// Socket I/O failure.
    #[error("time server I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The host name did not resolve.
    #[error("could not resolve time server {0}")]
    Resolve(String),

    /// The response was not a usable server reply.
    #[error("invalid time server response: {0}")]
    InvalidResponse(String),

    /// The server did not answer in time.
    #[error("time server did not answer in time")]
    Timeout,
}

/// Outcome of a network time query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkTime {
    /// A server answered with this time.
    Authoritative {
        time: DateTime<Utc>,
        server: String,
    },
    /// No answer (network unavailable, servers silent, or timeout).
    Unknown,
}

impl NetworkTime {
    /// Returns the authoritative time, if one was obtained.
    #[must_use]
    pub fn time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Authoritative { time, .. } => Some(*time),
            Self::Unknown => None,
        }
    }
}

/// Network time checking configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkTimeConfig {
    /// Whether the check runs after each successful validation.
    pub enabled: bool,
    /// Server host names, in fallback order.
    pub servers: Vec<String>,
    /// UDP port to query.
    pub port: u16,
    /// Bound on the whole query across all servers.
    pub timeout: Duration,
    /// Bound on a single server exchange.
    pub per_server_timeout: Duration,
}

impl Default for NetworkTimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            servers: DEFAULT_TIME_SERVERS.iter().map(|s| (*s).to_string()).collect(),
            port: NTP_PORT,
            timeout: Duration::from_secs(15),
            per_server_timeout: Duration::from_secs(3),
        }
    }
}

/// Queries time servers in fallback order.
#[derive(Debug, Clone)]
pub struct NetworkTimeChecker {
    config: NetworkTimeConfig,
}

impl NetworkTimeChecker {
    /// Creates a checker.
    #[must_use]
    pub fn new(config: NetworkTimeConfig) -> Self {
        Self { config }
    }

    /// Obtains one authoritative time, or `Unknown`.
    pub async fn query(&self) -> NetworkTime {
        if !network_available() {
            debug!("network unavailable, skipping network time check");
            return NetworkTime::Unknown;
        }

        match tokio::time::timeout(self.config.timeout, self.query_in_order()).await {
            Ok(result) => result,
            Err(_) => {
                debug!(timeout = ?self.config.timeout, "network time query timed out");
                NetworkTime::Unknown
            }
        }
    }

    /// Runs [`query`](Self::query) on a background task and hands the result
    /// to `on_result`.
    pub fn spawn<F>(self, on_result: F) -> JoinHandle<()>
    where
        F: FnOnce(NetworkTime) + Send + 'static,
    {
        tokio::spawn(async move {
            let result = self.query().await;
            on_result(result);
        })
    }

    async fn query_in_order(&self) -> NetworkTime {
        for server in &self.config.servers {
            match self.query_server(server).await {
                Ok(time) => {
                    info!(server = %server, %time, "network time obtained");
                    return NetworkTime::Authoritative {
                        time,
                        server: server.clone(),
                    };
                }
                Err(e) => debug!(server = %server, error = %e, "time server failed"),
            }
        }
        NetworkTime::Unknown
    }

    async fn query_server(&self, host: &str) -> Result<DateTime<Utc>, NtpError> {
        let addr = lookup_host((host, self.config.port))
            .await?
            .next()
            .ok_or_else(|| NtpError::Resolve(host.to_string()))?;

        let bind_addr = if addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(addr).await?;
        socket.send(&encode_request()).await?;

        let mut buf = [0u8; PACKET_SIZE];
        let len = tokio::time::timeout(self.config.per_server_timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| NtpError::Timeout)??;

        decode_response(&buf[..len])
    }
}

/// Builds an SNTP client request.
#[must_use]
pub fn encode_request() -> [u8; PACKET_SIZE] {
    let mut packet = [0u8; PACKET_SIZE];
    packet[0] = CLIENT_REQUEST_HEADER;
    packet
}

/// Extracts the server transmit timestamp from an SNTP reply.
pub fn decode_response(packet: &[u8]) -> Result<DateTime<Utc>, NtpError> {
    if packet.len() < PACKET_SIZE {
        return Err(NtpError::InvalidResponse(format!(
            "short packet: {} bytes",
            packet.len()
        )));
    }

    let mode = packet[0] & 0b111;
    if mode != 4 && mode != 5 {
        return Err(NtpError::InvalidResponse(format!("unexpected mode {mode}")));
    }

    let stratum = packet[1];
    if stratum == 0 {
        return Err(NtpError::InvalidResponse("kiss-of-death (stratum 0)".to_string()));
    }

    let seconds = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]);
    let fraction = u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]);
    if seconds == 0 && fraction == 0 {
        return Err(NtpError::InvalidResponse("empty transmit timestamp".to_string()));
    }

    // Era 1 starts 2036-02-07; a clear high bit means the counter has wrapped.
    let era_seconds = if seconds & 0x8000_0000 == 0 {
        i64::from(seconds) + (1_i64 << 32)
    } else {
        i64::from(seconds)
    };
    let unix_secs = era_seconds - NTP_UNIX_OFFSET_SECS;
    let nanos = ((u64::from(fraction) * 1_000_000_000) >> 32) as u32;
    DateTime::from_timestamp(unix_secs, nanos)
        .ok_or_else(|| NtpError::InvalidResponse("timestamp out of range".to_string()))
}

/// Reports whether the OS has a route for outbound UDP. Connecting a UDP
/// socket only selects a route; no packet leaves the machine.
#[must_use]
pub fn network_available() -> bool {
    StdUdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| socket.connect(ROUTE_PROBE_ADDR))
        .is_ok()
}
