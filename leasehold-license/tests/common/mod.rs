//! Shared test helpers for license tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use leasehold_license::{
    DiscoveryConfig, FloatingLeaseProvider, HostIdentity, LeaseError, LicenseGenerator,
    LicenseType, NetworkTimeConfig, SubscriptionLeaseProvider, ValidatorConfig,
};
use leasehold_license::network_time::network_available;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use uuid::Uuid;

/// License id used by the sample licenses.
pub const ACME_ID: Uuid = Uuid::from_u128(0x4be2_0f5a_38ad_4c52_9e5f_8a1d_6b3c_2e71);

/// Returns the vendor's generator, from a fixed seed.
pub fn vendor() -> LicenseGenerator {
    let seed: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    LicenseGenerator::from_secret_bytes(&seed)
}

/// Returns the floating license server's generator, from a different seed.
pub fn license_server() -> LicenseGenerator {
    LicenseGenerator::from_secret_bytes(&[7u8; 32])
}

/// Returns a generator nobody trusts.
pub fn stranger() -> LicenseGenerator {
    LicenseGenerator::from_secret_bytes(&[99u8; 32])
}

/// Signs an "Acme" license of the given type and expiration.
pub fn acme_license(
    generator: &LicenseGenerator,
    license_type: LicenseType,
    expiration: DateTime<Utc>,
) -> String {
    let mut attributes = BTreeMap::new();
    attributes.insert("edition".to_string(), "pro".to_string());
    generator
        .generate("Acme", ACME_ID, expiration, license_type, &attributes)
        .expect("generate license")
}

/// A standard license expiring in a year.
pub fn valid_standard_license() -> String {
    acme_license(&vendor(), LicenseType::Standard, Utc::now() + TimeDelta::days(365))
}

/// A standard license that expired yesterday.
pub fn expired_standard_license() -> String {
    acme_license(&vendor(), LicenseType::Standard, Utc::now() - TimeDelta::days(1))
}

/// Validator config with no network access.
pub fn offline_config() -> ValidatorConfig {
    ValidatorConfig {
        network_time: NetworkTimeConfig {
            enabled: false,
            ..NetworkTimeConfig::default()
        },
        discovery: DiscoveryConfig {
            enabled: false,
            ..DiscoveryConfig::default()
        },
        host: HostIdentity::new("build-agent-7", "ci"),
        lease_request_timeout: Duration::from_secs(2),
        ..ValidatorConfig::default()
    }
}

/// Floating lease provider returning a canned response.
pub struct MockFloatingProvider {
    response: Result<String, String>,
    calls: AtomicUsize,
    last_request: Mutex<Option<(String, String, Uuid)>>,
}

impl MockFloatingProvider {
    pub fn returning(license: impl Into<String>) -> Self {
        Self {
            response: Ok(license.into()),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            response: Err(reason.into()),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<(String, String, Uuid)> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl FloatingLeaseProvider for MockFloatingProvider {
    async fn lease_floating_license(
        &self,
        machine_name: &str,
        user_name: &str,
        client_id: Uuid,
    ) -> Result<String, LeaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() =
            Some((machine_name.to_string(), user_name.to_string(), client_id));
        self.response.clone().map_err(LeaseError::Rejected)
    }
}

/// Subscription lease provider returning a canned response.
pub struct MockSubscriptionProvider {
    response: Result<String, String>,
    calls: AtomicUsize,
}

impl MockSubscriptionProvider {
    pub fn returning(license: impl Into<String>) -> Self {
        Self {
            response: Ok(license.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            response: Err(reason.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriptionLeaseProvider for MockSubscriptionProvider {
    async fn lease_subscription(&self, _original_license: &str) -> Result<String, LeaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone().map_err(LeaseError::Transport)
    }
}

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
pub const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

/// An SNTP server reply (v3, stratum 2) carrying `time` as its transmit
/// timestamp. Times after 2036 wrap into the next NTP era.
pub fn sntp_reply(time: DateTime<Utc>) -> [u8; 48] {
    let mut packet = [0u8; 48];
    packet[0] = 0b00_011_100;
    packet[1] = 2;
    let seconds = (time.timestamp() + NTP_UNIX_OFFSET) as u32;
    let fraction = ((u64::from(time.timestamp_subsec_nanos()) << 32) / 1_000_000_000) as u32;
    packet[40..44].copy_from_slice(&seconds.to_be_bytes());
    packet[44..48].copy_from_slice(&fraction.to_be_bytes());
    packet
}

/// A local SNTP responder. Lives until the test runtime shuts down.
pub struct TimeServer {
    pub port: u16,
    requests: Arc<AtomicUsize>,
}

impl TimeServer {
    /// Answers every request on `127.0.0.1` with `time`.
    pub async fn answering(time: DateTime<Utc>) -> Self {
        Self::bind(Ipv4Addr::LOCALHOST, 0, Some(time)).await.unwrap()
    }

    /// Reads requests on `127.0.0.1` and never answers.
    pub async fn silent() -> Self {
        Self::bind(Ipv4Addr::LOCALHOST, 0, None).await.unwrap()
    }

    pub async fn bind(
        ip: Ipv4Addr,
        port: u16,
        reply: Option<DateTime<Utc>>,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind((ip, port)).await?;
        let port = socket.local_addr()?.port();
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 48];
            while let Ok((_, from)) = socket.recv_from(&mut buf).await {
                counter.fetch_add(1, Ordering::SeqCst);
                if let Some(time) = reply {
                    let _ = socket.send_to(&sntp_reply(time), from).await;
                }
            }
        });
        Ok(Self { port, requests })
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Config querying only this server, with short timeouts.
    pub fn config(&self) -> NetworkTimeConfig {
        NetworkTimeConfig {
            enabled: true,
            servers: vec!["127.0.0.1".to_string()],
            port: self.port,
            timeout: Duration::from_secs(3),
            per_server_timeout: Duration::from_secs(1),
        }
    }
}

/// Network time checks bail out early when the OS has no outbound route.
pub fn network_time_testable() -> bool {
    let available = network_available();
    if !available {
        eprintln!("skipping: no outbound UDP route");
    }
    available
}
