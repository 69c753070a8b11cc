//! Datagram codec for presence announcements.
//!
//! Each UDP datagram carries exactly one JSON envelope:
//!
//! ```json
//! {"magic":"leasehold-discovery","version":1,"announcement":{...}}
//! ```
//!
//! Datagrams are self-delimiting, so unlike a stream codec there is no
//! length prefix; the size bound is enforced on both sides instead.

use crate::announcement::Announcement;
use crate::error::{DiscoveryError, DiscoveryResult};
use serde::{Deserialize, Serialize};

/// Envelope marker distinguishing our datagrams from other traffic on the port.
pub const MAGIC: &str = "leasehold-discovery";

/// Current wire version.
pub const WIRE_VERSION: u32 = 1;

/// Maximum datagram size (4 KB).
pub const MAX_DATAGRAM_SIZE: usize = 4 * 1024;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    magic: &'a str,
    version: u32,
    announcement: &'a Announcement,
}

#[derive(Deserialize)]
struct Envelope {
    magic: String,
    version: u32,
    announcement: Announcement,
}

/// Encodes an announcement into a single datagram.
pub fn encode(announcement: &Announcement) -> DiscoveryResult<Vec<u8>> {
    let data = serde_json::to_vec(&EnvelopeRef {
        magic: MAGIC,
        version: WIRE_VERSION,
        announcement,
    })?;

    if data.len() > MAX_DATAGRAM_SIZE {
        return Err(DiscoveryError::Codec(format!(
            "announcement too large: {} bytes",
            data.len()
        )));
    }

    Ok(data)
}

/// Decodes a datagram, rejecting foreign or oversized payloads.
pub fn decode(datagram: &[u8]) -> DiscoveryResult<Announcement> {
    if datagram.len() > MAX_DATAGRAM_SIZE {
        return Err(DiscoveryError::Codec(format!(
            "datagram too large: {} bytes",
            datagram.len()
        )));
    }

    let envelope: Envelope = serde_json::from_slice(datagram)?;

    if envelope.magic != MAGIC {
        return Err(DiscoveryError::Codec(format!(
            "unexpected magic: {}",
            envelope.magic
        )));
    }
    if envelope.version != WIRE_VERSION {
        return Err(DiscoveryError::Codec(format!(
            "unsupported version: expected {WIRE_VERSION}, got {}",
            envelope.version
        )));
    }

    Ok(envelope.announcement)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_magic_and_version() {
        let announcement = Announcement {
            sender_id: uuid::Uuid::nil(),
            user_id: uuid::Uuid::nil(),
            machine_name: "m".into(),
            user_name: "u".into(),
            sent_at: chrono::Utc::now(),
        };
        let bytes = encode(&announcement).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["magic"], MAGIC);
        assert_eq!(value["version"], WIRE_VERSION);
    }
}
