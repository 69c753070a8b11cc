//! Presence announcements exchanged between validators on a LAN.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single "this license is in use here" datagram payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// Random per-process identity of the publishing validator.
    pub sender_id: Uuid,
    /// The license id being asserted.
    pub user_id: Uuid,
    /// Host name of the publishing machine.
    pub machine_name: String,
    /// OS user running the publishing process.
    pub user_name: String,
    /// When the announcement was created.
    pub sent_at: DateTime<Utc>,
}

/// The stable part of an announcement, fixed for the lifetime of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    /// Identity of this validator process.
    pub sender_id: Uuid,
    /// The license id this process holds.
    pub user_id: Uuid,
    /// Local host name.
    pub machine_name: String,
    /// Local OS user.
    pub user_name: String,
}

impl Presence {
    /// Stamps this presence into an announcement sent at `sent_at`.
    #[must_use]
    pub fn announce(&self, sent_at: DateTime<Utc>) -> Announcement {
        Announcement {
            sender_id: self.sender_id,
            user_id: self.user_id,
            machine_name: self.machine_name.clone(),
            user_name: self.user_name.clone(),
            sent_at,
        }
    }
}
