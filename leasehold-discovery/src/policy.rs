//! Reception policy: decides whether an announcement means duplicate use.

use crate::announcement::Announcement;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How to treat the same license being asserted by another process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultipleLicenseUsage {
    /// Any other process using the license is a conflict.
    #[default]
    Deny,
    /// Other processes are tolerated when they run as the same OS user.
    AllowForSameUser,
}

/// Outcome of assessing a received announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Our own datagram echoed back.
    OwnEcho,
    /// A different license (or we hold none yet).
    OtherLicense,
    /// Same license, but the usage policy tolerates it.
    Permitted,
    /// Same license in use elsewhere.
    Conflict,
}

impl Verdict {
    /// Returns true if the announcement should invalidate the local license.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

/// The local side of the comparison.
#[derive(Debug, Clone, Copy)]
pub struct LocalIdentity<'a> {
    /// Identity of this validator process, used to drop its own echoes.
    pub sender_id: Uuid,
    /// Id of the currently held license, if any.
    pub user_id: Option<Uuid>,
    /// Local OS user, compared under `AllowForSameUser`.
    pub user_name: &'a str,
}

/// Applies the reception policy to one announcement.
#[must_use]
pub fn assess(
    announcement: &Announcement,
    local: LocalIdentity<'_>,
    usage: MultipleLicenseUsage,
) -> Verdict {
    if announcement.sender_id == local.sender_id {
        return Verdict::OwnEcho;
    }

    if local.user_id != Some(announcement.user_id) {
        return Verdict::OtherLicense;
    }

    match usage {
        MultipleLicenseUsage::AllowForSameUser if announcement.user_name == local.user_name => {
            Verdict::Permitted
        }
        _ => Verdict::Conflict,
    }
}
