//! Identity of the machine and user running the validator.
//!
//! Used for floating lease requests and discovery announcements.

use serde::{Deserialize, Serialize};
use std::env;

/// Machine and OS user names of the current process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentity {
    /// Hostname.
    pub machine_name: String,
    /// OS account name.
    pub user_name: String,
}

impl HostIdentity {
    /// Collects the identity of the current process.
    #[must_use]
    pub fn collect() -> Self {
        Self {
            machine_name: get_hostname(),
            user_name: get_user_name(),
        }
    }

    /// Creates an identity from explicit names.
    #[must_use]
    pub fn new(machine_name: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            machine_name: machine_name.into(),
            user_name: user_name.into(),
        }
    }
}

impl Default for HostIdentity {
    fn default() -> Self {
        Self::collect()
    }
}

/// Gets the machine hostname.
fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Gets the OS user name.
fn get_user_name() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
