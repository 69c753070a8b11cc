//! License document model and field extraction.
//!
//! A license is an XML document:
//!
//! ```xml
//! <license id="UUID" type="Standard" expiration="2099-01-01T00:00:00.0000000" edition="pro">
//!   <name>Acme</name>
//!   <Signature xmlns="http://www.w3.org/2000/09/xmldsig#">...</Signature>
//! </license>
//! ```
//!
//! A floating marker replaces the license body with the key of the server
//! that leases real licenses:
//!
//! ```xml
//! <floating-license>
//!   <name>Acme</name>
//!   <license-server-public-key>BASE64</license-server-public-key>
//!   <Signature .../>
//! </floating-license>
//! ```

use crate::signature::{PublicKey, verify_document};
use crate::xml::{child_element, text_content};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use roxmltree::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};
use uuid::Uuid;

/// Root element of a direct license.
pub const LICENSE_ELEMENT: &str = "license";

/// Root element of a floating-license marker.
pub const FLOATING_LICENSE_ELEMENT: &str = "floating-license";

/// Child of the floating marker holding the license server's public key.
pub const LICENSE_SERVER_KEY_ELEMENT: &str = "license-server-public-key";

/// Root attributes that are never exposed as free-form attributes.
pub const RESERVED_ATTRIBUTES: [&str; 3] = ["id", "type", "expiration"];

/// Timestamp layout used by the `expiration` attribute.
const EXPIRATION_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S";

/// Number of fractional-second digits in `expiration` (100 ns ticks).
const EXPIRATION_FRACTION_DIGITS: usize = 7;

/// The kind of license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LicenseType {
    /// Self-contained license valid until its expiration.
    Standard,
    /// Time-limited evaluation license.
    Trial,
    /// Leased from a license server.
    Floating,
    /// Periodically re-leased to extend its expiration.
    Subscription,
}

impl LicenseType {
    /// Returns the name used in license documents.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "Standard",
            Self::Trial => "Trial",
            Self::Floating => "Floating",
            Self::Subscription => "Subscription",
        }
    }
}

impl fmt::Display for LicenseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LicenseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Standard" => Ok(Self::Standard),
            "Trial" => Ok(Self::Trial),
            "Floating" => Ok(Self::Floating),
            "Subscription" => Ok(Self::Subscription),
            other => Err(format!("unknown license type: {other}")),
        }
    }
}

/// A signature-verified license. Replaced wholesale, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseDocument {
    /// License identity.
    pub id: Uuid,
    /// Expiration instant.
    pub expiration: DateTime<Utc>,
    /// License kind.
    pub license_type: LicenseType,
    /// Licensee name.
    pub owner_name: String,
    /// Extra root attributes, excluding the reserved ones.
    pub attributes: BTreeMap<String, String>,
    /// The signed text this document was read from.
    #[serde(skip)]
    pub raw: String,
}

impl LicenseDocument {
    /// Verifies `content` against `key` and extracts a direct license.
    ///
    /// Returns `None` for unsigned, tampered, malformed or floating content.
    #[must_use]
    pub fn parse_signed(content: &str, key: &PublicKey) -> Option<Self> {
        match inspect(content, key) {
            Inspection::License(doc) => Some(doc),
            Inspection::Floating { .. } | Inspection::Invalid => None,
        }
    }

    /// Returns true if the expiration lies in the past relative to `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration
    }
}

/// What a piece of signed content turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Inspection {
    /// Not a usable license (logged).
    Invalid,
    /// A direct license.
    License(LicenseDocument),
    /// A floating marker naming the license server key.
    Floating { server_public_key: String },
}

/// Verifies the signature of `raw` and classifies its content.
pub(crate) fn inspect(raw: &str, key: &PublicKey) -> Inspection {
    let doc = match Document::parse(raw) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, "license content is not well-formed XML");
            return Inspection::Invalid;
        }
    };

    if !verify_document(&doc, key) {
        warn!("could not validate license signature");
        debug!(content = raw, "rejected license content");
        return Inspection::Invalid;
    }

    let root = doc.root_element();
    if root.tag_name().name() == FLOATING_LICENSE_ELEMENT && root.tag_name().namespace().is_none() {
        return match child_element(root, LICENSE_SERVER_KEY_ELEMENT, None).and_then(text_content) {
            Some(server_public_key) => Inspection::Floating {
                server_public_key: server_public_key.trim().to_string(),
            },
            None => {
                warn!("floating license without license server public key");
                Inspection::Invalid
            }
        };
    }

    match extract_fields(&doc, raw) {
        Some(license) => Inspection::License(license),
        None => Inspection::Invalid,
    }
}

/// Extracts license fields from a document whose signature has verified.
pub(crate) fn extract_fields(doc: &Document<'_>, raw: &str) -> Option<LicenseDocument> {
    let root = doc.root_element();
    if root.tag_name().name() != LICENSE_ELEMENT || root.tag_name().namespace().is_some() {
        warn!(root = root.tag_name().name(), "unexpected license root element");
        return None;
    }

    let Some(id) = root.attribute("id") else {
        warn!("could not find id attribute in license");
        return None;
    };
    let id = match Uuid::parse_str(id) {
        Ok(id) => id,
        Err(e) => {
            warn!(id, error = %e, "license id is not a UUID");
            return None;
        }
    };

    let Some(expiration) = root.attribute("expiration") else {
        warn!(%id, "could not find expiration in license");
        return None;
    };
    let Some(expiration) = parse_expiration(expiration) else {
        warn!(%id, expiration, "license expiration is not in yyyy-MM-ddTHH:mm:ss.fffffff format");
        return None;
    };

    let Some(license_type) = root.attribute("type") else {
        warn!(%id, "could not find license type in license");
        return None;
    };
    let license_type = match license_type.parse::<LicenseType>() {
        Ok(t) => t,
        Err(e) => {
            warn!(%id, error = %e, "license type not recognised");
            return None;
        }
    };

    let Some(owner_name) = child_element(root, "name", None).and_then(text_content) else {
        warn!(%id, "could not find licensee's name in license");
        return None;
    };

    let attributes = root
        .attributes()
        .filter(|a| !RESERVED_ATTRIBUTES.contains(&a.name()))
        .map(|a| (a.name().to_string(), a.value().to_string()))
        .collect();

    Some(LicenseDocument {
        id,
        expiration,
        license_type,
        owner_name,
        attributes,
        raw: raw.to_string(),
    })
}

/// Formats an instant as `yyyy-MM-ddTHH:mm:ss.fffffff`.
#[must_use]
pub fn format_expiration(instant: &DateTime<Utc>) -> String {
    let ticks = (instant.nanosecond() / 100).min(9_999_999);
    format!("{}.{ticks:07}", instant.format(EXPIRATION_LAYOUT))
}

/// Parses `yyyy-MM-ddTHH:mm:ss.fffffff` (exactly seven fractional digits, UTC).
#[must_use]
pub fn parse_expiration(value: &str) -> Option<DateTime<Utc>> {
    let (whole, fraction) = value.split_once('.')?;
    if fraction.len() != EXPIRATION_FRACTION_DIGITS
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let ticks: u32 = fraction.parse().ok()?;
    let naive = NaiveDateTime::parse_from_str(whole, EXPIRATION_LAYOUT).ok()?;
    Some(naive.with_nanosecond(ticks * 100)?.and_utc())
}
