use chrono::{TimeZone, Utc};
use leasehold_discovery::DiscoveryError;
use leasehold_license::{LeaseError, LicenseError};

#[test]
fn error_display_not_found() {
    let err = LicenseError::LicenseNotFound;
    assert!(format!("{err}").contains("no valid license"));
}

#[test]
fn error_display_file_not_found() {
    let err = LicenseError::LicenseFileNotFound("/etc/acme/license.xml".into());
    let msg = format!("{err}");
    assert!(msg.contains("not found"));
    assert!(msg.contains("/etc/acme/license.xml"));
}

#[test]
fn error_display_expired() {
    let err = LicenseError::Expired(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    let msg = format!("{err}");
    assert!(msg.contains("expired"));
    assert!(msg.contains("2025-01-01"));
}

#[test]
fn error_display_floating_unavailable() {
    let err = LicenseError::FloatingLicenseUnavailable("timeout".into());
    let msg = format!("{err}");
    assert!(msg.contains("floating"));
    assert!(msg.contains("timeout"));
}

#[test]
fn error_display_invalid_public_key() {
    let err = LicenseError::InvalidPublicKey("bad length".into());
    assert!(format!("{err}").contains("invalid public key"));
}

#[test]
fn error_display_no_listener() {
    let err = LicenseError::NoInvalidationListener;
    assert!(format!("{err}").contains("no invalidation listener"));
}

#[test]
fn error_from_discovery() {
    let err: LicenseError = DiscoveryError::Codec("bad magic".into()).into();
    assert!(matches!(err, LicenseError::Discovery(_)));
    assert!(format!("{err}").contains("bad magic"));
}

#[test]
fn lease_error_display() {
    assert!(format!("{}", LeaseError::Timeout).contains("timed out"));
    assert!(format!("{}", LeaseError::Rejected("no seats".into())).contains("no seats"));
}

#[test]
fn error_is_debug() {
    let err = LicenseError::Storage("disk full".into());
    let debug = format!("{err:?}");
    assert!(debug.contains("Storage"));
}
