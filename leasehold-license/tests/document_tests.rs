mod common;

use chrono::{TimeZone, Utc};
use common::{ACME_ID, acme_license, vendor};
use leasehold_license::{
    LicenseDocument, LicenseType, RESERVED_ATTRIBUTES, format_expiration, parse_expiration,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

#[test]
fn fields_extracted() {
    let expiration = Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap();
    let license = acme_license(&vendor(), LicenseType::Trial, expiration);

    let doc = LicenseDocument::parse_signed(&license, &vendor().public_key()).unwrap();

    let mut attributes = BTreeMap::new();
    attributes.insert("edition".to_string(), "pro".to_string());
    assert_eq!(doc.id, ACME_ID);
    assert_eq!(doc.owner_name, "Acme");
    assert_eq!(doc.license_type, LicenseType::Trial);
    assert_eq!(doc.expiration, expiration);
    assert_eq!(doc.attributes, attributes);
    assert_eq!(doc.raw, license);
}

#[test]
fn reserved_attributes_never_exposed() {
    let license = acme_license(&vendor(), LicenseType::Standard, Utc::now());
    let doc = LicenseDocument::parse_signed(&license, &vendor().public_key()).unwrap();
    for reserved in RESERVED_ATTRIBUTES {
        assert!(!doc.attributes.contains_key(reserved), "{reserved} leaked");
    }
}

fn signed(xml: &str) -> String {
    vendor().sign(xml).unwrap()
}

#[test]
fn bad_id_is_not_a_license() {
    let license = signed(
        r#"<license id="not-a-uuid" expiration="2099-01-01T00:00:00.0000000" type="Standard"><name>Acme</name></license>"#,
    );
    assert!(LicenseDocument::parse_signed(&license, &vendor().public_key()).is_none());
}

#[test]
fn missing_fields_are_not_a_license() {
    let key = vendor().public_key();
    let cases = [
        r#"<license expiration="2099-01-01T00:00:00.0000000" type="Standard"><name>Acme</name></license>"#,
        r#"<license id="4be20f5a-38ad-4c52-9e5f-8a1d6b3c2e71" type="Standard"><name>Acme</name></license>"#,
        r#"<license id="4be20f5a-38ad-4c52-9e5f-8a1d6b3c2e71" expiration="2099-01-01T00:00:00.0000000"><name>Acme</name></license>"#,
        r#"<license id="4be20f5a-38ad-4c52-9e5f-8a1d6b3c2e71" expiration="2099-01-01T00:00:00.0000000" type="Standard"></license>"#,
    ];
    for case in cases {
        assert!(LicenseDocument::parse_signed(&signed(case), &key).is_none(), "{case}");
    }
}

#[test]
fn license_type_is_case_sensitive() {
    let license = signed(
        r#"<license id="4be20f5a-38ad-4c52-9e5f-8a1d6b3c2e71" expiration="2099-01-01T00:00:00.0000000" type="standard"><name>Acme</name></license>"#,
    );
    assert!(LicenseDocument::parse_signed(&license, &vendor().public_key()).is_none());
}

#[test]
fn expiration_needs_seven_fraction_digits() {
    let license = signed(
        r#"<license id="4be20f5a-38ad-4c52-9e5f-8a1d6b3c2e71" expiration="2099-01-01T00:00:00" type="Standard"><name>Acme</name></license>"#,
    );
    assert!(LicenseDocument::parse_signed(&license, &vendor().public_key()).is_none());
}

#[test]
fn foreign_root_is_not_a_license() {
    let settings = signed(r#"<settings id="4be20f5a-38ad-4c52-9e5f-8a1d6b3c2e71"/>"#);
    assert!(LicenseDocument::parse_signed(&settings, &vendor().public_key()).is_none());
}

#[test]
fn floating_marker_is_not_a_direct_license() {
    let marker = vendor()
        .generate_floating_license("Acme", &common::license_server().public_key())
        .unwrap();
    assert!(LicenseDocument::parse_signed(&marker, &vendor().public_key()).is_none());
}

#[test]
fn expiration_format() {
    let instant = Utc.with_ymd_and_hms(2031, 7, 4, 13, 5, 9).unwrap()
        + chrono::TimeDelta::nanoseconds(123_456_700);
    assert_eq!(format_expiration(&instant), "2031-07-04T13:05:09.1234567");
    assert_eq!(parse_expiration("2031-07-04T13:05:09.1234567"), Some(instant));
}

#[test]
fn expiration_parse_rejects_other_layouts() {
    assert_eq!(parse_expiration("2031-07-04T13:05:09"), None);
    assert_eq!(parse_expiration("2031-07-04T13:05:09.123"), None);
    assert_eq!(parse_expiration("2031-07-04T13:05:09.1234567Z"), None);
    assert_eq!(parse_expiration("04/07/2031 13:05:09.1234567"), None);
}

#[test]
fn expired_at_boundary() {
    let expiration = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    let license = acme_license(&vendor(), LicenseType::Standard, expiration);
    let doc = LicenseDocument::parse_signed(&license, &vendor().public_key()).unwrap();

    assert!(!doc.is_expired_at(expiration - chrono::TimeDelta::seconds(1)));
    assert!(doc.is_expired_at(expiration));
}

#[test]
fn license_type_names() {
    for t in [
        LicenseType::Standard,
        LicenseType::Trial,
        LicenseType::Floating,
        LicenseType::Subscription,
    ] {
        assert_eq!(t.as_str().parse::<LicenseType>(), Ok(t));
    }
    assert!("Perpetual".parse::<LicenseType>().is_err());
}
