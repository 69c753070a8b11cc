use chrono::Utc;
use leasehold_discovery::{Announcement, LocalIdentity, MultipleLicenseUsage, Verdict, assess};
use uuid::Uuid;

fn announcement(sender_id: Uuid, user_id: Uuid, user_name: &str) -> Announcement {
    Announcement {
        sender_id,
        user_id,
        machine_name: "other-box".into(),
        user_name: user_name.into(),
        sent_at: Utc::now(),
    }
}

fn local(sender_id: Uuid, user_id: Uuid) -> LocalIdentity<'static> {
    LocalIdentity {
        sender_id,
        user_id: Some(user_id),
        user_name: "alice",
    }
}

#[test]
fn own_echo_is_ignored() {
    let me = Uuid::new_v4();
    let license = Uuid::new_v4();
    let a = announcement(me, license, "mallory");

    for usage in [MultipleLicenseUsage::Deny, MultipleLicenseUsage::AllowForSameUser] {
        assert_eq!(assess(&a, local(me, license), usage), Verdict::OwnEcho);
    }
}

#[test]
fn different_license_is_ignored() {
    let a = announcement(Uuid::new_v4(), Uuid::new_v4(), "alice");
    let verdict = assess(&a, local(Uuid::new_v4(), Uuid::new_v4()), MultipleLicenseUsage::Deny);
    assert_eq!(verdict, Verdict::OtherLicense);
    assert!(!verdict.is_conflict());
}

#[test]
fn no_local_license_is_ignored() {
    let a = announcement(Uuid::new_v4(), Uuid::new_v4(), "alice");
    let identity = LocalIdentity {
        sender_id: Uuid::new_v4(),
        user_id: None,
        user_name: "alice",
    };
    assert_eq!(assess(&a, identity, MultipleLicenseUsage::Deny), Verdict::OtherLicense);
}

#[test]
fn deny_conflicts_even_for_same_user() {
    let license = Uuid::new_v4();
    let a = announcement(Uuid::new_v4(), license, "alice");
    let verdict = assess(&a, local(Uuid::new_v4(), license), MultipleLicenseUsage::Deny);
    assert!(verdict.is_conflict());
}

#[test]
fn allow_for_same_user_permits_matching_user() {
    let license = Uuid::new_v4();
    let a = announcement(Uuid::new_v4(), license, "alice");
    let verdict = assess(
        &a,
        local(Uuid::new_v4(), license),
        MultipleLicenseUsage::AllowForSameUser,
    );
    assert_eq!(verdict, Verdict::Permitted);
}

#[test]
fn allow_for_same_user_conflicts_on_other_user() {
    let license = Uuid::new_v4();
    let a = announcement(Uuid::new_v4(), license, "bob");
    let verdict = assess(
        &a,
        local(Uuid::new_v4(), license),
        MultipleLicenseUsage::AllowForSameUser,
    );
    assert_eq!(verdict, Verdict::Conflict);
}

#[test]
fn default_usage_is_deny() {
    assert_eq!(MultipleLicenseUsage::default(), MultipleLicenseUsage::Deny);
}

#[test]
fn usage_serde() {
    let json = serde_json::to_string(&MultipleLicenseUsage::AllowForSameUser).unwrap();
    assert_eq!(json, "\"allow_for_same_user\"");
    let parsed: MultipleLicenseUsage = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, MultipleLicenseUsage::AllowForSameUser);
}
