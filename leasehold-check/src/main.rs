//! Leasehold license checker
//!
//! Validates a license file against the vendor's public key, prints it, and
//! stays resident so scheduled re-validation, floating renewal and duplicate
//! detection keep running:
//!
//!   leasehold-check --public-key <BASE64> --license ./license.xml
//!
//! Exits non-zero when the license is not valid or stops being valid.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::Parser;
use leasehold_license::{
    Announcement, FileSource, InvalidationReason, LicenseDocument, LicenseValidator,
    MultipleLicenseUsage, PublicKey, ValidatorConfig,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "leasehold-check")]
#[command(about = "Validates a Leasehold license and watches it")]
struct Args {
    /// Vendor public key (base64)
    #[arg(long)]
    public_key: String,

    /// Path to the license file
    #[arg(short, long)]
    license: PathBuf,

    /// Do not announce or listen for the license on the LAN
    #[arg(long)]
    no_discovery: bool,

    /// Do not cross-check expiration against network time
    #[arg(long)]
    no_network_time: bool,

    /// Seconds between re-validations
    #[arg(long, default_value = "300")]
    lease_timeout: u64,

    /// Tolerate the same license used by the same OS user elsewhere
    #[arg(long)]
    allow_same_user: bool,

    /// Print the license as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

enum Event {
    Invalidated(InvalidationReason),
    Expired(DateTime<Utc>),
    Duplicate(Announcement),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let public_key = PublicKey::from_base64(&args.public_key).context("invalid --public-key")?;

    let mut config = ValidatorConfig {
        lease_timeout: Duration::from_secs(args.lease_timeout),
        multiple_license_usage: if args.allow_same_user {
            MultipleLicenseUsage::AllowForSameUser
        } else {
            MultipleLicenseUsage::Deny
        },
        ..ValidatorConfig::default()
    };
    config.discovery.enabled = !args.no_discovery;
    config.network_time.enabled = !args.no_network_time;

    let validator = LicenseValidator::builder(public_key, FileSource::new(&args.license))
        .config(config)
        .build();

    let (tx, mut events) = mpsc::unbounded_channel();
    let sink = tx.clone();
    validator.on_license_invalidated(move |reason| {
        let _ = sink.send(Event::Invalidated(reason));
    });
    let sink = tx.clone();
    validator.on_license_expired(move |at| {
        let _ = sink.send(Event::Expired(at));
    });
    validator.on_multiple_licenses_discovered(move |announcement| {
        let _ = tx.send(Event::Duplicate(announcement.clone()));
    });

    validator
        .assert_valid_license()
        .await
        .with_context(|| format!("license {} is not valid", args.license.display()))?;
    let document = validator
        .document()
        .await
        .context("validated license has no document")?;
    print_document(&document, args.json)?;

    info!(sender_id = %validator.sender_id(), "watching license, press Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                return Ok(());
            }
            event = events.recv() => match event {
                Some(Event::Duplicate(announcement)) => warn!(
                    machine = %announcement.machine_name,
                    user = %announcement.user_name,
                    "license also in use on another machine"
                ),
                Some(Event::Expired(at)) => bail!("license expired on {at}"),
                Some(Event::Invalidated(reason)) => bail!("license invalidated: {reason}"),
                None => return Ok(()),
            },
        }
    }
}

fn print_document(document: &LicenseDocument, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(document)?);
        return Ok(());
    }

    println!("Owner:      {}", document.owner_name);
    println!("License id: {}", document.id);
    println!("Type:       {}", document.license_type);
    println!("Expires:    {}", document.expiration);
    for (name, value) in &document.attributes {
        println!("  {name}: {value}");
    }
    Ok(())
}
