//! `backupd token` - print a signed token for a superuser.
//!
//! This is the out-of-band issuance path: whoever can read the config can
//! mint credentials, so it is meant for operators on the host.

use anyhow::{Result, anyhow};
use chrono::Duration;
use std::path::Path;

use crate::auth::Role;
use crate::daemon::startup::build_tokens;

pub fn execute(
    config_path: Option<&Path>,
    subject: &str,
    file: bool,
    ttl: Option<u64>,
) -> Result<()> {
    let (config, warnings) = super::load_config(config_path)?;
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    let (sessions, files) = build_tokens(&config);

    let token = if file {
        match ttl {
            Some(secs) => files.issue_with_ttl(subject, ttl_from_secs(secs)?),
            None => files.issue(subject),
        }
    } else {
        sessions.issue(subject, Role::Superuser)
    }
    .map_err(|e| anyhow!("Failed to issue token: {e}"))?;

    println!("{token}");
    Ok(())
}

/// Converts a `--ttl` value, rejecting anything chrono cannot represent.
fn ttl_from_secs(secs: u64) -> Result<Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| anyhow!("ttl is too large"))
}
