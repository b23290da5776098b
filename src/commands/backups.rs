//! `backupd backups` - list or create backups without going through HTTP.
//!
//! Runs against the configured stores directly, so it must not be used
//! while a server on the same data dir is creating or restoring a backup.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::daemon::backups::{BackupError, ProcessRestarter};
use crate::daemon::startup::build_backup_service;

fn into_anyhow(err: BackupError) -> anyhow::Error {
    match err {
        BackupError::Internal(err) => err,
        other => anyhow::anyhow!(other.to_string()),
    }
}

pub async fn list(config_path: Option<&Path>) -> Result<()> {
    let (config, warnings) = super::load_config(config_path)?;
    super::init_logging(config.server.log_format, &warnings);
    let restarter = Arc::new(ProcessRestarter::new(config.restore.mode));
    let service = build_backup_service(&config, restarter)?;

    let backups = service.list().await.map_err(into_anyhow)?;
    if backups.is_empty() {
        println!("No backups");
        return Ok(());
    }
    for backup in backups {
        println!(
            "{:<48} {:>12}  {}",
            backup.key,
            backup.size,
            backup.modified.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

pub async fn create(config_path: Option<&Path>, name: Option<&str>) -> Result<()> {
    let (config, warnings) = super::load_config(config_path)?;
    super::init_logging(config.server.log_format, &warnings);
    let restarter = Arc::new(ProcessRestarter::new(config.restore.mode));
    let service = build_backup_service(&config, restarter)?;

    let info = service.create(name).await.map_err(into_anyhow)?;
    println!("Created {} ({} bytes)", info.key, info.size);
    Ok(())
}
