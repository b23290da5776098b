//! Path utilities for backupd.
//!
//! # Base Directory
//! - [`get_home_dir`] - `~/.backupd/` (root for configuration and default data)
//!
//! # Defaults
//! - [`get_config_path`] - `~/.backupd/backupd.toml`
//! - [`get_default_data_dir`] - `~/.backupd/data/` (live stores and storage tree)
//! - [`get_default_backups_dir`] - `~/.backupd/backups/` (filesystem blob store)

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable overriding the base directory.
pub const HOME_ENV: &str = "BACKUPD_HOME";

/// Get the backupd base directory.
///
/// Resolution order:
/// 1. `BACKUPD_HOME` environment variable (if set)
/// 2. `~/.backupd/` (default)
pub fn get_home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(HOME_ENV)
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home));
    }

    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".backupd"))
}

/// Get the config path: `~/.backupd/backupd.toml`
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("backupd.toml"))
}

/// Get the default data directory: `~/.backupd/data/`
pub fn get_default_data_dir() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("data"))
}

/// Get the default backups directory: `~/.backupd/backups/`
pub fn get_default_backups_dir() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("backups"))
}
