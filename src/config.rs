//! Configuration for the backup daemon.
//!
//! Loaded from `~/.backupd/backupd.toml` (see [`crate::daemon::paths`]).
//! Every field has a default, so an empty or missing file is valid apart
//! from the two signing secrets, which must be set in the file or through
//! `BACKUPD_SESSION_SECRET` / `BACKUPD_FILE_TOKEN_SECRET`.
//!
//! - [`Config`] - Root configuration struct
//! - [`ServerConfig`] - HTTP listener and log settings
//! - [`DataConfig`] - Where the live state lives
//! - [`BackupsConfig`] - Blob store backend and schedule
//! - [`AuthConfig`] - Token secrets and lifetimes
//! - [`RestoreConfig`] - How the process restarts after a restore

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::daemon::backups::{RestartMode, StateLayout};
use crate::daemon::paths;

pub const SESSION_SECRET_ENV: &str = "BACKUPD_SESSION_SECRET";
pub const FILE_TOKEN_SECRET_ENV: &str = "BACKUPD_FILE_TOKEN_SECRET";

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub backups: BackupsConfig,
    pub auth: AuthConfig,
    pub restore: RestoreConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
    /// Expose Prometheus metrics on `/metrics`.
    pub metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
            log_format: LogFormat::default(),
            metrics: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Defaults to `~/.backupd/data`.
    pub dir: Option<PathBuf>,
    /// SQLite files inside `dir` captured by every backup.
    pub stores: Vec<String>,
    /// File-storage tree inside `dir`.
    pub storage_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: None,
            stores: vec!["data.db".to_string(), "auxiliary.db".to_string()],
            storage_dir: "storage".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackendKind {
    #[default]
    Filesystem,
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackupsConfig {
    pub backend: BlobBackendKind,
    /// Defaults to `~/.backupd/backups`. Only used by the filesystem backend.
    pub dir: Option<PathBuf>,
    /// Cron expression for automatic backups; unset disables them.
    pub cron: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_secret: String,
    pub file_token_secret: String,
    pub session_ttl_secs: u64,
    pub file_token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: String::new(),
            file_token_secret: String::new(),
            session_ttl_secs: 14 * 24 * 60 * 60,
            file_token_ttl_secs: 3 * 60,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    pub mode: RestartMode,
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults when the file does not exist. Environment overrides are
    /// applied either way.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = paths::get_config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - Fields have invalid types or unknown enum values
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Replaces secrets with values from the environment where present.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = lookup(SESSION_SECRET_ENV).filter(|s| !s.is_empty()) {
            self.auth.session_secret = secret;
        }
        if let Some(secret) = lookup(FILE_TOKEN_SECRET_ENV).filter(|s| !s.is_empty()) {
            self.auth.file_token_secret = secret;
        }
    }

    /// Resolved data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data.dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::get_default_data_dir(),
        }
    }

    /// Resolved directory of the filesystem blob store.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn backups_dir(&self) -> Result<PathBuf> {
        match &self.backups.dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::get_default_backups_dir(),
        }
    }

    /// Layout of the live state described by `[data]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn layout(&self) -> Result<StateLayout> {
        Ok(StateLayout::new(
            self.data_dir()?,
            self.data.stores.clone(),
            self.data.storage_dir.clone(),
        ))
    }

    /// Validate configuration.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error listing every fatal problem:
    /// - Port 0
    /// - Missing secrets, or the same secret for sessions and file tokens
    /// - Zero token lifetimes
    /// - No stores, or store / storage names that are not plain file names
    /// - Malformed cron expression
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. Server
        if self.server.port == 0 {
            errors.push("server.port cannot be 0. Use a valid port number (1-65535)".to_string());
        } else if self.server.port < 1024 {
            warnings.push(format!(
                "server.port {} is a system/privileged port (< 1024)\n  \
                 Recommendation: Use ports >= 1024 to avoid permission issues",
                self.server.port
            ));
        }

        // 2. Secrets
        if self.auth.session_secret.is_empty() {
            errors.push(format!(
                "auth.session_secret must be set (or export {SESSION_SECRET_ENV})"
            ));
        }
        if self.auth.file_token_secret.is_empty() {
            errors.push(format!(
                "auth.file_token_secret must be set (or export {FILE_TOKEN_SECRET_ENV})"
            ));
        }
        if !self.auth.session_secret.is_empty()
            && self.auth.session_secret == self.auth.file_token_secret
        {
            errors.push(
                "auth.session_secret and auth.file_token_secret must differ\n  \
                 File tokens must never be accepted as sessions or the reverse"
                    .to_string(),
            );
        }
        if self.auth.session_ttl_secs == 0 || self.auth.file_token_ttl_secs == 0 {
            errors.push("auth token lifetimes must be greater than 0".to_string());
        }
        if self.auth.file_token_ttl_secs > 60 * 60 {
            warnings.push(format!(
                "auth.file_token_ttl_secs is {} (> 1 hour)\n  \
                 File tokens grant access to full backups; keep them short-lived",
                self.auth.file_token_ttl_secs
            ));
        }

        // 3. Data layout
        if self.data.stores.is_empty() {
            errors.push("data.stores must list at least one store".to_string());
        }
        for name in self.data.stores.iter().chain([&self.data.storage_dir]) {
            if !is_plain_file_name(name) {
                errors.push(format!(
                    "'{name}' must be a plain file name inside the data directory"
                ));
            }
        }

        // 4. Schedule
        if let Some(cron) = &self.backups.cron {
            let fields = cron.split_whitespace().count();
            if !(5..=7).contains(&fields) {
                errors.push(format!(
                    "backups.cron '{cron}' must have 5 to 7 fields (e.g. \"0 0 2 * * *\")"
                ));
            }
        }
        if self.backups.backend == BlobBackendKind::Memory {
            warnings.push(
                "backups.backend is 'memory': backups are lost when the process exits".to_string(),
            );
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
}
