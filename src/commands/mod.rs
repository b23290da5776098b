//! CLI command implementations for backupd.
//!
//! - [`serve`] - Run the backup API server
//! - [`token`] - Out-of-band issuance of session and file-access tokens
//! - [`backups`] - Operator helpers that run backup operations without HTTP

pub mod backups;
pub mod serve;
pub mod token;

use anyhow::Result;
use std::path::Path;

use crate::config::{Config, LogFormat};

/// Loads configuration from `path` or the default location, applies
/// environment overrides, and validates it.
///
/// Returns the validation warnings alongside, since logging is usually
/// not initialized yet at this point.
pub fn load_config(path: Option<&Path>) -> Result<(Config, Vec<String>)> {
    let config = match path {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config
        },
        None => Config::load()?,
    };

    let validation = config.validate()?;
    Ok((config, validation.warnings))
}

/// Initialize stdout logging in the configured format.
pub fn init_logging(format: LogFormat, warnings: &[String]) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }

    for warning in warnings {
        tracing::warn!("{warning}");
    }
}
