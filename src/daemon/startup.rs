//! Wiring configuration into running services.
//!
//! - [`build_backup_service`] - open stores and the blob backend
//! - [`build_state`] - assemble the HTTP state from a backup service

use anyhow::{Context, Result};
use chrono::Duration;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use super::backups::{BackupService, Restarter};
use super::http::{AppState, SharedState};
use super::services::blob::BlobService;
use super::services::sqlite::SqliteStore;
use crate::auth::{FileTokenSecret, FileTokens, SessionSecret, SessionTokens};
use crate::config::Config;

/// Opens every configured store and the blob backend.
///
/// Stores that do not exist yet are created empty so the first backup
/// always contains all of them.
///
/// # Errors
///
/// Returns an error if a directory, store or the blob backend cannot be
/// opened.
pub fn build_backup_service(
    config: &Config,
    restarter: Arc<dyn Restarter>,
) -> Result<BackupService> {
    let layout = config.layout()?;
    layout.ensure()?;
    for name in layout.stores() {
        SqliteStore::open(layout.data_dir(), name)
            .with_context(|| format!("Failed to open data store {name}"))?;
    }

    let blobs = BlobService::from_kind(config.backups.backend, config.backups_dir()?)?;
    tracing::info!(
        data_dir = %layout.data_dir().display(),
        backend = ?config.backups.backend,
        stores = layout.stores().len(),
        "Backup service ready"
    );
    Ok(BackupService::new(blobs, layout, restarter))
}

/// Issuers for both token kinds, from `[auth]`.
pub fn build_tokens(config: &Config) -> (SessionTokens, FileTokens) {
    let auth = &config.auth;
    let sessions = SessionTokens::new(
        &SessionSecret::new(auth.session_secret.as_bytes()),
        ttl(auth.session_ttl_secs),
    );
    let files = FileTokens::new(
        &FileTokenSecret::new(auth.file_token_secret.as_bytes()),
        ttl(auth.file_token_ttl_secs),
    );
    (sessions, files)
}

/// Clamped to what `chrono::Duration` can hold.
fn ttl(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000))
}

pub fn build_state(
    config: &Config,
    backups: BackupService,
    metrics: Option<PrometheusHandle>,
) -> SharedState {
    let (sessions, file_tokens) = build_tokens(config);
    Arc::new(AppState {
        backups,
        sessions,
        file_tokens,
        metrics,
    })
}
