//! Prometheus metrics for backup operations.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::daemon::backups::BackupError;

pub const BACKUP_OPERATIONS_TOTAL: &str = "backupd_backup_operations_total";

/// Counts one backup operation by kind and outcome.
pub fn record_backup_operation(operation: &'static str, outcome: &'static str) {
    ::metrics::counter!(
        BACKUP_OPERATIONS_TOTAL,
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

/// Records the outcome of a handler result and passes it through.
pub fn track<T>(operation: &'static str, result: Result<T, BackupError>) -> Result<T, BackupError> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(err) => err.kind(),
    };
    record_backup_operation(operation, outcome);
    result
}

/// Installs the global Prometheus recorder. Call once per process.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}
