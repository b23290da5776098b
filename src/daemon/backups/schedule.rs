//! Cron-driven automatic backups.

use anyhow::{Context, Result};
use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};

use super::name::{AUTO_BACKUP_PREFIX, generate_name};
use super::{BackupError, BackupService};

/// Starts a scheduler that creates an automatic backup on every tick of
/// `cron`. The returned scheduler must be kept alive.
///
/// # Errors
///
/// Returns an error if the expression is invalid or the scheduler fails
/// to start.
pub async fn start_schedule(service: BackupService, cron: &str) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .context("Failed to create backup scheduler")?;

    let job = Job::new_async(cron, move |_id, _scheduler| {
        let service = service.clone();
        Box::pin(async move {
            run_auto_backup(&service).await;
        })
    })
    .with_context(|| format!("Invalid backup cron expression: {cron}"))?;

    scheduler
        .add(job)
        .await
        .context("Failed to register backup job")?;
    scheduler
        .start()
        .await
        .context("Failed to start backup scheduler")?;

    tracing::info!(%cron, "Automatic backups scheduled");
    Ok(scheduler)
}

/// Creates one automatic backup. A busy lock skips the run.
pub async fn run_auto_backup(service: &BackupService) -> Option<String> {
    let name = generate_name(AUTO_BACKUP_PREFIX, Utc::now());
    match service.create_named(name).await {
        Ok(info) => {
            crate::daemon::http::metrics::record_backup_operation("auto", "ok");
            Some(info.key)
        },
        Err(BackupError::Conflict(_)) => {
            crate::daemon::http::metrics::record_backup_operation("auto", "skipped");
            tracing::warn!("Skipping automatic backup, another backup operation is active");
            None
        },
        Err(err) => {
            crate::daemon::http::metrics::record_backup_operation("auto", err.kind());
            tracing::error!(error = %err, "Automatic backup failed");
            None
        },
    }
}
