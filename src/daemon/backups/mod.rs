//! Backup coordinator and restore engine.
//!
//! [`BackupService`] is the one entry point used by the HTTP handlers, the
//! scheduler and the CLI. It owns the [`BackupCoordinator`] that keeps
//! create and restore mutually exclusive, and it decides which checks run
//! synchronously (everything that can reject a request) and which work is
//! detached from the caller (the snapshot itself, and the whole restore).

mod archive;
mod coordinator;
mod error;
mod layout;
pub mod name;
mod restart;
mod restore;
mod schedule;
mod snapshot;
mod upload;

pub use coordinator::{ActiveBackup, BackupCoordinator, Busy};
pub use error::BackupError;
pub use layout::StateLayout;
pub use restart::{ProcessRestarter, RestartMode, Restarter};
pub use schedule::{run_auto_backup, start_schedule};
pub use upload::resolve_upload_key;

use anyhow::anyhow;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use std::sync::Arc;

use crate::daemon::services::blob::{AlreadyExists, BlobReader, BlobService, ObjectMeta};
use name::{BACKUP_PREFIX, generate_name, is_safe_key, validate_name};

/// One entry of the backup listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    pub key: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl From<ObjectMeta> for BackupInfo {
    fn from(meta: ObjectMeta) -> Self {
        Self {
            key: meta.key,
            size: meta.size,
            modified: meta.modified_at,
        }
    }
}

#[derive(Clone)]
pub struct BackupService {
    blobs: BlobService,
    coordinator: BackupCoordinator,
    layout: StateLayout,
    restarter: Arc<dyn Restarter>,
}

impl BackupService {
    pub fn new(blobs: BlobService, layout: StateLayout, restarter: Arc<dyn Restarter>) -> Self {
        Self {
            blobs,
            coordinator: BackupCoordinator::new(),
            layout,
            restarter,
        }
    }

    pub fn coordinator(&self) -> &BackupCoordinator {
        &self.coordinator
    }

    pub fn blobs(&self) -> &BlobService {
        &self.blobs
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    /// Lists every stored backup, sorted by key.
    pub async fn list(&self) -> Result<Vec<BackupInfo>, BackupError> {
        let objects = self.blobs.list(None).await?;
        Ok(objects.into_iter().map(BackupInfo::from).collect())
    }

    /// Creates a backup of the current state.
    ///
    /// A missing or blank `name` gets a time-based one. Returns once the
    /// archive is published; dropping the returned future does not cancel
    /// the snapshot.
    pub async fn create(&self, name: Option<&str>) -> Result<BackupInfo, BackupError> {
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => {
                validate_name(name)?;
                name.to_string()
            },
            None => generate_name(BACKUP_PREFIX, Utc::now()),
        };
        self.create_named(name).await
    }

    pub(crate) async fn create_named(&self, name: String) -> Result<BackupInfo, BackupError> {
        let guard = self
            .coordinator
            .try_acquire(&name)
            .map_err(|_| BackupError::busy())?;

        if self.blobs.exists(&name).await? {
            return Err(duplicate_name());
        }

        let blobs = self.blobs.clone();
        let layout = self.layout.clone();
        let task = tokio::spawn(async move {
            let result = snapshot::create_snapshot(&blobs, &layout, guard.name()).await;
            drop(guard);
            result
        });

        let meta = task
            .await
            .map_err(|e| BackupError::Internal(anyhow!("backup task failed: {e}")))?
            .map_err(|err| {
                if err.downcast_ref::<AlreadyExists>().is_some() {
                    duplicate_name()
                } else {
                    tracing::error!(backup = %name, error = %format!("{err:#}"), "Backup failed");
                    BackupError::Internal(err)
                }
            })?;
        Ok(meta.into())
    }

    /// Stores an uploaded archive under `key`.
    ///
    /// Uploads never take the lock, but a key that is the target of the
    /// in-flight operation counts as taken.
    pub async fn upload<S, E>(&self, key: &str, body: S) -> Result<BackupInfo, BackupError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        if !is_safe_key(key) {
            return Err(upload::invalid_file_name());
        }
        if self.coordinator.is_active_name(key) || self.blobs.exists(key).await? {
            return Err(upload::duplicate_file());
        }
        let meta = upload::store_stream(&self.blobs, key, body).await?;
        tracing::info!(backup = %meta.key, size = meta.size, "Backup uploaded");
        Ok(meta.into())
    }

    /// Opens a stored archive for download.
    pub async fn open(&self, name: &str) -> Result<(BlobReader, BackupInfo), BackupError> {
        if !is_safe_key(name) {
            return Err(BackupError::not_found(name));
        }
        let (reader, meta) = self
            .blobs
            .reader(name)
            .await?
            .ok_or_else(|| BackupError::not_found(name))?;
        Ok((reader, meta.into()))
    }

    /// Deletes a stored archive.
    ///
    /// Only the name held by the in-flight operation is protected; other
    /// backups can be deleted while a snapshot or restore runs.
    pub async fn delete(&self, name: &str) -> Result<(), BackupError> {
        if !is_safe_key(name) {
            return Err(BackupError::not_found(name));
        }
        if self.coordinator.is_active_name(name) {
            return Err(BackupError::Conflict(
                "The backup is currently being used and cannot be deleted.".into(),
            ));
        }
        if !self.blobs.delete(name).await? {
            return Err(BackupError::not_found(name));
        }
        tracing::info!(backup = %name, "Backup deleted");
        Ok(())
    }

    /// Schedules a restore from `name`.
    ///
    /// Returns as soon as the preconditions pass and the lock is taken. The
    /// restore then runs on its own task and ends the process on success.
    pub async fn restore(&self, name: &str) -> Result<(), BackupError> {
        if !is_safe_key(name) || self.blobs.head(name).await?.is_none() {
            return Err(BackupError::not_found(name));
        }
        let guard = self
            .coordinator
            .try_acquire(name)
            .map_err(|_| BackupError::busy())?;

        tokio::spawn(restore::run_restore(
            self.blobs.clone(),
            self.layout.clone(),
            guard,
            Arc::clone(&self.restarter),
        ));
        tracing::info!(backup = %name, "Restore scheduled");
        Ok(())
    }
}

fn duplicate_name() -> BackupError {
    BackupError::validation(
        "name",
        "validation_backup_name_exists",
        "Backup with the specified name already exists.",
    )
}
