//! Building a backup into the blob store.

use anyhow::{Context, Result};
use std::io::{self, Seek};
use std::time::Instant;
use tempfile::NamedTempFile;

use super::archive::write_archive;
use super::layout::StateLayout;
use crate::daemon::services::blob::{BlobService, BlobWriter, ObjectMeta};

/// Archives the current state and publishes it under `name`.
///
/// The archive is assembled in the data dir's scratch area and then copied
/// into a create-only blob writer. Nothing is visible in the store until
/// the writer finishes; on any error the writer is aborted, so a failed
/// attempt leaves no object behind.
pub(crate) async fn create_snapshot(
    blobs: &BlobService,
    layout: &StateLayout,
    name: &str,
) -> Result<ObjectMeta> {
    let started = Instant::now();

    let build_layout = layout.clone();
    let staged = tokio::task::spawn_blocking(move || build(&build_layout))
        .await
        .context("Snapshot build task failed")??;

    let writer = blobs.writer(name).await?;
    let meta = tokio::task::spawn_blocking(move || publish(staged, writer))
        .await
        .context("Snapshot upload task failed")??;

    tracing::info!(
        backup = %meta.key,
        size = meta.size,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Backup created"
    );
    Ok(meta)
}

fn build(layout: &StateLayout) -> Result<NamedTempFile> {
    layout.ensure()?;
    let temp = layout.temp_path();
    let scratch = tempfile::Builder::new()
        .prefix("snapshot_")
        .tempdir_in(&temp)
        .context("Failed to create snapshot scratch directory")?;
    let archive = NamedTempFile::new_in(&temp).context("Failed to create archive file")?;

    write_archive(archive, layout, scratch.path())
}

fn publish(mut staged: NamedTempFile, mut writer: Box<dyn BlobWriter>) -> Result<ObjectMeta> {
    let copied = staged
        .as_file_mut()
        .rewind()
        .and_then(|()| io::copy(staged.as_file_mut(), &mut writer));

    if let Err(err) = copied {
        if let Err(abort_err) = writer.abort() {
            tracing::warn!(error = %abort_err, "Failed to discard partial backup");
        }
        return Err(anyhow::Error::new(err).context("Failed to write backup to store"));
    }
    writer.finish()
}
