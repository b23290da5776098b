//! Streaming an externally produced archive into the store.

use anyhow::anyhow;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::io::Write;
use tokio::sync::mpsc;

use super::error::BackupError;
use super::name::{BACKUP_PREFIX, generate_name, sanitize_upload_name, validate_name};
use crate::daemon::services::blob::{AlreadyExists, BlobService, BlobWriter, ObjectMeta};

/// Local file header, empty archive, and spanned archive markers.
const ZIP_SIGNATURES: [&[u8; 4]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

/// Chunks buffered between the request and the blocking writer.
const UPLOAD_CHANNEL_DEPTH: usize = 8;

enum Chunk {
    Data(Bytes),
    Finish,
}

/// Picks the store key for an upload.
///
/// An explicit `name` field wins and must pass the normal name rules.
/// Otherwise the original filename is sanitized, and failing that a
/// time-based name is generated.
///
/// # Errors
///
/// Returns a field error on `name` when an explicit name is malformed.
pub fn resolve_upload_key(
    name: Option<&str>,
    filename: Option<&str>,
) -> Result<String, BackupError> {
    if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
        validate_name(name)?;
        return Ok(name.to_string());
    }
    Ok(filename
        .and_then(sanitize_upload_name)
        .unwrap_or_else(|| generate_name(BACKUP_PREFIX, chrono::Utc::now())))
}

pub(crate) fn duplicate_file() -> BackupError {
    BackupError::validation(
        "file",
        "validation_backup_name_exists",
        "Backup with the specified name already exists.",
    )
}

pub(crate) fn invalid_file_name() -> BackupError {
    BackupError::validation(
        "file",
        "validation_match_invalid",
        "The file name cannot be used as a backup name.",
    )
}

fn not_a_zip() -> BackupError {
    BackupError::validation(
        "file",
        "validation_invalid_zip",
        "The uploaded file must be a ZIP archive.",
    )
}

/// Copies `body` into a new object under `key`.
///
/// The first bytes are checked for a ZIP signature before anything is
/// written. The body is then fed to a blocking writer as it arrives; if the
/// body errors or ends early the writer is aborted and nothing is stored.
pub(crate) async fn store_stream<S, E>(
    blobs: &BlobService,
    key: &str,
    body: S,
) -> Result<ObjectMeta, BackupError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut body = std::pin::pin!(body);

    let mut head = Vec::new();
    while head.len() < 4 {
        match body.next().await {
            Some(Ok(chunk)) => head.extend_from_slice(&chunk),
            Some(Err(err)) => return Err(read_failed(err)),
            None => break,
        }
    }
    if !ZIP_SIGNATURES.iter().any(|sig| head.starts_with(*sig)) {
        return Err(not_a_zip());
    }

    let writer = blobs.writer(key).await?;
    let (tx, rx) = mpsc::channel(UPLOAD_CHANNEL_DEPTH);
    let task = tokio::task::spawn_blocking(move || write_chunks(writer, rx));

    let mut pending = Some(Bytes::from(head));
    let mut read_error = None;
    loop {
        let chunk = match pending.take() {
            Some(chunk) => chunk,
            None => match body.next().await {
                Some(Ok(chunk)) => chunk,
                Some(Err(err)) => {
                    read_error = Some(read_failed(err));
                    break;
                },
                None => {
                    // A closed receiver surfaces through the task result
                    tx.send(Chunk::Finish).await.ok();
                    break;
                },
            },
        };
        if tx.send(Chunk::Data(chunk)).await.is_err() {
            break;
        }
    }
    drop(tx);

    let result = task
        .await
        .map_err(|e| BackupError::Internal(anyhow!("upload writer task failed: {e}")))?;
    if let Some(err) = read_error {
        return Err(err);
    }
    result.map_err(|err| {
        if err.downcast_ref::<AlreadyExists>().is_some() {
            duplicate_file()
        } else {
            BackupError::Internal(err)
        }
    })
}

fn write_chunks(
    mut writer: Box<dyn BlobWriter>,
    mut rx: mpsc::Receiver<Chunk>,
) -> anyhow::Result<ObjectMeta> {
    loop {
        match rx.blocking_recv() {
            Some(Chunk::Data(bytes)) => {
                if let Err(err) = writer.write_all(&bytes) {
                    writer.abort().ok();
                    return Err(anyhow::Error::new(err).context("Failed to write uploaded backup"));
                }
            },
            Some(Chunk::Finish) => return writer.finish(),
            None => {
                writer.abort()?;
                anyhow::bail!("upload ended before completion");
            },
        }
    }
}

fn read_failed(err: impl std::fmt::Display) -> BackupError {
    tracing::debug!(error = %err, "Upload body read failed");
    BackupError::validation("file", "validation_invalid_file", "Failed to read the uploaded file.")
}
