//! Backup management handlers.
//!
//! Everything except download requires a superuser session. Download is
//! gated only by a file-access token in the `token` query parameter; the
//! `Authorization` header is never consulted there.

use axum::{
    Json,
    body::{Body, Bytes},
    extract::{
        Multipart, Path, Query, State, multipart::MultipartRejection, rejection::QueryRejection,
    },
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use std::io::Read;
use tokio::sync::mpsc;

use super::super::audit::{AuditEvent, log_audit_event};
use super::super::auth::Superuser;
use super::super::metrics::track;
use super::super::{AppError, SharedState};
use crate::daemon::backups::{BackupInfo, resolve_upload_key};
use crate::daemon::services::blob::BlobReader;

/// Read size for streaming an archive out.
const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CreateBackupRequest {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DownloadQuery {
    #[serde(default)]
    token: Option<String>,
}

/// GET /api/backups - List all backups.
pub(crate) async fn backups_list(
    State(state): State<SharedState>,
    _user: Superuser,
) -> Result<Json<Vec<BackupInfo>>, AppError> {
    let backups = track("list", state.backups.list().await)?;
    Ok(Json(backups))
}

/// POST /api/backups - Create a backup, optionally with a given name.
pub(crate) async fn backups_create(
    State(state): State<SharedState>,
    Superuser(actor): Superuser,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let request: CreateBackupRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateBackupRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?
    };

    let info = track("create", state.backups.create(request.name.as_deref()).await)?;
    log_audit_event(AuditEvent::BackupCreated {
        backup: info.key,
        actor,
    });
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/backups/upload - Store an externally produced archive.
///
/// Expects a multipart `file` field and an optional `name` field. A `name`
/// field must come before `file` to take effect.
pub(crate) async fn backups_upload(
    State(state): State<SharedState>,
    Superuser(actor): Superuser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<StatusCode, AppError> {
    let missing_file = || AppError::Validation {
        field: "file",
        code: "validation_required",
        message: "Missing required file.".into(),
    };
    let mut multipart = multipart.map_err(|_| missing_file())?;

    let mut name: Option<String> = None;
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
            .ok_or_else(missing_file)?;

        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("name") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid name field: {e}")))?;
                name = Some(text);
            },
            Some("file") => {
                let key = resolve_upload_key(name.as_deref(), field.file_name())?;
                let info = track("upload", state.backups.upload(&key, field).await)?;
                log_audit_event(AuditEvent::BackupUploaded {
                    backup: info.key,
                    actor,
                });
                return Ok(StatusCode::NO_CONTENT);
            },
            _ => {},
        }
    }
}

/// GET /api/backups/{name}?token=... - Download an archive.
pub(crate) async fn backups_download(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let token = query.ok().and_then(|Query(q)| q.token).unwrap_or_default();

    let subject = match state.file_tokens.verify(&token) {
        Ok(subject) => subject,
        Err(err) => {
            crate::daemon::http::metrics::record_backup_operation("download", "forbidden");
            log_audit_event(AuditEvent::DownloadDenied {
                backup: name,
                reason: err.to_string(),
            });
            return Err(AppError::Forbidden(
                "Insufficient permissions to access the file resource.".into(),
            ));
        },
    };

    let (reader, info) = track("download", state.backups.open(&name).await)?;
    log_audit_event(AuditEvent::Download {
        backup: info.key.clone(),
        subject,
    });

    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        utf8_percent_encode(&info.key, NON_ALPHANUMERIC)
    );
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| AppError::Internal(format!("Invalid header value: {e}")))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(info.size)),
        ],
        Body::from_stream(stream_reader(reader)),
    )
        .into_response())
}

/// DELETE /api/backups/{name} - Delete an archive.
pub(crate) async fn backups_delete(
    State(state): State<SharedState>,
    Superuser(actor): Superuser,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    track("delete", state.backups.delete(&name).await)?;
    log_audit_event(AuditEvent::BackupDeleted {
        backup: name,
        actor,
    });
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/backups/{name}/restore - Schedule a restore.
pub(crate) async fn backups_restore(
    State(state): State<SharedState>,
    Superuser(actor): Superuser,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    track("restore", state.backups.restore(&name).await)?;
    log_audit_event(AuditEvent::RestoreScheduled {
        backup: name,
        actor,
    });
    Ok(StatusCode::NO_CONTENT)
}

/// Pumps a blocking reader into an async byte stream.
fn stream_reader(
    mut reader: BlobReader,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(4);

    tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; DOWNLOAD_CHUNK_SIZE];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                        // Client went away
                        break;
                    }
                },
                Err(err) => {
                    tx.blocking_send(Err(err)).ok();
                    break;
                },
            }
        }
    });

    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
}
