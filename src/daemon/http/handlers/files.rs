//! File-access token issuance.

use axum::{Json, extract::State};
use serde::Serialize;

use super::super::audit::{AuditEvent, log_audit_event};
use super::super::auth::Superuser;
use super::super::{AppError, SharedState};

#[derive(Debug, Serialize)]
pub(crate) struct FileTokenResponse {
    token: String,
}

/// POST /api/files/token - Issue a short-lived download token.
pub(crate) async fn files_token(
    State(state): State<SharedState>,
    Superuser(subject): Superuser,
) -> Result<Json<FileTokenResponse>, AppError> {
    let token = state
        .file_tokens
        .issue(&subject)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    log_audit_event(AuditEvent::FileTokenIssued { subject });
    Ok(Json(FileTokenResponse { token }))
}
