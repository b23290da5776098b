//! Request authentication extractors.

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};

use super::audit::{AuditEvent, log_audit_event};
use super::{AppError, SharedState};
use crate::auth::Caller;

/// A caller holding a valid superuser session. Rejects with 401.
#[derive(Debug, Clone)]
pub struct Superuser(pub String);

impl FromRequestParts<SharedState> for Superuser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let reason = match Caller::classify(header, &state.sessions) {
            Caller::Superuser(id) => return Ok(Self(id)),
            Caller::Record(_) => "not a superuser",
            Caller::Anonymous => "missing or invalid session",
        };

        log_audit_event(AuditEvent::AuthFailure {
            path: parts.uri.path().to_string(),
            reason,
        });
        Err(AppError::Unauthorized(
            "The request requires valid superuser authorization token to be set.".into(),
        ))
    }
}
