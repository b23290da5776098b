//! JSON error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};

use crate::daemon::backups::BackupError;

/// Message returned for every internal failure; details only go to logs.
const INTERNAL_MESSAGE: &str = "Something went wrong while processing your request.";

/// Error type for HTTP handlers.
///
/// Every variant renders as `{"code", "message", "data"}` where `data`
/// carries per-field details and is always present.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{message}")]
    Validation {
        field: &'static str,
        code: &'static str,
        message: String,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) | Self::Validation { .. } | Self::NotFound(_) => {
                StatusCode::BAD_REQUEST
            },
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BackupError> for AppError {
    fn from(err: BackupError) -> Self {
        match err {
            BackupError::Validation {
                field,
                code,
                message,
            } => Self::Validation {
                field,
                code,
                message,
            },
            BackupError::Conflict(msg) => Self::BadRequest(msg),
            BackupError::NotFound(msg) => Self::NotFound(msg),
            BackupError::Internal(err) => err.into(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{err:#}"), "Request failed");
        Self::Internal(INTERNAL_MESSAGE.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut data = Map::new();

        let message = match self {
            Self::Validation {
                field,
                code,
                message,
            } => {
                data.insert(field.to_string(), json!({ "code": code, "message": message }));
                "Failed to process the request. Please check the submitted data.".to_string()
            },
            Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::NotFound(msg)
            | Self::Internal(msg) => msg,
        };

        let body = json!({
            "code": status.as_u16(),
            "message": message,
            "data": Value::Object(data),
        });
        (status, Json(body)).into_response()
    }
}
