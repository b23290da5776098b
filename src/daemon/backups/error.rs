//! Error taxonomy of the backup API.

use thiserror::Error;

/// Failure of a backup operation.
///
/// Every variant except `Internal` is detected before anything is mutated.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Bad input tied to one request field.
    #[error("{message}")]
    Validation {
        field: &'static str,
        code: &'static str,
        message: String,
    },

    /// Another create or restore holds the lock, or the target is in use.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BackupError {
    pub(crate) fn validation(
        field: &'static str,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field,
            code,
            message: message.into(),
        }
    }

    pub(crate) fn busy() -> Self {
        Self::Conflict(
            "Try again later - another backup/restore operation has already been started.".into(),
        )
    }

    pub(crate) fn not_found(name: &str) -> Self {
        Self::NotFound(format!("Missing or invalid backup file: {name}"))
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal",
        }
    }
}
