//! Types and constants for the blob store.

use chrono::{DateTime, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};

/// Table for object metadata storage
pub(crate) const OBJECTS_TABLE: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("objects");

/// Name of the metadata database inside the blob directory.
pub(crate) const METADATA_DB: &str = "metadata.redb";

/// Hidden directory holding objects that are still being written.
pub(crate) const STAGING_DIR: &str = ".staging";

/// Metadata for a stored object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Key of the object (e.g., "pb_backup_20240101120000.zip")
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// MIME content type
    pub content_type: String,
    /// Timestamp when object was created
    pub created_at: DateTime<Utc>,
    /// Timestamp when object was last modified
    pub modified_at: DateTime<Utc>,
}

/// Returned (inside `anyhow::Error`) when publishing a key that already exists.
///
/// Writers never overwrite: callers can `downcast_ref::<AlreadyExists>()`
/// to tell a lost race on a key apart from an I/O failure.
#[derive(Debug, thiserror::Error)]
#[error("object already exists: {0}")]
pub struct AlreadyExists(pub String);

pub(crate) fn guess_content_type(key: &str) -> String {
    mime_guess::from_path(key)
        .first()
        .map_or_else(|| "application/octet-stream".to_string(), |m| m.to_string())
}
