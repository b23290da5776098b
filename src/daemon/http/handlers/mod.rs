//! HTTP API handlers organized by resource.

pub mod backups;
pub mod files;
pub mod health;

// Re-export all handlers for use in routing
pub(crate) use backups::{
    backups_create, backups_delete, backups_download, backups_list, backups_restore,
    backups_upload,
};
pub(crate) use files::files_token;
pub(crate) use health::{health, metrics};
