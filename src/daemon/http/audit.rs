//! Security audit logging for the backup API.
//!
//! Everything here goes to the `audit` tracing target so it can be routed
//! separately from request logs.

use tracing::{info, warn};

/// Security-relevant events worth keeping a trail of.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    /// Session-gated route called without superuser credentials
    AuthFailure { path: String, reason: &'static str },
    /// Download refused because of a missing or bad file token
    DownloadDenied { backup: String, reason: String },
    /// Archive handed out
    Download { backup: String, subject: String },
    BackupCreated { backup: String, actor: String },
    BackupUploaded { backup: String, actor: String },
    BackupDeleted { backup: String, actor: String },
    RestoreScheduled { backup: String, actor: String },
    FileTokenIssued { subject: String },
}

/// Log a security audit event with structured fields.
pub fn log_audit_event(event: AuditEvent) {
    match event {
        AuditEvent::AuthFailure { path, reason } => {
            warn!(
                target: "audit",
                event_type = "auth_failure",
                %path,
                reason,
                "Superuser authorization required"
            );
        },
        AuditEvent::DownloadDenied { backup, reason } => {
            warn!(
                target: "audit",
                event_type = "download_denied",
                %backup,
                %reason,
                "Backup download refused"
            );
        },
        AuditEvent::Download { backup, subject } => {
            info!(
                target: "audit",
                event_type = "download",
                %backup,
                %subject,
                "Backup downloaded"
            );
        },
        AuditEvent::BackupCreated { backup, actor } => {
            info!(
                target: "audit",
                event_type = "backup_created",
                %backup,
                %actor,
                "Backup created"
            );
        },
        AuditEvent::BackupUploaded { backup, actor } => {
            info!(
                target: "audit",
                event_type = "backup_uploaded",
                %backup,
                %actor,
                "Backup uploaded"
            );
        },
        AuditEvent::BackupDeleted { backup, actor } => {
            info!(
                target: "audit",
                event_type = "backup_deleted",
                %backup,
                %actor,
                "Backup deleted"
            );
        },
        AuditEvent::RestoreScheduled { backup, actor } => {
            warn!(
                target: "audit",
                event_type = "restore_scheduled",
                %backup,
                %actor,
                "Restore scheduled, server will restart"
            );
        },
        AuditEvent::FileTokenIssued { subject } => {
            info!(target: "audit", event_type = "file_token_issued", %subject, "File token issued");
        },
    }
}
