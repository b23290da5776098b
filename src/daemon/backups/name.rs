//! Backup key rules.

use chrono::{DateTime, Utc};

use super::error::BackupError;
use crate::daemon::services::blob::is_reserved_key;

/// Prefix of names generated for manual backups.
pub const BACKUP_PREFIX: &str = "pb_backup_";

/// Prefix of names generated by the scheduler.
pub const AUTO_BACKUP_PREFIX: &str = "@auto_pb_backup_";

pub const ARCHIVE_EXTENSION: &str = ".zip";

/// Longest accepted key, extension included.
pub const MAX_NAME_LEN: usize = 150;

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '@')
}

fn is_key_start(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '@')
}

/// Builds a time-based name such as `pb_backup_20240131120000.zip`.
pub fn generate_name(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{prefix}{}{ARCHIVE_EXTENSION}", now.format("%Y%m%d%H%M%S"))
}

/// True when `key` may name a stored backup. Anything else cannot exist
/// in the store, including the names the store reserves for itself.
pub fn is_safe_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars.next().is_some_and(is_key_start)
        && chars.all(is_key_char)
        && key.len() <= MAX_NAME_LEN
        && !is_reserved_key(key)
}

/// Validates a caller-supplied backup name.
///
/// # Errors
///
/// Returns a field error on `name` for an empty, overlong or malformed name.
pub fn validate_name(name: &str) -> Result<(), BackupError> {
    if name.is_empty() {
        return Err(BackupError::validation(
            "name",
            "validation_required",
            "Cannot be blank.",
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(BackupError::validation(
            "name",
            "validation_length_out_of_range",
            format!("The length must be at most {MAX_NAME_LEN}."),
        ));
    }

    let stem_ok = name
        .strip_suffix(ARCHIVE_EXTENSION)
        .is_some_and(|stem| !stem.is_empty());
    if !stem_ok || !is_safe_key(name) {
        return Err(BackupError::validation(
            "name",
            "validation_match_invalid",
            "Must be in the correct format.",
        ));
    }

    Ok(())
}

/// Derives a store key from an uploaded file's original name.
///
/// Path components are stripped and characters outside the key set become
/// `_`. Returns `None` when nothing usable remains.
pub fn sanitize_upload_name(filename: &str) -> Option<String> {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let mut key: String = base
        .chars()
        .map(|c| if is_key_char(c) { c } else { '_' })
        .collect();

    if key.chars().next().is_some_and(|c| !is_key_start(c)) {
        key.replace_range(..1, "_");
    }
    if key.len() > MAX_NAME_LEN {
        // Key chars are ASCII so any byte index is a boundary
        key.truncate(MAX_NAME_LEN);
    }

    (!key.is_empty() && key.chars().any(|c| c.is_ascii_alphanumeric())).then_some(key)
}
