//! Metadata database operations for the filesystem blob store.
//!
//! Handles saving, loading, and removing object metadata from the redb database,
//! as well as reconciliation between the backups directory and the metadata database.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use super::types::{METADATA_DB, OBJECTS_TABLE, ObjectMeta, STAGING_DIR, guess_content_type};

/// Saves object metadata to the database.
pub(crate) fn save_metadata(db: &Database, meta: &ObjectMeta) -> Result<()> {
    let write_txn = db
        .begin_write()
        .context("Failed to begin write transaction")?;

    {
        let mut table = write_txn
            .open_table(OBJECTS_TABLE)
            .context("Failed to open objects table")?;

        let json = serde_json::to_vec(meta).context("Failed to serialize object metadata")?;

        table
            .insert(meta.key.as_str(), json.as_slice())
            .with_context(|| format!("Failed to insert object metadata: {}", meta.key))?;
    }

    write_txn
        .commit()
        .context("Failed to commit metadata save transaction")?;

    Ok(())
}

/// Loads object metadata from the database.
pub(crate) fn load_metadata(db: &Database, key: &str) -> Result<Option<ObjectMeta>> {
    let read_txn = db
        .begin_read()
        .context("Failed to begin read transaction")?;

    let table = read_txn
        .open_table(OBJECTS_TABLE)
        .context("Failed to open objects table")?;

    let result = table
        .get(key)
        .with_context(|| format!("Failed to read object metadata: {key}"))?;

    match result {
        Some(guard) => {
            let meta = serde_json::from_slice(guard.value())
                .with_context(|| format!("Failed to deserialize object metadata: {key}"))?;
            Ok(Some(meta))
        },
        None => Ok(None),
    }
}

/// Removes object metadata from the database.
pub(crate) fn remove_metadata(db: &Database, key: &str) -> Result<()> {
    let write_txn = db
        .begin_write()
        .context("Failed to begin write transaction")?;

    {
        let mut table = write_txn
            .open_table(OBJECTS_TABLE)
            .context("Failed to open objects table")?;

        table
            .remove(key)
            .with_context(|| format!("Failed to remove object metadata: {key}"))?;
    }

    write_txn
        .commit()
        .context("Failed to commit metadata removal transaction")?;

    Ok(())
}

/// Builds metadata for a file that exists on disk but was never recorded.
pub(crate) fn metadata_from_file(key: &str, path: &Path) -> Result<ObjectMeta> {
    let file_meta =
        fs::metadata(path).with_context(|| format!("Failed to get file metadata: {key}"))?;
    let modified_at = file_meta
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Ok(ObjectMeta {
        key: key.to_string(),
        size: file_meta.len(),
        content_type: guess_content_type(key),
        created_at: modified_at,
        modified_at,
    })
}

/// Reconciles the metadata database with the backups directory.
///
/// Called on open to handle archives copied in or removed by an operator
/// while the server was down, and to sweep staging leftovers from a crash
/// in the middle of a write.
pub(crate) fn reconcile(db: &Database, base_dir: &Path) -> Result<()> {
    tracing::debug!(base_dir = %base_dir.display(), "Reconciling backup metadata");

    // Writes that never finished are discarded
    let staging = base_dir.join(STAGING_DIR);
    if staging.exists() {
        fs::remove_dir_all(&staging).with_context(|| {
            format!("Failed to clear staging directory: {}", staging.display())
        })?;
    }

    let mut fs_files: HashSet<String> = HashSet::new();
    scan_directory(base_dir, base_dir, &mut fs_files)?;

    let mut orphaned_entries: Vec<String> = Vec::new();
    let mut stale_entries: Vec<String> = Vec::new();

    {
        let read_txn = db
            .begin_read()
            .context("Failed to begin read transaction for reconciliation")?;
        let table = read_txn
            .open_table(OBJECTS_TABLE)
            .context("Failed to open objects table for reconciliation")?;

        for item in table.iter().context("Failed to iterate objects table")? {
            let (key, value) = item.context("Failed to read object entry")?;
            let key = key.value().to_string();

            if fs_files.remove(&key) {
                if let Ok(meta) = serde_json::from_slice::<ObjectMeta>(value.value())
                    && let Ok(file_meta) = fs::metadata(base_dir.join(&key))
                    && file_meta.len() != meta.size
                {
                    stale_entries.push(key);
                }
            } else {
                orphaned_entries.push(key);
            }
        }
    }

    for key in &orphaned_entries {
        remove_metadata(db, key)?;
    }

    for key in fs_files.iter().chain(stale_entries.iter()) {
        let meta = metadata_from_file(key, &base_dir.join(key))?;
        save_metadata(db, &meta)?;
    }

    let total_fixes = orphaned_entries.len() + fs_files.len() + stale_entries.len();
    if total_fixes > 0 {
        tracing::info!(
            orphaned = orphaned_entries.len(),
            untracked = fs_files.len(),
            stale = stale_entries.len(),
            "Backup metadata reconciliation complete"
        );
    } else {
        tracing::debug!("Backup metadata is consistent with filesystem");
    }

    Ok(())
}

/// Recursively scans a directory and collects relative paths to files.
fn scan_directory(base_dir: &Path, dir: &Path, files: &mut HashSet<String>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let entry = entry.context("Failed to read directory entry")?;
        let path = entry.path();

        if path
            .file_name()
            .is_some_and(|n| n == METADATA_DB || n == STAGING_DIR)
        {
            continue;
        }
        // Skip redb lock files
        if path.extension().is_some_and(|e| e == "lock") {
            continue;
        }

        if path.is_dir() {
            scan_directory(base_dir, &path, files)?;
        } else if path.is_file()
            && let Ok(relative) = path.strip_prefix(base_dir)
        {
            files.insert(relative.to_string_lossy().replace('\\', "/"));
        }
    }

    Ok(())
}
