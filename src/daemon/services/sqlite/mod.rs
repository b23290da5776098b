//! SQLite-backed structured-data stores.
//!
//! The server keeps its structured state in one or more SQLite files inside
//! the data directory. For backups each file is copied with SQLite's online
//! backup API, which yields a transactionally consistent image even while
//! other connections keep writing.

use anyhow::{Context, Result};
use rusqlite::backup::Backup;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pages copied per backup step before yielding to writers.
const BACKUP_PAGES_PER_STEP: i32 = 256;

/// Pause between backup steps.
const BACKUP_STEP_PAUSE: Duration = Duration::from_millis(5);

/// One SQLite database file of the live server state.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    name: String,
    path: PathBuf,
}

impl SqliteStore {
    /// Opens (creating if necessary) the store `name` inside `data_dir`.
    ///
    /// The database is switched to WAL mode so backups never block readers.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created.
    pub fn open<P: AsRef<Path>>(data_dir: P, name: &str) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let path = data_dir.join(name);
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open data store: {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .with_context(|| format!("Failed to enable WAL for: {name}"))?;

        Ok(Self {
            name: name.to_string(),
            path,
        })
    }

    /// File name of the store, also its entry name inside an archive.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Live path of the store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a consistent copy of the store to `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if either database cannot be opened or the backup
    /// fails part-way (the partial `dest` is left for the caller to discard).
    pub fn snapshot_to(&self, dest: &Path) -> Result<()> {
        let src = Connection::open(&self.path)
            .with_context(|| format!("Failed to open data store for backup: {}", self.name))?;
        let mut dst = Connection::open(dest)
            .with_context(|| format!("Failed to create snapshot file: {}", dest.display()))?;

        let backup = Backup::new(&src, &mut dst)
            .with_context(|| format!("Failed to start online backup of: {}", self.name))?;
        backup
            .run_to_completion(BACKUP_PAGES_PER_STEP, BACKUP_STEP_PAUSE, None)
            .with_context(|| format!("Online backup of {} failed", self.name))?;
        drop(backup);

        // The copy is a standalone file; it must not expect a WAL beside it
        dst.pragma_update(None, "journal_mode", "DELETE")
            .with_context(|| format!("Failed to finalize snapshot of {}", self.name))?;

        Ok(())
    }
}

/// Checks that `path` holds a readable SQLite database.
///
/// # Errors
///
/// Returns an error if the file is not a database or fails `quick_check`.
pub fn verify_database(path: &Path) -> Result<()> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Failed to open database: {}", path.display()))?;
    let status: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .with_context(|| format!("Not a valid database: {}", path.display()))?;
    if status != "ok" {
        anyhow::bail!("Database integrity check failed for {}: {status}", path.display());
    }
    Ok(())
}
