//! Filesystem-backed blob store.
//!
//! Backups are plain files in one directory with metadata tracked in redb.
//! Writes land in a hidden staging directory on the same filesystem and are
//! published with a no-clobber rename, so a listing never shows a partial
//! archive and an existing archive is never overwritten.

use super::backend::{BlobReader, BlobStore, BlobWriter};
use super::metadata::{load_metadata, metadata_from_file, reconcile, remove_metadata, save_metadata};
use super::types::{
    AlreadyExists, METADATA_DB, OBJECTS_TABLE, ObjectMeta, STAGING_DIR, guess_content_type,
};
use super::validation::{normalize_key, object_path};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use redb::Database;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Filesystem-backed blob store.
///
/// `FilesystemBlobStore` is `Clone` and can be shared across threads. The
/// underlying database handles concurrent access safely.
#[derive(Clone)]
pub struct FilesystemBlobStore {
    base_dir: PathBuf,
    db: Arc<Database>,
}

impl FilesystemBlobStore {
    /// Creates or opens the blob store at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - The metadata database cannot be opened or initialized
    /// - Metadata reconciliation fails
    pub fn open<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();

        fs::create_dir_all(&base_dir).with_context(|| {
            format!("Failed to create backups directory: {}", base_dir.display())
        })?;

        let db_path = base_dir.join(METADATA_DB);
        let db = Database::create(&db_path).with_context(|| {
            format!(
                "Failed to open backups metadata database: {}",
                db_path.display()
            )
        })?;

        let write_txn = db
            .begin_write()
            .context("Failed to begin initialization transaction")?;
        {
            let _table = write_txn
                .open_table(OBJECTS_TABLE)
                .context("Failed to initialize objects table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initialization transaction")?;

        let store = Self {
            base_dir,
            db: Arc::new(db),
        };

        reconcile(&store.db, &store.base_dir)?;

        Ok(store)
    }

    /// Root directory of the store.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn staging_dir(&self) -> PathBuf {
        self.base_dir.join(STAGING_DIR)
    }

    fn head_sync(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let key = normalize_key(key)?;
        let file_path = object_path(&self.base_dir, &key)?;

        if !file_path.is_file() {
            return Ok(None);
        }

        if let Some(meta) = load_metadata(&self.db, &key)? {
            return Ok(Some(meta));
        }

        // File exists but no metadata - reconstruct from filesystem
        metadata_from_file(&key, &file_path).map(Some)
    }

    fn writer_sync(&self, key: &str) -> Result<Box<dyn BlobWriter>> {
        let key = normalize_key(key)?;
        let target = object_path(&self.base_dir, &key)?;
        let staging = self.staging_dir();

        fs::create_dir_all(&staging).with_context(|| {
            format!("Failed to create staging directory: {}", staging.display())
        })?;
        let file = NamedTempFile::new_in(&staging)
            .with_context(|| format!("Failed to allocate staging file for: {key}"))?;

        Ok(Box::new(FilesystemWriter {
            file,
            target,
            content_type: guess_content_type(&key),
            key,
            written: 0,
            db: Arc::clone(&self.db),
        }))
    }

    fn reader_sync(&self, key: &str) -> Result<Option<(BlobReader, ObjectMeta)>> {
        let Some(meta) = self.head_sync(key)? else {
            return Ok(None);
        };
        let file_path = object_path(&self.base_dir, &meta.key)?;

        match File::open(&file_path) {
            Ok(file) => Ok(Some((Box::new(file), meta))),
            // Deleted between head and open
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to open object: {}", meta.key)),
        }
    }

    fn delete_sync(&self, key: &str) -> Result<bool> {
        let key = normalize_key(key)?;
        let file_path = object_path(&self.base_dir, &key)?;

        if !file_path.is_file() {
            // Also remove metadata if it exists (cleanup orphaned entries)
            remove_metadata(&self.db, &key)?;
            return Ok(false);
        }

        fs::remove_file(&file_path).with_context(|| format!("Failed to delete object: {key}"))?;
        remove_metadata(&self.db, &key)?;

        Ok(true)
    }

    fn list_sync(&self, prefix: Option<&str>) -> Result<Vec<ObjectMeta>> {
        use redb::{ReadableDatabase, ReadableTable};

        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;

        let table = read_txn
            .open_table(OBJECTS_TABLE)
            .context("Failed to open objects table")?;

        let mut objects = Vec::new();

        for item in table.iter().context("Failed to iterate objects table")? {
            let (key, value) = item.context("Failed to read object entry")?;

            if let Some(prefix) = prefix
                && !key.value().starts_with(prefix)
            {
                continue;
            }

            if let Ok(meta) = serde_json::from_slice::<ObjectMeta>(value.value()) {
                objects.push(meta);
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(objects)
    }
}

/// Staged write for one object of a [`FilesystemBlobStore`].
struct FilesystemWriter {
    file: NamedTempFile,
    target: PathBuf,
    key: String,
    content_type: String,
    written: u64,
    db: Arc<Database>,
}

impl Write for FilesystemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl BlobWriter for FilesystemWriter {
    fn finish(self: Box<Self>) -> Result<ObjectMeta> {
        let Self {
            mut file,
            target,
            key,
            content_type,
            written,
            db,
        } = *self;

        file.flush()
            .with_context(|| format!("Failed to flush object: {key}"))?;
        file.as_file()
            .sync_all()
            .with_context(|| format!("Failed to sync object: {key}"))?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directories for: {key}"))?;
        }

        // The staged file is removed by its own Drop if publishing fails
        file.persist_noclobber(&target).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                anyhow::Error::new(AlreadyExists(key.clone()))
            } else {
                anyhow::Error::new(e.error).context(format!("Failed to publish object: {key}"))
            }
        })?;

        let now = Utc::now();
        let meta = ObjectMeta {
            key: key.clone(),
            size: written,
            content_type,
            created_at: now,
            modified_at: now,
        };

        if let Err(e) = save_metadata(&db, &meta) {
            // Keep file and metadata in step: an unrecorded object is rolled back
            if let Err(cleanup) = fs::remove_file(&target) {
                tracing::warn!(
                    key = %key,
                    error = %cleanup,
                    "Failed to roll back published object"
                );
            }
            return Err(e);
        }

        Ok(meta)
    }

    fn abort(self: Box<Self>) -> Result<()> {
        let Self { file, key, .. } = *self;
        file.close()
            .with_context(|| format!("Failed to discard staged object: {key}"))
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectMeta>> {
        let store = self.clone();
        let prefix = prefix.map(std::string::ToString::to_string);
        tokio::task::spawn_blocking(move || store.list_sync(prefix.as_deref()))
            .await
            .context("Task join error")?
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let store = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.head_sync(&key))
            .await
            .context("Task join error")?
    }

    async fn writer(&self, key: &str) -> Result<Box<dyn BlobWriter>> {
        let store = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.writer_sync(&key))
            .await
            .context("Task join error")?
    }

    async fn reader(&self, key: &str) -> Result<Option<(BlobReader, ObjectMeta)>> {
        let store = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.reader_sync(&key))
            .await
            .context("Task join error")?
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let store = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.delete_sync(&key))
            .await
            .context("Task join error")?
    }
}
