//! Pluggable object storage for backup archives.
//!
//! The backup core only needs list, read-stream, write-stream and delete,
//! keyed by string. Backends implement [`BlobStore`]; [`BlobService`] wraps
//! whichever one the configuration selects.
//!
//! # Async Usage
//!
//! Trait methods are async. The readers and writers they hand out are
//! blocking `std::io` streams and belong inside `spawn_blocking`.

mod backend;
mod filesystem;
mod memory;
mod metadata;
mod types;
mod validation;

pub use backend::{BlobReader, BlobStore, BlobWriter};
pub use filesystem::FilesystemBlobStore;
pub use memory::MemoryBlobStore;
pub use types::{AlreadyExists, ObjectMeta};
pub use validation::is_reserved_key;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::config::BlobBackendKind;

/// High-level blob store handle.
///
/// `BlobService` is `Clone` and can be shared across threads.
///
/// # Example
///
/// ```ignore
/// use backupd::daemon::services::blob::BlobService;
///
/// let blobs = BlobService::memory();
/// let mut writer = blobs.writer("test.zip").await?;
/// writer.write_all(&archive_bytes)?;
/// writer.finish()?;
/// ```
#[derive(Clone)]
pub struct BlobService {
    backend: Arc<dyn BlobStore>,
}

impl BlobService {
    /// Creates a `BlobService` backed by a filesystem directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or opened.
    pub fn file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let backend = FilesystemBlobStore::open(path)?;
        Ok(Self {
            backend: Arc::new(backend),
        })
    }

    /// Creates a `BlobService` backed by an in-memory store.
    pub fn memory() -> Self {
        Self {
            backend: Arc::new(MemoryBlobStore::new()),
        }
    }

    /// Creates a `BlobService` with a custom backend, such as an adapter
    /// for a remote object store.
    pub fn custom<B: BlobStore>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Selects the backend named by configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem backend cannot be opened.
    pub fn from_kind<P: AsRef<Path>>(kind: BlobBackendKind, dir: P) -> Result<Self> {
        match kind {
            BlobBackendKind::Filesystem => Self::file(dir),
            BlobBackendKind::Memory => Ok(Self::memory()),
        }
    }

    /// Lists finalized objects sorted by key.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectMeta>> {
        self.backend.list(prefix).await
    }

    /// Retrieves metadata for one object.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or metadata cannot be read.
    pub async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        self.backend.head(key).await
    }

    /// Returns true if a finalized object exists under exactly `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or metadata cannot be read.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.backend.head(key).await?.is_some())
    }

    /// Opens a create-only write stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or staging fails.
    pub async fn writer(&self, key: &str) -> Result<Box<dyn BlobWriter>> {
        self.backend.writer(key).await
    }

    /// Opens a finalized object for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the object cannot be opened.
    pub async fn reader(&self, key: &str) -> Result<Option<(BlobReader, ObjectMeta)>> {
        self.backend.reader(key).await
    }

    /// Deletes an object. Returns `Ok(false)` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or deletion fails.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.backend.delete(key).await
    }
}
