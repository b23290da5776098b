//! Backend trait for the blob store.
//!
//! Defines the minimal capability surface every backup destination must
//! implement (filesystem, memory, or an external object store adapter).

use super::types::ObjectMeta;
use anyhow::Result;
use async_trait::async_trait;
use std::io::{Read, Write};

/// A blocking reader over a finalized object.
pub type BlobReader = Box<dyn Read + Send>;

/// A blocking, create-only write stream for one object.
///
/// Bytes written are invisible to `list`, `head` and `reader` until
/// [`BlobWriter::finish`] succeeds. Dropping a writer without finishing it
/// discards everything written so far.
pub trait BlobWriter: Write + Send {
    /// Publishes the object under its key.
    ///
    /// # Errors
    ///
    /// Fails with [`AlreadyExists`](super::AlreadyExists) if the key was
    /// published by someone else in the meantime, or with an I/O error.
    /// Nothing is published on failure.
    fn finish(self: Box<Self>) -> Result<ObjectMeta>;

    /// Discards the partially written object.
    ///
    /// # Errors
    ///
    /// Returns an error if staged data cannot be removed.
    fn abort(self: Box<Self>) -> Result<()>;
}

/// Backend trait for backup object storage.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
/// Readers and writers are blocking; drive them from `spawn_blocking`.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Lists finalized objects, optionally filtered by key prefix, sorted by key.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectMeta>>;

    /// Retrieves object metadata without opening the object.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or metadata cannot be read.
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>>;

    /// Opens a create-only write stream for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or staging space cannot be allocated.
    async fn writer(&self, key: &str) -> Result<Box<dyn BlobWriter>>;

    /// Opens a finalized object for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the object cannot be opened.
    async fn reader(&self, key: &str) -> Result<Option<(BlobReader, ObjectMeta)>>;

    /// Deletes an object.
    ///
    /// # Returns
    /// * `Ok(true)` - Object existed and was deleted
    /// * `Ok(false)` - Object did not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or deletion fails.
    async fn delete(&self, key: &str) -> Result<bool>;
}
