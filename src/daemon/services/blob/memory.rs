//! In-memory blob store.
//!
//! Provides a fast, non-persistent store using DashMap for concurrent
//! access. Ideal for testing and ephemeral servers.

use super::backend::{BlobReader, BlobStore, BlobWriter};
use super::types::{AlreadyExists, ObjectMeta, guess_content_type};
use super::validation::normalize_key;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::io::{self, Cursor, Write};
use std::sync::Arc;

/// Entry stored in the memory backend.
#[derive(Clone)]
struct MemoryObject {
    data: Bytes,
    meta: ObjectMeta,
}

/// In-memory blob store using DashMap.
///
/// All data is lost when the process exits. Clones share the same objects.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    data: Arc<DashMap<String, MemoryObject>>,
}

impl MemoryBlobStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of objects in the store.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Buffered write for one object of a [`MemoryBlobStore`].
struct MemoryWriter {
    key: String,
    buf: Vec<u8>,
    data: Arc<DashMap<String, MemoryObject>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlobWriter for MemoryWriter {
    fn finish(self: Box<Self>) -> Result<ObjectMeta> {
        let Self { key, buf, data } = *self;

        match data.entry(key.clone()) {
            Entry::Occupied(_) => Err(AlreadyExists(key).into()),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let meta = ObjectMeta {
                    content_type: guess_content_type(&key),
                    key,
                    size: buf.len() as u64,
                    created_at: now,
                    modified_at: now,
                };
                slot.insert(MemoryObject {
                    data: Bytes::from(buf),
                    meta: meta.clone(),
                });
                Ok(meta)
            },
        }
    }

    fn abort(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectMeta>> {
        let mut objects: Vec<ObjectMeta> = self
            .data
            .iter()
            .filter(|entry| prefix.is_none_or(|p| entry.key().starts_with(p)))
            .map(|entry| entry.value().meta.clone())
            .collect();

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let key = normalize_key(key)?;
        Ok(self.data.get(&key).map(|entry| entry.value().meta.clone()))
    }

    async fn writer(&self, key: &str) -> Result<Box<dyn BlobWriter>> {
        Ok(Box::new(MemoryWriter {
            key: normalize_key(key)?,
            buf: Vec::new(),
            data: Arc::clone(&self.data),
        }))
    }

    async fn reader(&self, key: &str) -> Result<Option<(BlobReader, ObjectMeta)>> {
        let key = normalize_key(key)?;
        Ok(self.data.get(&key).map(|entry| {
            let obj = entry.value();
            let reader: BlobReader = Box::new(Cursor::new(obj.data.clone()));
            (reader, obj.meta.clone())
        }))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = normalize_key(key)?;
        Ok(self.data.remove(&key).is_some())
    }
}
