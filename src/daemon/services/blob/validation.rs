//! Key validation for the blob store.
//!
//! Object keys become file names in the filesystem backend, so every key is
//! checked against directory traversal before it touches the disk.

use anyhow::{Result, bail};
use std::path::{Component, Path, PathBuf};

use super::types::{METADATA_DB, STAGING_DIR};

/// True for names the store keeps for its own bookkeeping.
pub fn is_reserved_key(key: &str) -> bool {
    key == METADATA_DB || key == STAGING_DIR
}

/// Validates and normalizes an object key to prevent directory traversal.
///
/// Rejects keys that are empty, absolute, contain `..`, root or prefix
/// components, or collide with the store's own bookkeeping files.
pub(crate) fn validate_key(key: &str) -> Result<PathBuf> {
    if key.is_empty() {
        bail!("Object key cannot be empty");
    }

    let path = Path::new(key);

    if path.is_absolute() {
        bail!("Object key cannot be absolute: {key}");
    }

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => normalized.push(name),
            Component::CurDir => {},
            Component::ParentDir => bail!("Object key cannot contain '..': {key}"),
            Component::RootDir | Component::Prefix(_) => {
                bail!("Object key cannot contain root or prefix: {key}")
            },
        }
    }

    if normalized.as_os_str().is_empty() {
        bail!("Object key normalized to empty path");
    }

    if let Some(Component::Normal(first)) = normalized.components().next()
        && first.to_str().is_some_and(is_reserved_key)
    {
        bail!("Object key is reserved: {key}");
    }

    Ok(normalized)
}

/// Returns the normalized key string (forward slashes, no `./`).
pub(crate) fn normalize_key(key: &str) -> Result<String> {
    let normalized = validate_key(key)?;
    Ok(normalized.to_string_lossy().replace('\\', "/"))
}

/// Returns the filesystem path for an object given a base directory and key.
pub(crate) fn object_path(base_dir: &Path, key: &str) -> Result<PathBuf> {
    let normalized = validate_key(key)?;
    Ok(base_dir.join(normalized))
}
