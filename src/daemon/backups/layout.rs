//! Where the live server state sits on disk.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Scratch directory inside the data dir. Keeping it on the same
/// filesystem as the live state makes the restore swap a plain rename.
pub const TEMP_DIR: &str = ".tmp";

/// Paths of everything a backup captures.
#[derive(Debug, Clone)]
pub struct StateLayout {
    data_dir: PathBuf,
    stores: Vec<String>,
    storage_dir: String,
}

impl StateLayout {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        stores: Vec<String>,
        storage_dir: impl Into<String>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            stores,
            storage_dir: storage_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// File names of the structured-data stores, relative to the data dir.
    pub fn stores(&self) -> &[String] {
        &self.stores
    }

    pub fn store_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Name of the file-storage tree, both on disk and inside archives.
    pub fn storage_name(&self) -> &str {
        &self.storage_dir
    }

    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join(&self.storage_dir)
    }

    pub fn temp_path(&self) -> PathBuf {
        self.data_dir.join(TEMP_DIR)
    }

    /// Creates the data dir, the storage tree and the scratch dir.
    ///
    /// # Errors
    ///
    /// Returns an error if any directory cannot be created.
    pub fn ensure(&self) -> Result<()> {
        for dir in [self.data_dir.clone(), self.storage_path(), self.temp_path()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }
}
