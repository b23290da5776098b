//! ZIP packing and unpacking of server state.
//!
//! Archive layout:
//!
//! ```text
//! data.db              consistent copy of each configured store
//! auxiliary.db
//! storage/...          the file-storage tree, relative paths preserved
//! ```

use anyhow::{Context, Result, bail};
use std::fs::{self, File};
use std::io::{self, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::layout::StateLayout;
use crate::daemon::services::sqlite::{SqliteStore, verify_database};

fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true)
}

/// Writes a full archive of `layout` into `out`.
///
/// Stores are first copied into `scratch` through the online backup API,
/// then added to the archive; the storage tree is streamed straight in.
pub(crate) fn write_archive<W: Write + Seek>(
    out: W,
    layout: &StateLayout,
    scratch: &Path,
) -> Result<W> {
    let mut zip = ZipWriter::new(out);

    for name in layout.stores() {
        let store = SqliteStore::open(layout.data_dir(), name)?;
        let copy = scratch.join(name);
        store.snapshot_to(&copy)?;

        zip.start_file(name.as_str(), file_options())
            .with_context(|| format!("Failed to add {name} to archive"))?;
        let mut src =
            File::open(&copy).with_context(|| format!("Failed to open snapshot of {name}"))?;
        io::copy(&mut src, &mut zip).with_context(|| format!("Failed to archive {name}"))?;
        fs::remove_file(&copy).ok();
    }

    let storage = layout.storage_path();
    if storage.is_dir() {
        zip.add_directory(format!("{}/", layout.storage_name()), file_options())
            .context("Failed to add storage directory to archive")?;
        add_tree(&mut zip, &storage, layout.storage_name())?;
    }

    zip.finish().context("Failed to finalize archive")
}

fn add_tree<W: Write + Seek>(zip: &mut ZipWriter<W>, dir: &Path, prefix: &str) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .collect::<io::Result<Vec<_>>>()
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let name = format!("{prefix}/{}", entry.file_name().to_string_lossy());
        let file_type = entry
            .file_type()
            .with_context(|| format!("Failed to stat: {}", path.display()))?;

        if file_type.is_dir() {
            zip.add_directory(format!("{name}/"), file_options())
                .with_context(|| format!("Failed to add directory {name}"))?;
            add_tree(zip, &path, &name)?;
        } else if file_type.is_file() {
            zip.start_file(name.as_str(), file_options())
                .with_context(|| format!("Failed to add {name} to archive"))?;
            let mut src =
                File::open(&path).with_context(|| format!("Failed to open: {}", path.display()))?;
            io::copy(&mut src, zip).with_context(|| format!("Failed to archive {name}"))?;
        } else {
            tracing::debug!(path = %path.display(), "Skipping non-regular file");
        }
    }
    Ok(())
}

/// Extracts `archive` into `dest`.
///
/// Entries whose names would escape `dest` abort the extraction.
pub(crate) fn extract_archive(archive: File, dest: &Path) -> Result<()> {
    let mut zip = ZipArchive::new(archive).context("Backup is not a valid ZIP archive")?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .with_context(|| format!("Failed to read archive entry #{i}"))?;
        let Some(relative) = entry.enclosed_name() else {
            bail!("Archive entry has an unsafe path: {}", entry.name());
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create: {}", target.display()))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create: {}", parent.display()))?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("Failed to create: {}", target.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract: {}", entry.name()))?;
        out.sync_all()
            .with_context(|| format!("Failed to sync: {}", target.display()))?;
    }

    Ok(())
}

/// Checks that an extracted archive holds every configured store and that
/// each one opens as a healthy database.
pub(crate) fn verify_extracted(dir: &Path, layout: &StateLayout) -> Result<()> {
    for name in layout.stores() {
        let path = dir.join(name);
        if !path.is_file() {
            bail!("Backup is missing the {name} data store");
        }
        verify_database(&path)?;
    }
    Ok(())
}
