//! Replacing live state from a stored archive.
//!
//! The work runs as a detached task once the handler has checked the
//! preconditions and taken the lock. Steps:
//!
//! 1. download the archive into the data dir's scratch area
//! 2. extract it and check every configured store is present and healthy
//! 3. swap each live store and the storage tree for the extracted copy,
//!    one rename per path, parking the old files in a trash dir
//! 4. restart the process
//!
//! Until step 3 completes the live state is untouched and a failure simply
//! releases the lock. If a rename in step 3 fails, the swaps already done
//! are undone in reverse. Once all renames succeed the restore is
//! committed and the process restarts whatever happens next.

use anyhow::{Context, Result, anyhow};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;

use super::archive::{extract_archive, verify_extracted};
use super::coordinator::ActiveBackup;
use super::layout::StateLayout;
use super::restart::Restarter;
use crate::daemon::services::blob::{BlobReader, BlobService};

/// Suffixes of the side files SQLite keeps next to a WAL-mode database.
const SQLITE_SIDE_FILES: [&str; 2] = ["-wal", "-shm"];

/// Outcome of the blocking part of a restore.
#[derive(Debug)]
enum Failure {
    /// Live state is unchanged.
    BeforeCommit(anyhow::Error),
    /// Live state may be partly or fully replaced.
    AfterCommit(anyhow::Error),
}

/// Runs a restore to completion. Owns the lock guard for its whole life.
pub(crate) async fn run_restore(
    blobs: BlobService,
    layout: StateLayout,
    guard: ActiveBackup,
    restarter: Arc<dyn Restarter>,
) {
    let name = guard.name().to_string();
    let started = Instant::now();
    tracing::info!(backup = %name, "Restore started");

    let outcome = match blobs.reader(&name).await {
        Ok(Some((reader, _))) => {
            let layout = layout.clone();
            tokio::task::spawn_blocking(move || restore_from(reader, &layout))
                .await
                .unwrap_or_else(|join| {
                    Err(Failure::BeforeCommit(anyhow!("restore task panicked: {join}")))
                })
        },
        Ok(None) => Err(Failure::BeforeCommit(anyhow!("backup disappeared before restore"))),
        Err(err) => Err(Failure::BeforeCommit(err)),
    };

    match outcome {
        Ok(()) => {
            tracing::info!(
                backup = %name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Restore committed, restarting"
            );
            guard.hold_until_exit();
            restarter.restart();
        },
        Err(Failure::BeforeCommit(err)) => {
            tracing::error!(
                backup = %name,
                error = %format!("{err:#}"),
                "Restore failed, live state unchanged"
            );
            drop(guard);
        },
        Err(Failure::AfterCommit(err)) => {
            tracing::error!(
                backup = %name,
                error = %format!("{err:#}"),
                "Restore failed after commit, restarting"
            );
            guard.hold_until_exit();
            restarter.restart();
        },
    }
}

fn restore_from(mut reader: BlobReader, layout: &StateLayout) -> Result<(), Failure> {
    layout.ensure().map_err(Failure::BeforeCommit)?;
    let staged = stage(&mut reader, layout).map_err(Failure::BeforeCommit)?;
    swap_in(staged.path(), layout)
}

/// Downloads and extracts the archive. Returns the extraction dir.
fn stage(reader: &mut BlobReader, layout: &StateLayout) -> Result<TempDir> {
    let temp = layout.temp_path();
    let staged = tempfile::Builder::new()
        .prefix("restore_")
        .tempdir_in(&temp)
        .context("Failed to create restore staging directory")?;

    let mut archive = tempfile::tempfile_in(&temp).context("Failed to create download file")?;
    io::copy(reader, &mut archive).context("Failed to download backup")?;
    io::Seek::rewind(&mut archive).context("Failed to rewind downloaded backup")?;

    let extracted = staged.path().join("state");
    extract_archive(archive, &extracted)?;
    verify_extracted(&extracted, layout)?;

    let storage = extracted.join(layout.storage_name());
    if !storage.exists() {
        fs::create_dir_all(&storage).context("Failed to create empty storage directory")?;
    }

    Ok(staged)
}

/// One live path and its replacement.
struct Swap {
    live: PathBuf,
    incoming: Option<PathBuf>,
    parked: PathBuf,
}

fn plan(staged: &Path, layout: &StateLayout, trash: &Path) -> Vec<Swap> {
    let extracted = staged.join("state");
    let mut swaps = Vec::new();

    for name in layout.stores() {
        swaps.push(Swap {
            live: layout.store_path(name),
            incoming: Some(extracted.join(name)),
            parked: trash.join(name),
        });
        for suffix in SQLITE_SIDE_FILES {
            let side = format!("{name}{suffix}");
            swaps.push(Swap {
                live: layout.store_path(&side),
                incoming: None,
                parked: trash.join(&side),
            });
        }
    }

    swaps.push(Swap {
        live: layout.storage_path(),
        incoming: Some(extracted.join(layout.storage_name())),
        parked: trash.join(layout.storage_name()),
    });
    swaps
}

/// Moves the extracted state into place.
fn swap_in(staged: &Path, layout: &StateLayout) -> Result<(), Failure> {
    let trash = tempfile::Builder::new()
        .prefix("trash_")
        .tempdir_in(layout.temp_path())
        .context("Failed to create trash directory")
        .map_err(Failure::BeforeCommit)?;

    let swaps = plan(staged, layout, trash.path());
    let mut done: Vec<(&Swap, bool)> = Vec::with_capacity(swaps.len());

    for swap in &swaps {
        match apply(swap) {
            Ok(parked) => done.push((swap, parked)),
            Err(err) => {
                return match rollback(&done) {
                    Ok(()) => Err(Failure::BeforeCommit(err)),
                    Err(rollback_err) => {
                        // Old files still parked there are the only copy left
                        let kept = trash.keep();
                        tracing::error!(
                            path = %kept.display(),
                            "Replaced state left for manual recovery"
                        );
                        Err(Failure::AfterCommit(
                            err.context(format!("rollback also failed: {rollback_err:#}")),
                        ))
                    },
                };
            },
        }
    }

    // Committed; the old state goes away with the trash dir
    if let Err(err) = trash.close() {
        tracing::warn!(error = %err, "Failed to remove replaced state");
    }
    Ok(())
}

/// Parks the live path (if any) and moves the incoming one in.
/// Returns whether something was parked.
fn apply(swap: &Swap) -> Result<bool> {
    let parked = match fs::rename(&swap.live, &swap.parked) {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => false,
        Err(err) => {
            return Err(anyhow::Error::new(err)
                .context(format!("Failed to move aside {}", swap.live.display())));
        },
    };

    if let Some(incoming) = &swap.incoming
        && let Err(err) = fs::rename(incoming, &swap.live)
    {
        if parked {
            fs::rename(&swap.parked, &swap.live).ok();
        }
        return Err(anyhow::Error::new(err)
            .context(format!("Failed to move restored {} into place", swap.live.display())));
    }
    Ok(parked)
}

fn rollback(done: &[(&Swap, bool)]) -> Result<()> {
    for (swap, parked) in done.iter().rev() {
        if swap.incoming.is_some() {
            remove_path(&swap.live)?;
        }
        if *parked {
            fs::rename(&swap.parked, &swap.live)
                .with_context(|| format!("Failed to put back {}", swap.live.display()))?;
        }
    }
    Ok(())
}

fn remove_path(path: &Path) -> Result<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(anyhow::Error::new(err).context(format!("Failed to remove {}", path.display())))
        },
    }
}
