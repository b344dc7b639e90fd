//! Locating swap files and moving them into the backup directory.
//!
//! # Data flow
//!
//! ```text
//! buffer name ──► swap_candidates(search dirs) ──► first existing path
//!                                                        │
//!                        copy_preserving ◄───────────────┘
//!                              │
//!                              ├──► CleanupLedger::append(artifact)
//!                              └──► remove original swap
//! ```
//!
//! The original swap is removed so the editor does not report the buffer as
//! locked by another running instance.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::host::BufferIdentity;
use crate::ledger::CleanupLedger;
use crate::store::{self, ArtifactKind, BackupArtifact, BackupStore};

const SWAP_EXT: &str = "swp";

/// A relocated swap waiting to be replayed into the buffer it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryAssociation {
    /// Buffer name at the time the swap was found.
    pub buffer: String,
    /// Swap copy inside the backup directory.
    pub artifact: PathBuf,
}

/// Swap path candidates for `buffer_name`, in search order.
///
/// - `.` means the buffer's own directory and uses the hidden `.<name>.swp` form.
/// - A directory ending in `//` uses the full path with `/` replaced by `%`.
/// - Any other directory uses `<name>.swp`.
pub fn swap_candidates(buffer_name: &str, search_dirs: &[String], working_dir: &Path) -> Vec<PathBuf> {
    let buffer_path = if Path::new(buffer_name).is_absolute() {
        PathBuf::from(buffer_name)
    } else {
        working_dir.join(buffer_name)
    };
    let Some(base) = buffer_path.file_name().and_then(|n| n.to_str()) else {
        return Vec::new();
    };

    search_dirs
        .iter()
        .map(|dir| dir.trim())
        .filter(|dir| !dir.is_empty())
        .map(|dir| {
            if dir == "." {
                let parent = buffer_path.parent().unwrap_or(working_dir);
                parent.join(format!(".{base}.{SWAP_EXT}"))
            } else if let Some(stripped) = dir.strip_suffix("//") {
                let flat = buffer_path.to_string_lossy().replace('/', "%");
                resolve_dir(stripped, working_dir).join(format!("{flat}.{SWAP_EXT}"))
            } else {
                resolve_dir(dir, working_dir).join(format!("{base}.{SWAP_EXT}"))
            }
        })
        .collect()
}

fn resolve_dir(dir: &str, working_dir: &Path) -> PathBuf {
    let expanded = store::expand_tilde(dir);
    if expanded.is_absolute() {
        expanded
    } else {
        working_dir.join(expanded)
    }
}

/// First candidate that exists on disk.
pub fn find_swap(buffer_name: &str, search_dirs: &[String], working_dir: &Path) -> Option<PathBuf> {
    swap_candidates(buffer_name, search_dirs, working_dir)
        .into_iter()
        .find(|candidate| candidate.is_file())
}

/// Moves swap files and file snapshots into the backup store, recording each
/// artifact in the cleanup ledger.
pub struct SwapCorrelator<'a> {
    store: &'a BackupStore,
    ledger: &'a mut CleanupLedger,
}

impl<'a> SwapCorrelator<'a> {
    pub fn new(store: &'a BackupStore, ledger: &'a mut CleanupLedger) -> Self {
        Self { store, ledger }
    }

    /// Find the swap left behind for `buffer` and move it into the backup
    /// directory.
    ///
    /// Returns `None` when no swap exists or the copy failed; neither is an
    /// error for the caller.
    pub fn find_and_relocate(
        &mut self,
        buffer: &BufferIdentity,
        search_dirs: &[String],
        working_dir: &Path,
    ) -> Option<RecoveryAssociation> {
        let Some(swap) = find_swap(&buffer.name, search_dirs, working_dir) else {
            debug!(buffer = %buffer.name, "no swap file found");
            return None;
        };
        let artifact = self.store.relocated_swap_path(&swap);

        if let Err(err) = store::copy_preserving(&swap, &artifact) {
            warn!(
                buffer = %buffer.name,
                path = %swap.display(),
                error = %err,
                "failed to copy swap into backup directory"
            );
            return None;
        }
        self.ledger.append(&artifact);

        if let Err(err) = store::remove_if_exists(&swap) {
            warn!(path = %swap.display(), error = %err, "failed to remove relocated swap");
        }

        info!(
            buffer = %buffer.name,
            artifact = %artifact.display(),
            "relocated orphaned swap"
        );
        Some(RecoveryAssociation {
            buffer: buffer.name.clone(),
            artifact,
        })
    }

    /// Copy the swap that conflicts with opening `file`.
    ///
    /// The original is left for the editor to delete once told to discard it.
    pub fn relocate_conflict(&mut self, file: &Path, swap: &Path) -> Option<BackupArtifact> {
        let artifact = self.store.swap_copy_path(file);
        if let Err(err) = store::copy_preserving(swap, &artifact) {
            warn!(
                path = %file.display(),
                artifact = %artifact.display(),
                error = %err,
                "failed to copy conflicting swap"
            );
            return None;
        }
        self.ledger.append(&artifact);
        debug!(path = %file.display(), artifact = %artifact.display(), "copied conflicting swap");
        Some(BackupArtifact::from_disk(ArtifactKind::SwapCopy, file, artifact))
    }

    /// Copy `path` as it is on disk before a recovery overwrites it.
    ///
    /// Skipped when the file does not exist yet. An earlier snapshot of the
    /// same file is replaced, so the baseline is always the content right
    /// before the latest recovery.
    pub fn copy_file_snapshot(&mut self, path: &Path) -> Option<BackupArtifact> {
        if !path.is_file() {
            debug!(path = %path.display(), "no file to snapshot");
            return None;
        }
        let artifact = self.store.file_snapshot_path(path);
        if let Err(err) = store::copy_preserving(path, &artifact) {
            warn!(path = %path.display(), error = %err, "failed to snapshot file before recovery");
            return None;
        }
        self.ledger.append(&artifact);
        info!(path = %path.display(), artifact = %artifact.display(), "took pre-recovery snapshot");
        Some(BackupArtifact::from_disk(ArtifactKind::FileSnapshot, path, artifact))
    }
}
