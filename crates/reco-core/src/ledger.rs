//! Paths scheduled for deletion on a clean shutdown.
//!
//! The ledger only ever grows while the editor runs. It is drained once, by
//! [`CleanupLedger::remove_all`], when the last buffer goes away; a crash
//! leaves every listed artifact on disk for the next instance to find.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Set of artifact paths owned by this process.
#[derive(Debug, Default, Clone)]
pub struct CleanupLedger {
    paths: BTreeSet<PathBuf>,
}

/// Outcome of draining the ledger.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Paths that were deleted.
    pub removed: Vec<PathBuf>,
    /// Paths that were already gone.
    pub missing: Vec<PathBuf>,
    /// Paths that could not be deleted, with the error text.
    pub failed: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl CleanupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `path`; returns false if it was already scheduled.
    pub fn append(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        let inserted = self.paths.insert(path.clone());
        if inserted {
            debug!(path = %path.display(), "scheduled for cleanup");
        }
        inserted
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    /// Delete every scheduled path and empty the ledger.
    ///
    /// A missing file is not an error. Failures are reported and skipped so
    /// that one stuck file does not keep the rest on disk.
    pub fn remove_all(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        for path in std::mem::take(&mut self.paths) {
            match std::fs::remove_file(&path) {
                Ok(()) => report.removed.push(path),
                Err(err) if err.kind() == io::ErrorKind::NotFound => report.missing.push(path),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove backup artifact");
                    report.failed.push((path, err.to_string()));
                }
            }
        }
        debug!(
            removed = report.removed.len(),
            missing = report.missing.len(),
            failed = report.failed.len(),
            "cleanup ledger drained"
        );
        report
    }
}
