//! Session descriptor lifecycle.
//!
//! Each editor instance owns exactly one descriptor,
//! `<backup dir>/<backup_prefix>.<pid>`, rewritten on every layout change once
//! tracking has started. A descriptor that an instance was *started from* and
//! that matches the backup grammar marks a crash resumption; it is deleted on
//! sight so the same crash is never resumed twice.
//!
//! # State machine
//!
//! ```text
//! Uninitialized ──start_tracking──► Tracking ──on_layout_changed──► Tracking
//! ```

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::host::EditorHost;
use crate::ledger::CleanupLedger;
use crate::naming::NamingScheme;
use crate::store::{self, BackupStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    /// Startup has not completed; layout events are ignored.
    Uninitialized,
    /// The descriptor is rewritten on every layout event.
    Tracking,
}

#[derive(Debug, Clone)]
pub struct SessionBackupController {
    state: TrackingState,
    descriptor: PathBuf,
    pid: u32,
}

impl SessionBackupController {
    pub fn new(store: &BackupStore, scheme: &NamingScheme, pid: u32) -> Self {
        Self {
            state: TrackingState::Uninitialized,
            descriptor: store.session_path(scheme, pid),
            pid,
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor
    }

    /// Consume the descriptor this instance was resumed from, if it is a
    /// backup descriptor.
    ///
    /// The file is deleted before returning, so a second call reports nothing.
    pub fn detect_resumed(&self, host: &dyn EditorHost, scheme: &NamingScheme) -> Option<PathBuf> {
        let resumed = host.resumed_session()?;
        let name = resumed.to_string_lossy();
        let Some(session) = scheme.parse_session_name(&name) else {
            debug!(path = %resumed.display(), "resumed session is not a backup descriptor");
            return None;
        };
        if session.pid() == self.pid {
            return None;
        }
        if store::process_alive(session.pid()) {
            warn!(
                pid = session.pid(),
                path = %resumed.display(),
                "resuming a descriptor whose owner is still running"
            );
        }

        match store::remove_if_exists(&resumed) {
            Ok(true) => {
                info!(pid = session.pid(), path = %resumed.display(), "resuming crashed session");
                Some(resumed)
            }
            Ok(false) => None,
            Err(err) => {
                // Still a resumption; the stale file is left for `reco clean`.
                warn!(path = %resumed.display(), error = %err, "failed to delete resumed descriptor");
                Some(resumed)
            }
        }
    }

    /// Write the first descriptor and schedule it for cleanup.
    pub fn start_tracking(&mut self, host: &mut dyn EditorHost, ledger: &mut CleanupLedger) {
        self.state = TrackingState::Tracking;
        ledger.append(&self.descriptor);
        self.snapshot(host);
        info!(artifact = %self.descriptor.display(), "session tracking started");
    }

    /// Rewrite the descriptor if tracking.
    pub fn on_layout_changed(&self, host: &mut dyn EditorHost) {
        if self.state == TrackingState::Tracking {
            self.snapshot(host);
        }
    }

    fn snapshot(&self, host: &mut dyn EditorHost) {
        match host.write_layout(&self.descriptor) {
            Ok(()) => debug!(artifact = %self.descriptor.display(), "session descriptor written"),
            Err(err) => warn!(
                artifact = %self.descriptor.display(),
                error = %err,
                "failed to write session descriptor"
            ),
        }
    }
}
