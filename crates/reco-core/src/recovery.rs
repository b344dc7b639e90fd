//! Recovery session: the per-process state machine behind every editor event.
//!
//! One [`RecoverySession`] is built per editor process and handed each event
//! in dispatch order. It owns the cleanup ledger, the pending recovery stack,
//! the live buffer counter and the session descriptor controller; nothing
//! else holds recovery state.
//!
//! # Event map
//!
//! ```text
//! buffer added      ─► name if unnamed ─► count ─► snapshot layout ─► correlate orphan swap
//! buffer unloaded   ─► uncount
//! window entered    ─► snapshot layout ─► replay deferred conflict ─► swap/nofile flags
//! window left       ─► snapshot layout
//! buffer renamed    ─► swap/nofile flags
//! swap conflict     ─► file snapshot + swap copy ─► SwapChoice::Delete
//! startup complete  ─► replay orphaned swaps, rebind pids ─► name unnamed ─► arm counter ─► track
//! buffer written    ─► follow scratch buffer to its new entry
//! shutdown          ─► drain ledger when no live buffers remain
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::diff::{self, SnapshotDiff};
use crate::error::{Error, Result};
use crate::host::{BufferIdentity, EditorHost, SwapChoice};
use crate::ledger::{CleanupLedger, CleanupReport};
use crate::naming::{GeneratedName, NameAllocator, NamingScheme};
use crate::session::{SessionBackupController, TrackingState};
use crate::store::BackupStore;
use crate::swap::{RecoveryAssociation, SwapCorrelator};

// =============================================================================
// Live buffer counter
// =============================================================================

/// Count of buffers opened since startup completed.
///
/// Events fired before [`arm`](Self::arm) are ignored. The count never drops
/// below zero; an unload without a matching add is logged and absorbed.
#[derive(Debug, Clone, Default)]
pub struct LiveBufferCounter {
    count: usize,
    armed: bool,
}

impl LiveBufferCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting from the true buffer count.
    pub fn arm(&mut self, count: usize) {
        self.armed = true;
        self.count = count;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn increment(&mut self) {
        if self.armed {
            self.count += 1;
        }
    }

    pub fn decrement(&mut self) {
        if !self.armed {
            return;
        }
        if self.count == 0 {
            debug!("buffer unloaded with live count already at zero");
        } else {
            self.count -= 1;
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// True when no live buffers remain and backups may be removed.
    pub fn allows_cleanup(&self) -> bool {
        self.count == 0
    }
}

// =============================================================================
// Reports
// =============================================================================

/// What startup did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    /// Backup descriptor this instance resumed from, now deleted.
    pub resumed_from: Option<PathBuf>,
    /// Scratch buffers whose swap was replayed.
    pub recovered: usize,
    /// Scratch buffers rebound to this process.
    pub rebound: usize,
    /// Unnamed buffers given a generated name.
    pub named: usize,
    /// Live buffer count after startup.
    pub live_buffers: usize,
}

/// What shutdown did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// No live buffers remained; every tracked artifact was removed.
    Cleaned(CleanupReport),
    /// Buffers were still live, so this exit is treated as a crash.
    Preserved { live: usize },
}

// =============================================================================
// Recovery session
// =============================================================================

pub struct RecoverySession {
    pid: u32,
    nofile: bool,
    scheme: NamingScheme,
    allocator: NameAllocator,
    store: BackupStore,
    ledger: CleanupLedger,
    controller: SessionBackupController,
    /// Orphaned swaps found during startup, replayed last-in first-out.
    pending: Vec<RecoveryAssociation>,
    /// Swap conflicts waiting for their window, keyed by absolute file path.
    deferred: HashMap<PathBuf, PathBuf>,
    counter: LiveBufferCounter,
    started: bool,
}

impl RecoverySession {
    /// Build the session for process `pid`, opening the backup directory.
    pub fn new(config: &Config, pid: u32) -> Result<Self> {
        config.validate()?;
        let scheme = config.naming_scheme()?;
        let store = BackupStore::open(&config.backup.directory)?;
        let controller = SessionBackupController::new(&store, &scheme, pid);
        debug!(pid, root = %store.root().display(), "recovery session created");

        Ok(Self {
            pid,
            nofile: config.backup.nofile,
            scheme,
            allocator: NameAllocator::new(),
            store,
            ledger: CleanupLedger::new(),
            controller,
            pending: Vec::new(),
            deferred: HashMap::new(),
            counter: LiveBufferCounter::new(),
            started: false,
        })
    }

    pub fn for_current_process(config: &Config) -> Result<Self> {
        Self::new(config, std::process::id())
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn scheme(&self) -> &NamingScheme {
        &self.scheme
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    pub fn ledger(&self) -> &CleanupLedger {
        &self.ledger
    }

    pub fn live_buffers(&self) -> usize {
        self.counter.count()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn tracking_state(&self) -> TrackingState {
        self.controller.state()
    }

    pub fn descriptor_path(&self) -> &Path {
        self.controller.descriptor_path()
    }

    pub fn pending_recoveries(&self) -> &[RecoveryAssociation] {
        &self.pending
    }

    pub fn has_deferred_recovery(&self, file: &Path) -> bool {
        self.deferred.contains_key(file)
    }

    // -------------------------------------------------------------------------
    // Event handlers
    // -------------------------------------------------------------------------

    /// A buffer was appended to the buffer list.
    pub fn on_buffer_added(&mut self, host: &mut dyn EditorHost) -> Result<()> {
        let Some(buffer) = host.last_buffer() else {
            return Ok(());
        };
        self.name_if_unnamed(host, &buffer)?;
        self.counter.increment();
        self.controller.on_layout_changed(host);

        if !self.started {
            self.correlate_orphan(host, buffer.id);
        }
        Ok(())
    }

    pub fn on_buffer_unloaded(&mut self) {
        self.counter.decrement();
    }

    /// A buffer became visible in a window.
    pub fn on_window_entered(&mut self, host: &mut dyn EditorHost) -> Result<()> {
        self.controller.on_layout_changed(host);
        self.recover_deferred(host)?;
        self.apply_swap_flags(host)
    }

    pub fn on_window_left(&mut self, host: &mut dyn EditorHost) {
        self.controller.on_layout_changed(host);
    }

    pub fn on_buffer_renamed(&mut self, host: &mut dyn EditorHost) -> Result<()> {
        self.apply_swap_flags(host)
    }

    /// The editor found a live swap for `file` while opening it.
    ///
    /// Snapshots the file and copies the swap aside; recovery itself waits
    /// for [`on_window_entered`](Self::on_window_entered).
    pub fn on_swap_exists(&mut self, host: &dyn EditorHost, file: &Path, swap: &Path) -> SwapChoice {
        let file = absolutize(file, &host.working_dir());
        let mut correlator = SwapCorrelator::new(&self.store, &mut self.ledger);
        correlator.copy_file_snapshot(&file);

        match correlator.relocate_conflict(&file, swap) {
            Some(artifact) => {
                info!(path = %file.display(), artifact = %artifact.path.display(), "deferred swap recovery");
                self.deferred.insert(file, artifact.path);
                SwapChoice::Delete
            }
            None => SwapChoice::Prompt,
        }
    }

    /// Startup finished: resume a crashed session if this is one, name
    /// unnamed buffers and begin tracking.
    pub fn on_startup_complete(&mut self, host: &mut dyn EditorHost) -> Result<StartupReport> {
        self.started = true;
        let mut report = StartupReport::default();

        if let Some(descriptor) = self.controller.detect_resumed(host, &self.scheme) {
            report.resumed_from = Some(descriptor);
            report.recovered = self.replay_scratch_recovery(host)?;
            report.rebound = self.rebind_foreign_buffers(host, None)?;
        } else if !self.pending.is_empty() {
            // Swaps relocated while loading an ordinary session are replayed
            // too; their originals are already gone.
            let orphaned: HashSet<String> =
                self.pending.iter().map(|a| a.buffer.clone()).collect();
            debug!(
                pending = orphaned.len(),
                "replaying swaps relocated outside a resumed session"
            );
            report.recovered = self.replay_scratch_recovery(host)?;
            report.rebound = self.rebind_foreign_buffers(host, Some(&orphaned))?;
        }

        for buffer in host.buffers() {
            if self.name_if_unnamed(host, &buffer)? {
                report.named += 1;
            }
        }

        self.counter.arm(host.buffers().len());
        report.live_buffers = self.counter.count();
        self.controller.start_tracking(host, &mut self.ledger);

        info!(
            pid = self.pid,
            resumed = report.resumed_from.is_some(),
            recovered = report.recovered,
            rebound = report.rebound,
            named = report.named,
            live = report.live_buffers,
            "startup complete"
        );
        Ok(report)
    }

    /// The focused buffer was written. A scratch buffer saved under a real
    /// name appears as a new last entry; focus follows it.
    pub fn on_buffer_written(&mut self, host: &mut dyn EditorHost) -> Result<bool> {
        let Some(current) = host.current_buffer() else {
            return Ok(false);
        };
        if !current.is_scratch(&self.scheme) {
            return Ok(false);
        }
        let Some(last) = host.last_buffer() else {
            return Ok(false);
        };
        if last.id == current.id {
            return Ok(false);
        }
        host.set_current_buffer(last.id)?;
        debug!(buffer = %last.name, "focus moved to saved copy of scratch buffer");
        Ok(true)
    }

    /// The editor is exiting.
    ///
    /// Backups are removed only when no live buffers remain; any other exit
    /// keeps them for the next instance.
    pub fn on_shutdown(&mut self) -> ShutdownOutcome {
        if !self.counter.allows_cleanup() {
            warn!(live = self.counter.count(), "exiting with live buffers; keeping backups");
            return ShutdownOutcome::Preserved {
                live: self.counter.count(),
            };
        }
        let report = self.ledger.remove_all();
        info!(
            removed = report.removed.len(),
            failed = report.failed.len(),
            "backups cleaned up"
        );
        ShutdownOutcome::Cleaned(report)
    }

    // -------------------------------------------------------------------------
    // User requests
    // -------------------------------------------------------------------------

    /// Diff the pre-recovery snapshot of `path` against the file on disk.
    ///
    /// Relative paths resolve against the editor's working directory.
    pub fn diff_against_snapshot(&self, host: &dyn EditorHost, path: &Path) -> Result<SnapshotDiff> {
        let path = absolutize(path, &host.working_dir());
        let snapshot = self
            .store
            .snapshot_of(&path)
            .ok_or_else(|| Error::SnapshotMissing { path: path.clone() })?;
        Ok(diff::diff_files(&snapshot, &path)?)
    }

    /// Replace the focused buffer's text with its pre-recovery snapshot.
    pub fn revert_to_pre_recovery(&self, host: &mut dyn EditorHost) -> Result<()> {
        let Some(current) = host.current_buffer() else {
            return Ok(());
        };
        let path = current.absolute_path(&host.working_dir());
        let snapshot = self
            .store
            .snapshot_of(&path)
            .ok_or_else(|| Error::SnapshotMissing { path: path.clone() })?;
        let text = std::fs::read_to_string(&snapshot)?;
        host.set_buffer_text(current.id, &text)?;
        info!(path = %path.display(), "reverted buffer to pre-recovery contents");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Name `buffer` if it is unnamed, unmodified and not part of a session
    /// being loaded.
    fn name_if_unnamed(&mut self, host: &mut dyn EditorHost, buffer: &BufferIdentity) -> Result<bool> {
        if !buffer.is_unnamed() || buffer.modified || host.is_loading_session() {
            return Ok(false);
        }
        let name = self.fresh_name(host)?;
        host.rename_buffer(buffer.id, &name.to_string())?;
        debug!(buffer = buffer.id, name = %name, "named unnamed buffer");
        Ok(true)
    }

    /// Next generated name not already held by an open buffer.
    fn fresh_name(&mut self, host: &dyn EditorHost) -> Result<GeneratedName> {
        let taken: HashSet<(u64, u32)> = host
            .buffers()
            .iter()
            .filter_map(|b| self.scheme.parse_buffer_name(&b.name))
            .map(|n| (n.sequence(), n.pid()))
            .collect();
        loop {
            let name = self.allocator.allocate(&self.scheme, self.pid)?;
            if !taken.contains(&(name.sequence(), name.pid())) {
                return Ok(name);
            }
        }
    }

    fn correlate_orphan(&mut self, host: &dyn EditorHost, id: u32) {
        let Some(buffer) = host.buffer(id) else {
            return;
        };
        match buffer.owner_pid(&self.scheme) {
            Some(owner) if owner != self.pid => {}
            _ => return,
        }
        let dirs = host.swap_search_dirs();
        let working_dir = host.working_dir();
        let association = SwapCorrelator::new(&self.store, &mut self.ledger).find_and_relocate(
            &buffer,
            &dirs,
            &working_dir,
        );
        if let Some(association) = association {
            self.pending.push(association);
        }
    }

    /// Replay every pending association into its buffer, newest first, then
    /// restore focus and the focused buffer's modified flag.
    fn replay_scratch_recovery(&mut self, host: &mut dyn EditorHost) -> Result<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let focused = host.current_buffer();
        let suspended = focused.as_ref().filter(|b| b.modified).map(|b| b.id);
        if let Some(id) = suspended {
            host.set_modified(id, false)?;
        }

        let mut recovered = 0;
        while let Some(association) = self.pending.pop() {
            let target = host
                .buffers()
                .into_iter()
                .find(|b| b.name == association.buffer);
            let Some(target) = target else {
                warn!(buffer = %association.buffer, "buffer for pending recovery is gone");
                continue;
            };
            if let Err(err) = host.set_current_buffer(target.id) {
                warn!(buffer = %target.name, error = %err, "cannot focus buffer for recovery");
                continue;
            }
            match host.recover_from(&association.artifact) {
                Ok(()) => {
                    recovered += 1;
                    info!(
                        buffer = %target.name,
                        artifact = %association.artifact.display(),
                        "recovered scratch buffer"
                    );
                }
                Err(err) => warn!(buffer = %target.name, error = %err, "scratch recovery failed"),
            }
        }

        if let Some(focused) = focused {
            host.set_current_buffer(focused.id)?;
        }
        if let Some(id) = suspended {
            host.set_modified(id, true)?;
        }
        Ok(recovered)
    }

    /// Rewrite the pid of every scratch buffer owned by another process, or
    /// only of those named in `only`.
    fn rebind_foreign_buffers(
        &mut self,
        host: &mut dyn EditorHost,
        only: Option<&HashSet<String>>,
    ) -> Result<usize> {
        let mut rebound = 0;
        for buffer in host.buffers() {
            if only.is_some_and(|names| !names.contains(&buffer.name)) {
                continue;
            }
            let Some(parsed) = self.scheme.parse_buffer_name(&buffer.name) else {
                continue;
            };
            if parsed.is_owned_by(self.pid) {
                continue;
            }

            let candidate = parsed.with_pid(self.pid);
            let collides = host.buffers().iter().any(|other| {
                other.id != buffer.id
                    && self
                        .scheme
                        .parse_buffer_name(&other.name)
                        .is_some_and(|n| n.sequence() == candidate.sequence() && n.pid() == self.pid)
            });
            let new_name = if collides {
                self.fresh_name(host)?.to_string()
            } else {
                self.allocator.observe(candidate.sequence());
                candidate.to_string()
            };

            host.rename_buffer(buffer.id, &new_name)?;
            host.wipe_stale_name(&buffer.name)?;
            debug!(
                buffer = buffer.id,
                from = %buffer.name,
                to = %new_name,
                pid = self.pid,
                "rebound scratch buffer"
            );
            rebound += 1;
        }
        Ok(rebound)
    }

    /// Recover a conflict deferred by [`on_swap_exists`](Self::on_swap_exists)
    /// into the focused buffer, then save it if it is a real file.
    fn recover_deferred(&mut self, host: &mut dyn EditorHost) -> Result<()> {
        if self.deferred.is_empty() {
            return Ok(());
        }
        let Some(current) = host.current_buffer() else {
            return Ok(());
        };
        let key = current.absolute_path(&host.working_dir());
        let Some(artifact) = self.deferred.remove(&key) else {
            return Ok(());
        };

        if let Err(err) = host.recover_from(&artifact) {
            warn!(path = %key.display(), error = %err, "deferred swap recovery failed");
            return Ok(());
        }
        if !current.is_scratch(&self.scheme) {
            host.write_current()?;
        }
        info!(path = %key.display(), artifact = %artifact.display(), "recovered file from swap");
        Ok(())
    }

    /// Keep swap files on for the focused buffer; scratch buffers also get
    /// `nofile` when configured.
    fn apply_swap_flags(&self, host: &mut dyn EditorHost) -> Result<()> {
        let Some(current) = host.current_buffer() else {
            return Ok(());
        };
        host.set_swap_enabled(current.id, true)?;
        if self.nofile && current.is_scratch(&self.scheme) {
            host.set_persistent(current.id, false)?;
        }
        Ok(())
    }
}

fn absolutize(path: &Path, working_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}
