//! In-process editor for headless runs and tests.
//!
//! [`SimulatedEditor`] implements [`EditorHost`] over an in-memory buffer
//! list while touching the real filesystem the way an editor would: swap
//! files hold the buffer text, a layout write produces a file listing buffer
//! names, and recovery reads an artifact back into the focused buffer.
//!
//! The `open*`, `close`, `save_as`, `source_session` and `startup` helpers
//! fire the same events, in the same order, as a real editor does, so a test
//! can drive a [`RecoverySession`] through whole lifecycles.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{HostError, Result};
use crate::host::{BufferId, BufferIdentity, EditorHost, SwapChoice};
use crate::recovery::{RecoverySession, StartupReport};
use crate::swap;

const LAYOUT_HEADER: &str = "\" reco simulated layout";

/// One simulated buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimBuffer {
    pub id: BufferId,
    pub name: String,
    pub text: String,
    pub modified: bool,
    pub swap_enabled: bool,
    pub persistent: bool,
}

impl SimBuffer {
    fn identity(&self) -> BufferIdentity {
        BufferIdentity {
            id: self.id,
            name: self.name.clone(),
            modified: self.modified,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedEditor {
    buffers: Vec<SimBuffer>,
    current: Option<BufferId>,
    next_id: BufferId,
    working_dir: PathBuf,
    swap_dirs: Vec<String>,
    loading_session: bool,
    resumed_session: Option<PathBuf>,
}

impl SimulatedEditor {
    /// An editor with no buffers whose swap directory list is `.`.
    pub fn new(working_dir: &Path) -> Self {
        Self {
            buffers: Vec::new(),
            current: None,
            next_id: 1,
            working_dir: working_dir.to_path_buf(),
            swap_dirs: vec![".".to_string()],
            loading_session: false,
            resumed_session: None,
        }
    }

    #[must_use]
    pub fn with_swap_dirs(mut self, dirs: &[&str]) -> Self {
        self.swap_dirs = dirs.iter().map(|d| (*d).to_string()).collect();
        self
    }

    pub fn set_loading_session(&mut self, loading: bool) {
        self.loading_session = loading;
    }

    pub fn set_resumed_session(&mut self, path: Option<PathBuf>) {
        self.resumed_session = path;
    }

    /// Append a buffer without firing any event.
    pub fn push_buffer(&mut self, name: &str) -> BufferId {
        let id = self.next_id;
        self.next_id += 1;
        self.buffers.push(SimBuffer {
            id,
            name: name.to_string(),
            text: String::new(),
            modified: false,
            swap_enabled: true,
            persistent: true,
        });
        if self.current.is_none() {
            self.current = Some(id);
        }
        id
    }

    pub fn buffer_state(&self, id: BufferId) -> Option<&SimBuffer> {
        self.buffers.iter().find(|b| b.id == id)
    }

    pub fn text(&self, id: BufferId) -> Option<&str> {
        self.buffer_state(id).map(|b| b.text.as_str())
    }

    pub fn find_by_name(&self, name: &str) -> Option<BufferId> {
        self.buffers.iter().find(|b| b.name == name).map(|b| b.id)
    }

    fn buffer_mut(&mut self, id: BufferId) -> std::result::Result<&mut SimBuffer, HostError> {
        self.buffers
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(HostError::NoSuchBuffer(id))
    }

    /// Where the swap of buffer `id` lives: the first search directory.
    pub fn swap_path(&self, id: BufferId) -> Option<PathBuf> {
        let buffer = self.buffer_state(id)?;
        if buffer.name.is_empty() {
            return None;
        }
        swap::swap_candidates(&buffer.name, &self.swap_dirs, &self.working_dir)
            .into_iter()
            .next()
    }

    /// Edit buffer `id`; the swap file is updated like the editor's would be.
    pub fn type_text(&mut self, id: BufferId, text: &str) -> std::result::Result<(), HostError> {
        let swap = self.swap_path(id);
        let buffer = self.buffer_mut(id)?;
        buffer.text = text.to_string();
        buffer.modified = true;
        if let (true, Some(swap)) = (buffer.swap_enabled, swap) {
            if let Some(parent) = swap.parent() {
                fs::create_dir_all(parent).map_err(command_failed)?;
            }
            fs::write(&swap, text).map_err(command_failed)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Event-firing helpers
    // -------------------------------------------------------------------------

    /// Open a new buffer named `name` (empty for unnamed) in the focused window.
    pub fn open(&mut self, session: &mut RecoverySession, name: &str) -> Result<BufferId> {
        let id = self.push_buffer(name);
        session.on_buffer_added(self)?;
        self.current = Some(id);
        session.on_window_entered(self)?;
        Ok(id)
    }

    /// Open a file from disk, going through swap-conflict handling first.
    pub fn open_file(&mut self, session: &mut RecoverySession, path: &Path) -> Result<BufferId> {
        let name = path.to_string_lossy().into_owned();
        if let Some(conflict) = swap::find_swap(&name, &self.swap_dirs, &self.working_dir) {
            let choice = session.on_swap_exists(self, path, &conflict);
            trace!(path = %path.display(), ?choice, "swap conflict resolved");
            if choice == SwapChoice::Delete {
                fs::remove_file(&conflict)?;
            }
        }

        let text = match fs::read_to_string(self.resolve(path)) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };
        let id = self.push_buffer(&name);
        self.buffer_mut(id)?.text = text;
        session.on_buffer_added(self)?;
        self.current = Some(id);
        session.on_window_entered(self)?;
        Ok(id)
    }

    /// Close buffer `id`, unloading it.
    pub fn close(&mut self, session: &mut RecoverySession, id: BufferId) -> Result<()> {
        session.on_window_left(self);
        self.buffers.retain(|b| b.id != id);
        if self.current == Some(id) {
            self.current = self.buffers.last().map(|b| b.id);
        }
        session.on_buffer_unloaded();
        Ok(())
    }

    /// Write buffer `id` to `path`; the saved file appears as a new entry.
    pub fn save_as(&mut self, session: &mut RecoverySession, id: BufferId, path: &Path) -> Result<BufferId> {
        let text = self
            .buffer_state(id)
            .map(|b| b.text.clone())
            .ok_or(HostError::NoSuchBuffer(id))?;
        fs::write(self.resolve(path), &text)?;
        self.buffer_mut(id)?.modified = false;
        let saved = self.push_buffer(&path.to_string_lossy());
        self.buffer_mut(saved)?.text = text;
        self.current = Some(id);
        session.on_buffer_written(self)?;
        Ok(saved)
    }

    /// Source a layout written by [`EditorHost::write_layout`], as when the
    /// editor is started with `-S <descriptor>`.
    pub fn source_session(&mut self, session: &mut RecoverySession, descriptor: &Path) -> Result<()> {
        let layout = fs::read_to_string(descriptor)?;
        self.loading_session = true;
        for name in layout
            .lines()
            .filter(|line| !line.starts_with('"') && !line.trim().is_empty())
        {
            self.push_buffer(name);
            session.on_buffer_added(self)?;
        }
        self.loading_session = false;
        self.resumed_session = Some(descriptor.to_path_buf());
        Ok(())
    }

    pub fn startup(&mut self, session: &mut RecoverySession) -> Result<StartupReport> {
        session.on_startup_complete(self)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }
}

fn command_failed(err: std::io::Error) -> HostError {
    HostError::CommandFailed(err.to_string())
}

impl EditorHost for SimulatedEditor {
    fn buffers(&self) -> Vec<BufferIdentity> {
        self.buffers.iter().map(SimBuffer::identity).collect()
    }

    fn current_buffer(&self) -> Option<BufferIdentity> {
        self.current
            .and_then(|id| self.buffer_state(id))
            .map(SimBuffer::identity)
    }

    fn set_current_buffer(&mut self, id: BufferId) -> std::result::Result<(), HostError> {
        self.buffer_mut(id)?;
        self.current = Some(id);
        Ok(())
    }

    fn rename_buffer(&mut self, id: BufferId, name: &str) -> std::result::Result<(), HostError> {
        self.buffer_mut(id)?.name = name.to_string();
        Ok(())
    }

    fn wipe_stale_name(&mut self, name: &str) -> std::result::Result<(), HostError> {
        self.buffers.retain(|b| b.name != name);
        if self
            .current
            .is_some_and(|id| !self.buffers.iter().any(|b| b.id == id))
        {
            self.current = self.buffers.last().map(|b| b.id);
        }
        Ok(())
    }

    fn set_modified(&mut self, id: BufferId, modified: bool) -> std::result::Result<(), HostError> {
        self.buffer_mut(id)?.modified = modified;
        Ok(())
    }

    fn set_swap_enabled(&mut self, id: BufferId, enabled: bool) -> std::result::Result<(), HostError> {
        self.buffer_mut(id)?.swap_enabled = enabled;
        Ok(())
    }

    fn set_persistent(&mut self, id: BufferId, persistent: bool) -> std::result::Result<(), HostError> {
        self.buffer_mut(id)?.persistent = persistent;
        Ok(())
    }

    fn is_loading_session(&self) -> bool {
        self.loading_session
    }

    fn resumed_session(&self) -> Option<PathBuf> {
        self.resumed_session.clone()
    }

    fn swap_search_dirs(&self) -> Vec<String> {
        self.swap_dirs.clone()
    }

    fn working_dir(&self) -> PathBuf {
        self.working_dir.clone()
    }

    fn write_layout(&mut self, path: &Path) -> std::result::Result<(), HostError> {
        let mut layout = String::from(LAYOUT_HEADER);
        layout.push('\n');
        for buffer in &self.buffers {
            layout.push_str(&buffer.name);
            layout.push('\n');
        }
        fs::write(path, layout).map_err(command_failed)
    }

    fn recover_from(&mut self, artifact: &Path) -> std::result::Result<(), HostError> {
        let text = fs::read_to_string(artifact).map_err(command_failed)?;
        let id = self
            .current
            .ok_or_else(|| HostError::CommandFailed("no focused buffer".to_string()))?;
        let buffer = self.buffer_mut(id)?;
        buffer.text = text;
        buffer.modified = true;
        Ok(())
    }

    fn write_current(&mut self) -> std::result::Result<(), HostError> {
        let id = self
            .current
            .ok_or_else(|| HostError::CommandFailed("no focused buffer".to_string()))?;
        let (name, text) = {
            let buffer = self.buffer_mut(id)?;
            (buffer.name.clone(), buffer.text.clone())
        };
        if name.is_empty() {
            return Err(HostError::CommandFailed("no file name".to_string()));
        }
        fs::write(self.resolve(Path::new(&name)), text).map_err(command_failed)?;
        self.buffer_mut(id)?.modified = false;
        Ok(())
    }

    fn set_buffer_text(&mut self, id: BufferId, text: &str) -> std::result::Result<(), HostError> {
        let buffer = self.buffer_mut(id)?;
        buffer.text = text.to_string();
        buffer.modified = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_buffer_takes_focus() {
        let mut editor = SimulatedEditor::new(Path::new("/work"));
        let a = editor.push_buffer("a");
        editor.push_buffer("b");
        assert_eq!(editor.current_buffer().unwrap().id, a);
        assert_eq!(editor.last_buffer().unwrap().name, "b");
    }

    #[test]
    fn unknown_buffer_is_an_error() {
        let mut editor = SimulatedEditor::new(Path::new("/work"));
        assert_eq!(editor.set_current_buffer(9), Err(HostError::NoSuchBuffer(9)));
    }

    #[test]
    fn typing_writes_swap_in_first_search_dir() {
        let tmp = TempDir::new().unwrap();
        let mut editor = SimulatedEditor::new(tmp.path());
        let id = editor.push_buffer("tmp_buf1.7");
        editor.type_text(id, "draft").unwrap();
        let swap = tmp.path().join(".tmp_buf1.7.swp");
        assert_eq!(fs::read_to_string(swap).unwrap(), "draft");
        assert!(editor.buffer_state(id).unwrap().modified);
    }

    #[test]
    fn layout_round_trips_buffer_names() {
        let tmp = TempDir::new().unwrap();
        let mut editor = SimulatedEditor::new(tmp.path());
        editor.push_buffer("tmp_buf1.7");
        editor.push_buffer("notes.txt");
        let layout = tmp.path().join("layout");
        editor.write_layout(&layout).unwrap();
        let text = fs::read_to_string(&layout).unwrap();
        assert!(text.starts_with(LAYOUT_HEADER));
        assert!(text.contains("tmp_buf1.7\nnotes.txt\n"));
    }

    #[test]
    fn wipe_stale_name_refocuses() {
        let mut editor = SimulatedEditor::new(Path::new("/work"));
        editor.push_buffer("old");
        let b = editor.push_buffer("keep");
        editor.wipe_stale_name("old").unwrap();
        assert_eq!(editor.buffers().len(), 1);
        assert_eq!(editor.current_buffer().unwrap().id, b);
    }
}
