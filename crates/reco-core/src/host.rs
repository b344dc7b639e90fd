//! The editor as seen from the recovery core.
//!
//! Every editor interaction goes through [`EditorHost`]. A real embedding
//! forwards these calls to the editor's scripting interface; the
//! [`SimulatedEditor`](crate::simulation::SimulatedEditor) implements them in
//! memory.

use std::path::{Path, PathBuf};

use crate::error::HostError;
use crate::naming::NamingScheme;

/// Editor-assigned buffer number. Not stable across restarts.
pub type BufferId = u32;

/// Snapshot of one buffer's identity and flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferIdentity {
    pub id: BufferId,
    /// Display name; empty for an unnamed buffer.
    pub name: String,
    pub modified: bool,
}

impl BufferIdentity {
    pub fn is_unnamed(&self) -> bool {
        self.name.is_empty()
    }

    /// Scratch buffers carry a generated name and are never saved to a user path.
    pub fn is_scratch(&self, scheme: &NamingScheme) -> bool {
        scheme.is_generated_name(&self.name)
    }

    /// Process that created the buffer's generated name.
    pub fn owner_pid(&self, scheme: &NamingScheme) -> Option<u32> {
        scheme.owner_pid(&self.name)
    }

    /// The buffer name as an absolute path.
    pub fn absolute_path(&self, working_dir: &Path) -> PathBuf {
        let name = Path::new(&self.name);
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            working_dir.join(name)
        }
    }
}

/// How the editor should resolve a swap-file conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapChoice {
    /// Discard the swap file; recovery happens from the relocated copy.
    Delete,
    /// Relocation failed; let the editor ask the user as usual.
    Prompt,
}

impl SwapChoice {
    /// Value for Vim's `v:swapchoice`.
    pub fn as_vim_choice(self) -> &'static str {
        match self {
            Self::Delete => "d",
            Self::Prompt => "",
        }
    }
}

/// Editor primitives consumed by the recovery core.
///
/// New buffers are always appended to the end of [`buffers`](Self::buffers).
/// Layout writes and recoveries are fire-and-forget in a real editor, so
/// implementations report only hard failures.
pub trait EditorHost {
    fn buffers(&self) -> Vec<BufferIdentity>;

    fn buffer(&self, id: BufferId) -> Option<BufferIdentity> {
        self.buffers().into_iter().find(|b| b.id == id)
    }

    fn last_buffer(&self) -> Option<BufferIdentity> {
        self.buffers().pop()
    }

    fn current_buffer(&self) -> Option<BufferIdentity>;

    fn set_current_buffer(&mut self, id: BufferId) -> Result<(), HostError>;

    fn rename_buffer(&mut self, id: BufferId, name: &str) -> Result<(), HostError>;

    /// Drop any leftover buffer entry still holding `name` after a rename.
    fn wipe_stale_name(&mut self, name: &str) -> Result<(), HostError>;

    fn set_modified(&mut self, id: BufferId, modified: bool) -> Result<(), HostError>;

    fn set_swap_enabled(&mut self, id: BufferId, enabled: bool) -> Result<(), HostError>;

    /// `false` marks the buffer as not backed by a file (`buftype=nofile`).
    fn set_persistent(&mut self, id: BufferId, persistent: bool) -> Result<(), HostError>;

    /// A session descriptor is being sourced right now.
    fn is_loading_session(&self) -> bool;

    /// Descriptor this instance was started from, if any.
    fn resumed_session(&self) -> Option<PathBuf>;

    /// Configured swap directories, in search order.
    fn swap_search_dirs(&self) -> Vec<String>;

    fn working_dir(&self) -> PathBuf {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Write a script that recreates the current layout.
    fn write_layout(&mut self, path: &Path) -> Result<(), HostError>;

    /// Recover content from a swap artifact into the focused buffer.
    fn recover_from(&mut self, artifact: &Path) -> Result<(), HostError>;

    /// Save the focused buffer to its file.
    fn write_current(&mut self) -> Result<(), HostError>;

    fn set_buffer_text(&mut self, id: BufferId, text: &str) -> Result<(), HostError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_detection_uses_grammar() {
        let scheme = NamingScheme::new("tmp_buf", "reco_backup").unwrap();
        let scratch = BufferIdentity {
            id: 1,
            name: "/work/tmp_buf2.77".to_string(),
            modified: false,
        };
        assert!(scratch.is_scratch(&scheme));
        assert_eq!(scratch.owner_pid(&scheme), Some(77));

        let file = BufferIdentity {
            id: 2,
            name: "notes.txt".to_string(),
            modified: true,
        };
        assert!(!file.is_scratch(&scheme));
        assert!(!file.is_unnamed());
        assert_eq!(
            file.absolute_path(Path::new("/work")),
            PathBuf::from("/work/notes.txt")
        );
    }

    #[test]
    fn swap_choice_maps_to_vim_values() {
        assert_eq!(SwapChoice::Delete.as_vim_choice(), "d");
        assert_eq!(SwapChoice::Prompt.as_vim_choice(), "");
    }
}
