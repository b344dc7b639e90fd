//! Backup directory layout.
//!
//! Everything reco writes lives flat in one directory:
//!
//! ```text
//! <root>/<backup_prefix>.<pid>        session descriptor of a live (or dead) editor
//! <root>/<encoded file path>          file contents taken before a swap recovery
//! <root>/<encoded file path>.swp      swap file relocated out of the way of a conflict
//! <root>/<encoded swap path>          swap of an unnamed buffer left by a dead editor
//! ```
//!
//! Paths are turned into single file names by percent-encoding `/` and `%`,
//! so every artifact name decodes back to the absolute path it came from.

use std::fs::{self, File, FileTimes};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::naming::NamingScheme;

/// Bytes that may not appear verbatim in an artifact file name.
const ARTIFACT_NAME: &AsciiSet = &CONTROLS.add(b'/').add(b'%');

const SWAP_SUFFIX: &str = ".swp";

/// Handle on the backup directory.
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    /// Open (creating if needed) the backup directory.
    ///
    /// `~` is expanded and relative paths are resolved against the current
    /// directory. A directory created here is made private to the user.
    pub fn open(directory: &str) -> Result<Self, StoreError> {
        let expanded = expand_tilde(directory);
        let root = std::path::absolute(&expanded).map_err(|source| StoreError::CreateFailed {
            path: expanded.clone(),
            source,
        })?;

        if root.exists() {
            if !root.is_dir() {
                return Err(StoreError::NotADirectory { path: root });
            }
        } else {
            fs::create_dir_all(&root).map_err(|source| StoreError::CreateFailed {
                path: root.clone(),
                source,
            })?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&root, fs::Permissions::from_mode(0o700)).map_err(
                    |source| StoreError::CreateFailed {
                        path: root.clone(),
                        source,
                    },
                )?;
            }
            info!(path = %root.display(), "created backup directory");
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the descriptor of editor `pid` is written.
    pub fn session_path(&self, scheme: &NamingScheme, pid: u32) -> PathBuf {
        self.root.join(scheme.session_file_name(pid))
    }

    /// Where the pre-recovery contents of `source` are kept.
    pub fn file_snapshot_path(&self, source: &Path) -> PathBuf {
        self.root.join(encode_path(source))
    }

    /// Where the conflicting swap of `source` is relocated.
    pub fn swap_copy_path(&self, source: &Path) -> PathBuf {
        self.root
            .join(format!("{}{SWAP_SUFFIX}", encode_path(source)))
    }

    /// Where an orphaned swap file is moved before it is replayed.
    pub fn relocated_swap_path(&self, swap: &Path) -> PathBuf {
        self.root.join(encode_path(swap))
    }

    /// Existing pre-recovery snapshot of `source`, if one was taken.
    pub fn snapshot_of(&self, source: &Path) -> Option<PathBuf> {
        let path = self.file_snapshot_path(source);
        path.is_file().then_some(path)
    }

    /// Enumerate the artifacts reco recognises in the directory.
    ///
    /// Unrelated files are skipped, which matters when the backup directory
    /// is the home directory.
    pub fn list_artifacts(&self, scheme: &NamingScheme) -> Result<Vec<BackupArtifact>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|source| StoreError::ListFailed {
            path: self.root.clone(),
            source,
        })?;

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::ListFailed {
                path: self.root.clone(),
                source,
            })?;
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(classified) = classify(name, scheme) else {
                continue;
            };
            let metadata = entry.metadata().ok();
            artifacts.push(BackupArtifact {
                path: entry.path(),
                kind: classified.kind,
                origin: classified.origin,
                owner_pid: classified.owner_pid,
                size: metadata.as_ref().map_or(0, |m| m.len()),
                modified: metadata.and_then(|m| m.modified().ok()),
            });
        }
        artifacts.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(count = artifacts.len(), root = %self.root.display(), "listed backup artifacts");
        Ok(artifacts)
    }
}

/// Kind of file found in the backup directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Session descriptor of an editor instance.
    SessionSnapshot,
    /// File contents captured before recovery.
    FileSnapshot,
    /// A relocated swap file.
    SwapCopy,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionSnapshot => "session",
            Self::FileSnapshot => "snapshot",
            Self::SwapCopy => "swap",
        }
    }
}

/// One recognised file in the backup directory.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    /// Decoded path the artifact was taken from.
    pub origin: Option<PathBuf>,
    /// Editor process that owns the artifact, when the name carries one.
    pub owner_pid: Option<u32>,
    pub size: u64,
    #[serde(skip)]
    pub modified: Option<SystemTime>,
}

impl BackupArtifact {
    /// Describe an artifact just written to `path` from `origin`.
    pub fn from_disk(kind: ArtifactKind, origin: &Path, path: PathBuf) -> Self {
        let metadata = fs::metadata(&path).ok();
        Self {
            kind,
            origin: Some(origin.to_path_buf()),
            owner_pid: None,
            size: metadata.as_ref().map_or(0, |m| m.len()),
            modified: metadata.and_then(|m| m.modified().ok()),
            path,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Classified {
    kind: ArtifactKind,
    origin: Option<PathBuf>,
    owner_pid: Option<u32>,
}

fn classify(name: &str, scheme: &NamingScheme) -> Option<Classified> {
    if let Some(session) = scheme.parse_session_name(name) {
        return Some(Classified {
            kind: ArtifactKind::SessionSnapshot,
            origin: None,
            owner_pid: Some(session.pid()),
        });
    }

    // Only encoded absolute paths are ours.
    let origin = decode_artifact_name(name)?;
    if !origin.is_absolute() {
        return None;
    }

    if name.ends_with(SWAP_SUFFIX) {
        let owner_pid = origin
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(SWAP_SUFFIX))
            .map(|n| n.strip_prefix('.').unwrap_or(n))
            .and_then(|n| scheme.owner_pid(n));
        return Some(Classified {
            kind: ArtifactKind::SwapCopy,
            origin: Some(origin),
            owner_pid,
        });
    }

    Some(Classified {
        kind: ArtifactKind::FileSnapshot,
        origin: Some(origin),
        owner_pid: None,
    })
}

/// Flatten a path into one file name.
pub fn encode_path(path: &Path) -> String {
    utf8_percent_encode(&path.to_string_lossy(), ARTIFACT_NAME).to_string()
}

/// Inverse of [`encode_path`]. Returns `None` for names that are not valid UTF-8 once decoded.
pub fn decode_artifact_name(name: &str) -> Option<PathBuf> {
    percent_decode_str(name)
        .decode_utf8()
        .ok()
        .map(|decoded| PathBuf::from(decoded.as_ref()))
}

/// Copy `from` to `to`, keeping access and modification times.
pub fn copy_preserving(from: &Path, to: &Path) -> io::Result<u64> {
    let bytes = fs::copy(from, to)?;
    let meta = fs::metadata(from)?;
    let times = FileTimes::new()
        .set_accessed(meta.accessed()?)
        .set_modified(meta.modified()?);
    File::options().write(true).open(to)?.set_times(times)?;
    Ok(bytes)
}

/// Remove a file; returns false when it did not exist.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Whether process `pid` still exists.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // Zero and values past i32::MAX would address process groups.
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw == 0 {
        return false;
    }
    // EPERM means the process exists but belongs to someone else.
    matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM))
}

/// Whether process `pid` still exists. Without a liveness check every owner counts as live.
#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    true
}
