//! Line diff between a pre-recovery snapshot and the recovered file.

use std::path::{Path, PathBuf};

use similar::{ChangeTag, TextDiff};

/// Delta between the snapshot taken before recovery and the file now on disk.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SnapshotDiff {
    pub snapshot: PathBuf,
    pub current: PathBuf,
    /// Unified diff text; empty when nothing changed.
    pub unified: String,
    pub inserted: usize,
    pub deleted: usize,
}

impl SnapshotDiff {
    pub fn is_unchanged(&self) -> bool {
        self.inserted == 0 && self.deleted == 0
    }
}

/// Diff two files. A missing `current` file diffs as empty.
pub fn diff_files(snapshot: &Path, current: &Path) -> std::io::Result<SnapshotDiff> {
    let before = std::fs::read_to_string(snapshot)?;
    let after = match std::fs::read_to_string(current) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err),
    };
    Ok(diff_texts(snapshot, current, &before, &after))
}

pub fn diff_texts(snapshot: &Path, current: &Path, before: &str, after: &str) -> SnapshotDiff {
    let diff = TextDiff::from_lines(before, after);
    let mut inserted = 0;
    let mut deleted = 0;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => inserted += 1,
            ChangeTag::Delete => deleted += 1,
            ChangeTag::Equal => {}
        }
    }
    let unified = diff
        .unified_diff()
        .context_radius(3)
        .header("pre-recovery", "recovered")
        .to_string();

    SnapshotDiff {
        snapshot: snapshot.to_path_buf(),
        current: current.to_path_buf(),
        unified,
        inserted,
        deleted,
    }
}
