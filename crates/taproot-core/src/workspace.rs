//! Project root detection

use std::path::{Path, PathBuf};

use crate::cache::{CONFIG_FILE, STATE_DIR};

/// Markers checked in each directory while walking up; first match wins.
const ROOT_MARKERS: &[&str] = &[STATE_DIR, CONFIG_FILE, ".git", ".hg", ".jj"];

/// Walk up from `start` to the nearest directory holding an index, a config
/// file or a VCS marker. Falls back to `start` itself.
pub fn find_project_root(start: &Path) -> PathBuf {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    let mut current = start.as_path();
    loop {
        if ROOT_MARKERS.iter().any(|m| current.join(m).exists()) {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return start,
        }
    }
}

/// True when `root` is the top of a git work tree.
pub fn is_git_root(root: &Path) -> bool {
    root.join(".git").exists()
}
