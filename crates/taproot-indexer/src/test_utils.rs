//! Test utilities for the indexer

use std::fs;
use std::path::Path;

use tempfile::TempDir;

/// Create a project directory holding the given `(path, content)` files
pub fn create_repo_with_structure(structure: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    for (path, content) in structure {
        write_file(temp_dir.path(), path, content);
    }
    temp_dir
}

/// Write `content` to `root/path`, creating parent directories
pub fn write_file(root: &Path, path: &str, content: &str) {
    let full_path = root.join(path);
    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&full_path, content).unwrap();
}

/// Push the file's mtime forward so the next run sees it as touched even on
/// filesystems with coarse timestamps
pub fn bump_mtime(root: &Path, path: &str) {
    let file = fs::File::options().write(true).open(root.join(path)).unwrap();
    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
    file.set_modified(later).unwrap();
}
