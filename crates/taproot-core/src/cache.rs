//! On-disk layout of the `.taproot/` state directory

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// State directory: .taproot/
pub const STATE_DIR: &str = ".taproot";

/// Optional project configuration file at the root.
pub const CONFIG_FILE: &str = ".taproot.toml";

/// Committed snapshot of the last generation.
pub const SNAPSHOT_FILE: &str = "snapshot.bin";

/// Per-file extraction results kept for incremental runs.
pub const EXTRACTIONS_FILE: &str = "extractions.bin";

/// Single-writer lock artifact.
pub const LOCK_FILE: &str = "index.lock";

/// Advisory-locked file that serialises changes to the lock artifact.
/// Never removed.
pub const LOCK_GUARD_FILE: &str = "index.guard";

pub fn state_dir(root: &Path) -> PathBuf {
    root.join(STATE_DIR)
}

pub fn snapshot_path(root: &Path) -> PathBuf {
    state_dir(root).join(SNAPSHOT_FILE)
}

pub fn extractions_path(root: &Path) -> PathBuf {
    state_dir(root).join(EXTRACTIONS_FILE)
}

pub fn lock_path(root: &Path) -> PathBuf {
    state_dir(root).join(LOCK_FILE)
}

pub fn lock_guard_path(root: &Path) -> PathBuf {
    state_dir(root).join(LOCK_GUARD_FILE)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Ensure the state directory exists
pub fn ensure_state_dir(root: &Path) -> io::Result<()> {
    let dir = state_dir(root);
    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }
    Ok(())
}

/// Remove the committed snapshot and extraction cache, leaving any lock alone.
pub fn clear_state(root: &Path) -> io::Result<()> {
    for path in [snapshot_path(root), extractions_path(root)] {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Write to a `.tmp` sibling, fsync, then rename over `path`.
///
/// Readers see either the old file or the new one, never a partial write.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;
    {
        let mut writer = BufWriter::new(&mut file);
        writer.write_all(contents)?;
        writer.flush()?;
    }
    file.sync_all()?;

    fs::rename(&tmp_path, path)?;
    Ok(())
}
