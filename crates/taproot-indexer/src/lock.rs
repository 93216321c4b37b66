//! Single-writer index lock
//!
//! `.taproot/index.lock` records the pid of the process building a
//! generation. A lock whose owner is gone is reclaimed; a live owner makes
//! the new run fail fast.
//!
//! Inspecting, reclaiming and releasing the lock file all happen under an
//! exclusive advisory lock on `.taproot/index.guard`, so two writers can never
//! both reclaim the same stale lock, and a release never removes a lock file
//! that another writer has since taken.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use taproot_core::{ensure_state_dir, lock_guard_path, lock_path};
use tracing::{debug, warn};

use crate::error::{IndexError, Result};

/// Contents of the lock artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Held for the duration of an index run; removes the lock file on drop.
#[derive(Debug)]
pub struct IndexLock {
    path: PathBuf,
    guard_path: PathBuf,
    info: LockInfo,
}

/// Exclusive advisory lock on the guard file, released on drop.
struct Guard {
    file: File,
}

impl Guard {
    fn acquire(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.lock_exclusive()?;
        Ok(Guard { file })
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl IndexLock {
    pub fn acquire(root: &Path) -> Result<Self> {
        ensure_state_dir(root)?;
        let path = lock_path(root);
        let guard_path = lock_guard_path(root);
        let info = LockInfo {
            pid: std::process::id(),
            started_at: Utc::now(),
        };
        let _guard = Guard::acquire(&guard_path)?;

        // one retry after reclaiming a stale lock
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let body = serde_json::to_vec(&info).map_err(io::Error::other)?;
                    file.write_all(&body)?;
                    file.sync_all()?;
                    debug!("Acquired {} (pid {})", path.display(), info.pid);
                    return Ok(IndexLock { path, guard_path, info });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    match read_lock(&path) {
                        Some(held) if process_alive(held.pid) => {
                            return Err(IndexError::LockContention {
                                lock_path: path,
                                pid: held.pid,
                            });
                        }
                        Some(held) => warn!(
                            "Reclaiming stale lock {} (pid {} is not running)",
                            path.display(),
                            held.pid
                        ),
                        None => warn!("Reclaiming unreadable lock {}", path.display()),
                    }
                    remove_if_present(&path)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("could not acquire {}", path.display()),
        )
        .into())
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file if it still records this holder.
    fn release(&self) -> io::Result<()> {
        let _guard = Guard::acquire(&self.guard_path)?;
        match read_lock(&self.path) {
            Some(held) if held == self.info => remove_if_present(&self.path),
            Some(held) => {
                warn!(
                    "Leaving {} in place: it now belongs to pid {}",
                    self.path.display(),
                    held.pid
                );
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}

/// Current holder of the lock at `root`, if any.
pub fn current_holder(root: &Path) -> Option<LockInfo> {
    read_lock(&lock_path(root))
}

fn read_lock(path: &Path) -> Option<LockInfo> {
    let content = fs::read(path).ok()?;
    serde_json::from_slice(&content).ok()
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // signal 0 only checks for existence; EPERM means it exists under another user
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Other processes cannot be probed here; any recorded owner counts as alive.
#[cfg(not(unix))]
pub fn process_alive(pid: u32) -> bool {
    pid != 0
}
