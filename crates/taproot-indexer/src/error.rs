//! Indexer error types

use std::io;
use std::path::PathBuf;

use taproot_core::SnapshotError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error(
        "index is locked by running process {pid} (lock file: {lock_path}); \
         wait for it to finish, or delete the lock file if that process is gone"
    )]
    LockContention { lock_path: PathBuf, pid: u32 },

    #[error("{0}; run `taproot index --force` to rebuild from scratch")]
    Snapshot(#[from] SnapshotError),

    #[error("invalid configuration in {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("indexing cancelled before commit")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;
