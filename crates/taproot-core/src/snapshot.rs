//! Committed snapshot of one generation: the storage boundary.
//!
//! The snapshot is a single bincode document replaced atomically on commit,
//! so readers only ever see a whole generation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cache::{atomic_write, snapshot_path};
use crate::metrics::MetricsReport;
use crate::model::{Edge, FileEdge, FileRecord, Generation, IndexState, Symbol};
use crate::resolve::ResolutionStats;

/// Bumped whenever the persisted layout changes.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("snapshot {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to encode snapshot: {0}")]
    Encode(String),

    #[error("snapshot format version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },
}

/// One committed generation: the Files, Symbols, Edges, Metrics, FileEdges
/// and IndexState tables plus run statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub state: IndexState,
    /// Sorted by path.
    pub files: Vec<FileRecord>,
    /// Indexed by symbol id.
    pub symbols: Vec<Symbol>,
    /// Sorted by (source, target, kind).
    pub edges: Vec<Edge>,
    /// Sorted by (source file, target file).
    pub file_edges: Vec<FileEdge>,
    pub metrics: MetricsReport,
    pub resolution: ResolutionStats,
    /// Files whose extraction failed and contributed no symbols.
    pub failed_files: Vec<String>,
}

impl Snapshot {
    pub fn generation(&self) -> Generation {
        self.state.generation
    }

    /// Write the snapshot under `root`, replacing the previous one atomically.
    pub fn save(&self, root: &Path) -> Result<(), SnapshotError> {
        let path = snapshot_path(root);
        let bytes = bincode::serialize(self).map_err(|e| SnapshotError::Encode(e.to_string()))?;
        atomic_write(&path, &bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Snapshot written");
        Ok(())
    }

    /// Load the committed snapshot; `Ok(None)` when none exists yet.
    pub fn load(root: &Path) -> Result<Option<Snapshot>, SnapshotError> {
        let path = snapshot_path(root);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Self::decode(&path, &bytes).map(Some)
    }

    /// Generation recorded in the snapshot header, read without decoding the
    /// tables, so it survives damage further into the file.
    pub fn peek_generation(root: &Path) -> Option<Generation> {
        let bytes = fs::read(snapshot_path(root)).ok()?;
        let (version, generation): (u32, Generation) = bincode::deserialize(&bytes).ok()?;
        (version == SNAPSHOT_VERSION).then_some(generation)
    }

    fn decode(path: &Path, bytes: &[u8]) -> Result<Snapshot, SnapshotError> {
        // Check the version prefix before decoding the rest
        let version: u32 = bincode::deserialize(bytes).map_err(|e| SnapshotError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                found: version,
                expected: SNAPSHOT_VERSION,
            });
        }
        let snapshot: Snapshot = bincode::deserialize(bytes).map_err(|e| SnapshotError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        snapshot.validate(path)?;
        Ok(snapshot)
    }

    /// Reject snapshots whose tables disagree with each other.
    fn validate(&self, path: &Path) -> Result<(), SnapshotError> {
        let corrupt = |reason: String| SnapshotError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };
        for (i, symbol) in self.symbols.iter().enumerate() {
            if symbol.id.index() != i {
                return Err(corrupt(format!("symbol {} stored at position {i}", symbol.id)));
            }
        }
        let n = self.symbols.len();
        if let Some(edge) = self
            .edges
            .iter()
            .find(|e| e.source.index() >= n || e.target.index() >= n)
        {
            return Err(corrupt(format!("edge {} -> {} references a missing symbol", edge.source, edge.target)));
        }
        if !self.metrics.symbols.is_empty() && self.metrics.symbols.len() != n {
            return Err(corrupt(format!(
                "{} metric rows for {n} symbols",
                self.metrics.symbols.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ensure_state_dir;
    use crate::model::{EdgeKind, Language, SymbolId, SymbolKind};
    use chrono::Utc;

    fn sample() -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            state: IndexState {
                generation: Generation(3),
                built_at: Utc::now(),
                lock_owner: Some(42),
            },
            files: vec![],
            symbols: vec![Symbol {
                id: SymbolId(0),
                name: "main".to_string(),
                qualified_name: "main".to_string(),
                kind: SymbolKind::Function,
                file_path: "main.py".to_string(),
                start_line: 1,
                end_line: 3,
                signature: "def main()".to_string(),
                exported: true,
                language: Language::Python,
            }],
            edges: vec![Edge {
                source: SymbolId(0),
                target: SymbolId(0),
                kind: EdgeKind::Call,
                ambiguous: false,
            }],
            file_edges: vec![],
            metrics: MetricsReport::default(),
            resolution: ResolutionStats::default(),
            failed_files: vec![],
        }
    }

    #[test]
    fn test_missing_snapshot_is_none() {
        let temp = tempfile::tempdir().unwrap();
        assert!(Snapshot::load(temp.path()).unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let temp = tempfile::tempdir().unwrap();
        let snapshot = sample();
        snapshot.save(temp.path()).unwrap();

        let loaded = Snapshot::load(temp.path()).unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.generation(), Generation(3));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let temp = tempfile::tempdir().unwrap();
        ensure_state_dir(temp.path()).unwrap();
        fs::write(snapshot_path(temp.path()), [1u8, 0, 0, 0, 0xff, 0xff]).unwrap();

        let err = Snapshot::load(temp.path()).unwrap_err();
        assert!(matches!(err, SnapshotError::Corrupt { .. }));
    }

    #[test]
    fn test_dangling_edge_is_corrupt() {
        let temp = tempfile::tempdir().unwrap();
        let mut snapshot = sample();
        snapshot.edges[0].target = SymbolId(9);
        snapshot.save(temp.path()).unwrap();

        assert!(matches!(Snapshot::load(temp.path()), Err(SnapshotError::Corrupt { .. })));
    }

    #[test]
    fn test_generation_survives_truncated_tables() {
        let temp = tempfile::tempdir().unwrap();
        let bytes = bincode::serialize(&sample()).unwrap();
        ensure_state_dir(temp.path()).unwrap();
        fs::write(snapshot_path(temp.path()), &bytes[..bytes.len() / 2]).unwrap();

        assert!(Snapshot::load(temp.path()).is_err());
        assert_eq!(Snapshot::peek_generation(temp.path()), Some(Generation(3)));

        fs::write(snapshot_path(temp.path()), b"not a snapshot").unwrap();
        assert_eq!(Snapshot::peek_generation(temp.path()), None);
    }

    #[test]
    fn test_version_mismatch() {
        let temp = tempfile::tempdir().unwrap();
        let mut snapshot = sample();
        snapshot.version = SNAPSHOT_VERSION + 1;
        snapshot.save(temp.path()).unwrap();

        assert!(matches!(
            Snapshot::load(temp.path()),
            Err(SnapshotError::VersionMismatch { .. })
        ));
    }
}
