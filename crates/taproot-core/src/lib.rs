//! Taproot Core: symbol model, resolution, metrics engine and snapshot queries

pub mod model;
pub mod symbols;
pub mod resolve;
pub mod aggregation;
pub mod graph;
pub mod metrics;
pub mod diff;
pub mod workspace;
pub mod cache;
pub mod snapshot;
pub mod query;


pub use model::{
    Edge, EdgeKind, FileEdge, FileRecord, Generation, IndexState, Language, LanguageFamily, RawReference,
    ReferenceKind, Symbol, SymbolDef, SymbolId, SymbolKind, SymbolMetrics,
};
pub use symbols::{ExtractedFile, SymbolTable};
pub use resolve::{resolve, Resolution, ResolutionStats, Tier};
pub use aggregation::{aggregate_file_edges, file_neighbours};
pub use graph::SymbolGraph;
pub use metrics::{compute_all, MetricError, MetricKind, MetricsConfig, MetricsReport, OmittedMetric};
pub use diff::{diff_files, FileChangeSet, ObservedFile};
pub use workspace::{find_project_root, is_git_root};
pub use cache::{
    atomic_write, clear_state, config_path, ensure_state_dir, extractions_path, lock_guard_path, lock_path, snapshot_path,
    state_dir, CONFIG_FILE, EXTRACTIONS_FILE, LOCK_FILE, LOCK_GUARD_FILE, SNAPSHOT_FILE, STATE_DIR,
};
pub use snapshot::{Snapshot, SnapshotError, SNAPSHOT_VERSION};
pub use query::{FanMode, QueryError, SnapshotView};
