//! Read-only queries over one committed snapshot.
//!
//! Every response is a plain serializable struct so callers can print it as
//! JSON directly.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregation::file_neighbours;
use crate::graph::SymbolGraph;
use crate::metrics::paths::k_shortest_paths;
use crate::metrics::{self, CouplingStrength, CycleSeverity, FileCycle, MetricKind, OmittedMetric};
use crate::model::{EdgeKind, Language, Symbol, SymbolId, SymbolKind, SymbolMetrics};
use crate::resolve::ResolutionStats;
use crate::snapshot::{Snapshot, SnapshotError};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("no symbol named `{0}` in the index")]
    SymbolNotFound(String),

    #[error("file `{0}` is not in the index")]
    FileNotFound(String),

    #[error("no index found; run `taproot index` first")]
    NoSnapshot,

    #[error("{metric:?} was not computed for this generation: {reason}")]
    MetricUnavailable { metric: MetricKind, reason: String },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Compact symbol representation used in every response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolSummary {
    pub id: u32,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl From<&Symbol> for SymbolSummary {
    fn from(symbol: &Symbol) -> Self {
        SymbolSummary {
            id: symbol.id.0,
            name: symbol.name.clone(),
            qualified_name: symbol.qualified_name.clone(),
            kind: symbol.kind,
            file_path: symbol.file_path.clone(),
            start_line: symbol.start_line,
            end_line: symbol.end_line,
        }
    }
}

/// A caller or callee together with the edge that links it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbour {
    pub symbol: SymbolSummary,
    pub kind: EdgeKind,
    pub ambiguous: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolDetail {
    pub symbol: SymbolSummary,
    pub signature: String,
    pub exported: bool,
    pub language: Language,
    pub metrics: Option<SymbolMetrics>,
    pub callers: Vec<Neighbour>,
    pub callees: Vec<Neighbour>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileDetail {
    pub path: String,
    pub language: Language,
    pub hash: String,
    pub generation: u64,
    pub symbols: Vec<SymbolSummary>,
    pub imports: Vec<String>,
    pub imported_by: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathResult {
    pub nodes: Vec<SymbolSummary>,
    pub kinds: Vec<EdgeKind>,
    pub cost: f64,
    pub coupling: f64,
    pub strength: CouplingStrength,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
    pub scc_id: u32,
    pub severity: CycleSeverity,
    pub files: Vec<String>,
    pub members: Vec<SymbolSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CyclesResult {
    pub symbol_cycles: Vec<CycleSummary>,
    pub file_cycles: Vec<FileCycle>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommunitySummary {
    pub id: u32,
    pub label: String,
    pub directory: String,
    pub size: usize,
    pub internal_edges: usize,
    pub cohesion: Option<f64>,
    pub members: Vec<SymbolSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommunitiesResult {
    pub modularity: f64,
    pub communities: Vec<CommunitySummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSummary {
    pub layer: u32,
    pub members: Vec<SymbolSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationSummary {
    pub source: SymbolSummary,
    pub target: SymbolSummary,
    pub kind: EdgeKind,
    pub source_layer: u32,
    pub target_layer: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayersResult {
    pub layer_count: u32,
    pub layers: Vec<LayerSummary>,
    pub violations: Vec<ViolationSummary>,
}

/// Which degree a fan ranking sorts by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanMode {
    In,
    Out,
    Total,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FanEntry {
    pub symbol: SymbolSummary,
    pub fan_in: u32,
    pub fan_out: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub generation: u64,
    pub built_at: DateTime<Utc>,
    pub files: usize,
    pub failed_files: Vec<String>,
    pub symbols: usize,
    pub edges: usize,
    pub ambiguous_edges: usize,
    pub file_edges: usize,
    pub cycles: usize,
    pub file_cycles: usize,
    pub resolution: ResolutionStats,
    /// Share of references that produced an edge or named a known module.
    pub coverage: f64,
    pub omitted_metrics: Vec<OmittedMetric>,
}

/// Indexed view over a loaded snapshot.
pub struct SnapshotView {
    snapshot: Snapshot,
    graph: SymbolGraph,
    by_name: HashMap<String, Vec<SymbolId>>,
    by_qualified: HashMap<String, Vec<SymbolId>>,
    /// symbol index -> positions in `snapshot.edges`
    incoming: Vec<Vec<usize>>,
    outgoing: Vec<Vec<usize>>,
}

impl SnapshotView {
    pub fn new(snapshot: Snapshot) -> Self {
        let n = snapshot.symbols.len();
        let graph = SymbolGraph::build(n, &snapshot.edges);

        let mut by_name: HashMap<String, Vec<SymbolId>> = HashMap::new();
        let mut by_qualified: HashMap<String, Vec<SymbolId>> = HashMap::new();
        for symbol in &snapshot.symbols {
            by_name.entry(symbol.name.clone()).or_default().push(symbol.id);
            by_qualified
                .entry(symbol.qualified_name.clone())
                .or_default()
                .push(symbol.id);
        }

        let mut incoming = vec![Vec::new(); n];
        let mut outgoing = vec![Vec::new(); n];
        for (i, edge) in snapshot.edges.iter().enumerate() {
            if edge.source.index() < n && edge.target.index() < n {
                outgoing[edge.source.index()].push(i);
                incoming[edge.target.index()].push(i);
            }
        }

        SnapshotView {
            snapshot,
            graph,
            by_name,
            by_qualified,
            incoming,
            outgoing,
        }
    }

    /// Load the committed snapshot under `root`.
    pub fn open(root: &Path) -> Result<Self, QueryError> {
        let snapshot = Snapshot::load(root)?.ok_or(QueryError::NoSnapshot)?;
        Ok(Self::new(snapshot))
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.snapshot.symbols.get(id.index())
    }

    fn summaries(&self, ids: &[SymbolId]) -> Vec<SymbolSummary> {
        ids.iter()
            .filter_map(|&id| self.symbol(id))
            .map(SymbolSummary::from)
            .collect()
    }

    /// Symbols whose name matches exactly, falling back to an exact
    /// qualified-name match. Ordered by id.
    pub fn find_symbols(&self, name: &str) -> Vec<&Symbol> {
        let ids = self
            .by_name
            .get(name)
            .or_else(|| self.by_qualified.get(name))
            .map(Vec::as_slice)
            .unwrap_or_default();
        ids.iter().filter_map(|&id| self.symbol(id)).collect()
    }

    fn require_symbols(&self, name: &str) -> Result<Vec<SymbolId>, QueryError> {
        let ids: Vec<SymbolId> = self.find_symbols(name).into_iter().map(|s| s.id).collect();
        if ids.is_empty() {
            return Err(QueryError::SymbolNotFound(name.to_string()));
        }
        Ok(ids)
    }

    fn neighbours(&self, positions: &[usize], incoming: bool) -> Vec<Neighbour> {
        positions
            .iter()
            .filter_map(|&i| self.snapshot.edges.get(i))
            .filter_map(|edge| {
                let other = if incoming { edge.source } else { edge.target };
                self.symbol(other).map(|s| Neighbour {
                    symbol: SymbolSummary::from(s),
                    kind: edge.kind,
                    ambiguous: edge.ambiguous,
                })
            })
            .collect()
    }

    /// Detail for every symbol matching `name`.
    pub fn symbol_detail(&self, name: &str) -> Result<Vec<SymbolDetail>, QueryError> {
        let ids = self.require_symbols(name)?;
        Ok(ids
            .into_iter()
            .filter_map(|id| self.symbol(id))
            .map(|symbol| {
                let i = symbol.id.index();
                let mut callers = self.neighbours(&self.incoming[i], true);
                callers.sort_by(|a, b| (a.symbol.id, a.kind).cmp(&(b.symbol.id, b.kind)));
                SymbolDetail {
                    symbol: SymbolSummary::from(symbol),
                    signature: symbol.signature.clone(),
                    exported: symbol.exported,
                    language: symbol.language,
                    metrics: self.snapshot.metrics.symbols.get(i).cloned(),
                    callers,
                    callees: self.neighbours(&self.outgoing[i], false),
                }
            })
            .collect())
    }

    pub fn file_detail(&self, path: &str) -> Result<FileDetail, QueryError> {
        let path = path.trim_start_matches("./");
        let record = self
            .snapshot
            .files
            .binary_search_by(|f| f.path.as_str().cmp(path))
            .ok()
            .and_then(|i| self.snapshot.files.get(i))
            .ok_or_else(|| QueryError::FileNotFound(path.to_string()))?;

        let symbols = self
            .snapshot
            .symbols
            .iter()
            .filter(|s| s.file_path == record.path)
            .map(SymbolSummary::from)
            .collect();
        let (imports, imported_by) = file_neighbours(&self.snapshot.file_edges, &record.path);

        Ok(FileDetail {
            path: record.path.clone(),
            language: record.language,
            hash: record.hash.clone(),
            generation: record.generation.0,
            symbols,
            imports: imports.into_iter().map(str::to_string).collect(),
            imported_by: imported_by.into_iter().map(str::to_string).collect(),
        })
    }

    /// Up to `k` cheapest paths between any symbol named `from` and any
    /// symbol named `to`.
    pub fn k_shortest_paths(&self, from: &str, to: &str, k: usize) -> Result<Vec<PathResult>, QueryError> {
        let sources = self.require_symbols(from)?;
        let targets = self.require_symbols(to)?;

        let mut found = Vec::new();
        for &source in &sources {
            for &target in &targets {
                found.extend(k_shortest_paths(&self.graph, source, target, k));
            }
        }
        found.sort_by(|a, b| a.cost.total_cmp(&b.cost).then_with(|| a.nodes.cmp(&b.nodes)));
        found.dedup_by(|a, b| a.nodes == b.nodes);
        found.truncate(k);

        Ok(found
            .into_iter()
            .map(|path| PathResult {
                nodes: self.summaries(&path.nodes),
                kinds: path.kinds,
                cost: path.cost,
                coupling: path.coupling,
                strength: path.strength,
            })
            .collect())
    }

    pub fn shortest_path(&self, from: &str, to: &str) -> Result<Option<PathResult>, QueryError> {
        Ok(self.k_shortest_paths(from, to, 1)?.into_iter().next())
    }

    pub fn cycles(&self) -> CyclesResult {
        let metrics = &self.snapshot.metrics;
        CyclesResult {
            symbol_cycles: metrics
                .cycles
                .iter()
                .map(|cycle| CycleSummary {
                    scc_id: cycle.scc_id,
                    severity: cycle.severity,
                    files: cycle.files.clone(),
                    members: self.summaries(&cycle.members),
                })
                .collect(),
            file_cycles: metrics.file_cycles.clone(),
        }
    }

    fn unavailable(&self, metric: MetricKind) -> QueryError {
        let reason = self
            .snapshot
            .metrics
            .omitted
            .iter()
            .find(|o| o.metric == metric)
            .map_or_else(|| "not recorded".to_string(), |o| o.reason.clone());
        QueryError::MetricUnavailable { metric, reason }
    }

    pub fn communities(&self) -> Result<CommunitiesResult, QueryError> {
        let report = self
            .snapshot
            .metrics
            .communities
            .as_ref()
            .ok_or_else(|| self.unavailable(MetricKind::Communities))?;
        Ok(CommunitiesResult {
            modularity: report.modularity,
            communities: report
                .communities
                .iter()
                .map(|c| CommunitySummary {
                    id: c.id,
                    label: c.label.clone(),
                    directory: c.directory.clone(),
                    size: c.members.len(),
                    internal_edges: c.internal_edges,
                    cohesion: c.cohesion,
                    members: self.summaries(&c.members),
                })
                .collect(),
        })
    }

    pub fn layers(&self) -> Result<LayersResult, QueryError> {
        let report = self
            .snapshot
            .metrics
            .layers
            .as_ref()
            .ok_or_else(|| self.unavailable(MetricKind::Layers))?;

        let violations = report
            .violations
            .iter()
            .filter_map(|v| {
                let source = self.symbol(v.source)?;
                let target = self.symbol(v.target)?;
                Some(ViolationSummary {
                    source: SymbolSummary::from(source),
                    target: SymbolSummary::from(target),
                    kind: v.kind,
                    source_layer: v.source_layer,
                    target_layer: v.target_layer,
                })
            })
            .collect();

        Ok(LayersResult {
            layer_count: report.layer_count,
            layers: report
                .groups()
                .into_iter()
                .enumerate()
                .map(|(layer, members)| LayerSummary {
                    layer: layer as u32,
                    members: self.summaries(&members),
                })
                .collect(),
            violations,
        })
    }

    /// The `limit` symbols with the highest degree under `mode`.
    pub fn fan_ranking(&self, mode: FanMode, limit: usize) -> Vec<FanEntry> {
        let rows = &self.snapshot.metrics.symbols;
        let ranked: Vec<SymbolId> = match mode {
            FanMode::Total => metrics::fan_ranking(rows),
            FanMode::In | FanMode::Out => {
                let degree = |m: &SymbolMetrics| if mode == FanMode::In { m.fan_in } else { m.fan_out };
                let mut sorted: Vec<&SymbolMetrics> = rows.iter().collect();
                sorted.sort_by(|a, b| degree(b).cmp(&degree(a)).then(a.symbol_id.cmp(&b.symbol_id)));
                sorted.into_iter().map(|m| m.symbol_id).collect()
            }
        };

        ranked
            .into_iter()
            .take(limit)
            .filter_map(|id| {
                let symbol = self.symbol(id)?;
                let row = rows.get(id.index())?;
                Some(FanEntry {
                    symbol: SymbolSummary::from(symbol),
                    fan_in: row.fan_in,
                    fan_out: row.fan_out,
                })
            })
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        let s = &self.snapshot;
        IndexStats {
            generation: s.state.generation.0,
            built_at: s.state.built_at,
            files: s.files.len(),
            failed_files: s.failed_files.clone(),
            symbols: s.symbols.len(),
            edges: s.edges.len(),
            ambiguous_edges: s.edges.iter().filter(|e| e.ambiguous).count(),
            file_edges: s.file_edges.len(),
            cycles: s.metrics.cycles.len(),
            file_cycles: s.metrics.file_cycles.len(),
            resolution: s.resolution.clone(),
            coverage: s.resolution.coverage(),
            omitted_metrics: s.metrics.omitted.clone(),
        }
    }
}
