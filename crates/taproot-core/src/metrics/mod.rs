//! Metrics engine.
//!
//! Computes over the committed symbol graph:
//! - **PageRank**: pull-based power iteration, parallel over nodes
//! - **Betweenness centrality**: via `rustworkx_core::centrality::betweenness_centrality`
//! - **Strongly connected components**: `petgraph::algo::tarjan_scc`, symbol and file level
//! - **Communities**: Louvain modularity optimisation with directory cohesion
//! - **Topological layers**: longest path over the SCC condensation
//! - **k-shortest paths**: Yen's algorithm, computed on demand by queries
//!
//! Each metric runs independently. A failing metric is recorded in
//! [`MetricsReport::omitted`] and its columns are left empty; the others
//! still complete.

pub mod centrality;
pub mod communities;
pub mod cycles;
pub mod layers;
pub mod pagerank;
pub mod paths;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::graph::SymbolGraph;
use crate::model::{Edge, FileEdge, Symbol, SymbolId, SymbolMetrics};

pub use communities::{Community, CommunityReport};
pub use cycles::{Cycle, CycleSeverity, FileCycle};
pub use layers::{LayerReport, LayerViolation};
pub use paths::{CouplingStrength, ScoredPath};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricError {
    #[error("graph has no nodes")]
    EmptyGraph,

    #[error("degenerate graph: {0}")]
    Degenerate(String),
}

/// Tunables for the metrics engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub damping: f64,
    /// L1 convergence tolerance for PageRank.
    pub tolerance: f64,
    pub max_iterations: usize,
    pub louvain_resolution: f64,
    /// Default number of paths returned by k-shortest path queries.
    pub k_paths: usize,
    pub betweenness: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            damping: 0.85,
            tolerance: 1e-6,
            max_iterations: 100,
            louvain_resolution: 1.0,
            k_paths: 3,
            betweenness: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    PageRank,
    Betweenness,
    StronglyConnected,
    Communities,
    Layers,
}

/// A metric left out of this generation, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmittedMetric {
    pub metric: MetricKind,
    pub reason: String,
}

/// Everything the metrics engine derived for one generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    /// One row per symbol, in id order.
    pub symbols: Vec<SymbolMetrics>,
    pub cycles: Vec<Cycle>,
    pub file_cycles: Vec<FileCycle>,
    pub communities: Option<CommunityReport>,
    pub layers: Option<LayerReport>,
    pub omitted: Vec<OmittedMetric>,
}

impl MetricsReport {
    pub fn is_omitted(&self, metric: MetricKind) -> bool {
        self.omitted.iter().any(|o| o.metric == metric)
    }
}

fn omit(omitted: &mut Vec<OmittedMetric>, metric: MetricKind, reason: String) {
    warn!(?metric, %reason, "Metric omitted");
    omitted.push(OmittedMetric { metric, reason });
}

/// Run every metric over the symbol graph and assemble the report.
///
/// Execution order:
/// 1. PageRank
/// 2. Betweenness centrality (skipped when disabled in config)
/// 3. SCCs and cycles, symbol and file level
/// 4. Louvain communities (labels use PageRank when available)
/// 5. Topological layers
pub fn compute_all(
    symbols: &[Symbol],
    edges: &[Edge],
    file_edges: &[FileEdge],
    config: &MetricsConfig,
) -> MetricsReport {
    let start = std::time::Instant::now();
    let graph = SymbolGraph::build(symbols.len(), edges);
    let mut omitted = Vec::new();

    // 1. PageRank
    let pagerank = match pagerank::pagerank(&graph, config) {
        Ok(scores) => Some(scores),
        Err(e) => {
            omit(&mut omitted, MetricKind::PageRank, e.to_string());
            None
        }
    };

    // 2. Betweenness
    let betweenness = if config.betweenness {
        match centrality::betweenness(&graph) {
            Ok(scores) => Some(scores),
            Err(e) => {
                omit(&mut omitted, MetricKind::Betweenness, e.to_string());
                None
            }
        }
    } else {
        omit(&mut omitted, MetricKind::Betweenness, "disabled in configuration".to_string());
        None
    };

    // 3. Cycles
    let scc = match cycles::strongly_connected(&graph) {
        Ok(scc) => Some(scc),
        Err(e) => {
            omit(&mut omitted, MetricKind::StronglyConnected, e.to_string());
            None
        }
    };
    let cycles = scc
        .as_ref()
        .map(|scc| cycles::symbol_cycles(&graph, scc, symbols))
        .unwrap_or_default();
    let file_cycles = cycles::file_cycles(file_edges);

    // 4. Communities
    let communities = match communities::louvain(&graph, config.louvain_resolution) {
        Ok(partition) => Some(communities::report(&graph, &partition, symbols, pagerank.as_deref())),
        Err(e) => {
            omit(&mut omitted, MetricKind::Communities, e.to_string());
            None
        }
    };

    // 5. Layers
    let layers = match layers::assign_layers(symbols.len(), edges) {
        Ok(report) => Some(report),
        Err(e) => {
            omit(&mut omitted, MetricKind::Layers, e.to_string());
            None
        }
    };

    let rows = symbols
        .iter()
        .map(|symbol| {
            let id = symbol.id;
            let i = id.index();
            SymbolMetrics {
                symbol_id: id,
                pagerank: pagerank.as_ref().and_then(|s| s.get(i).copied()),
                betweenness: betweenness.as_ref().and_then(|s| s.get(i).copied()),
                scc_id: scc.as_ref().and_then(|s| s.component_of.get(i).copied()),
                community_id: communities
                    .as_ref()
                    .and_then(|c| c.membership.get(i).copied()),
                layer: layers.as_ref().and_then(|l| l.layer_of.get(i).copied()),
                fan_in: graph.fan_in(id),
                fan_out: graph.fan_out(id),
            }
        })
        .collect();

    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        cycles = cycles.len(),
        omitted = omitted.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Metrics computed"
    );

    MetricsReport {
        symbols: rows,
        cycles,
        file_cycles,
        communities,
        layers,
        omitted,
    }
}

/// Symbols ordered by fan-in + fan-out descending, then by id.
pub fn fan_ranking(metrics: &[SymbolMetrics]) -> Vec<SymbolId> {
    let mut ranked: Vec<&SymbolMetrics> = metrics.iter().collect();
    ranked.sort_by(|a, b| {
        (b.fan_in + b.fan_out)
            .cmp(&(a.fan_in + a.fan_out))
            .then(a.symbol_id.cmp(&b.symbol_id))
    });
    ranked.into_iter().map(|m| m.symbol_id).collect()
}
