//! Metric graph: one node per symbol, one edge per ordered symbol pair

use std::collections::BTreeMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::model::{Edge, EdgeKind, SymbolId};

/// Directed symbol graph used by the metrics engine.
///
/// Node `i` is `SymbolId(i)`. Parallel edges between the same ordered pair
/// collapse into one carrying the cheapest traversal kind. Edges are inserted
/// in (source, target) order so adjacency is identical run to run.
pub struct SymbolGraph {
    inner: DiGraph<SymbolId, EdgeKind>,
}

impl std::fmt::Debug for SymbolGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolGraph")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

impl SymbolGraph {
    pub fn build(symbol_count: usize, edges: &[Edge]) -> Self {
        let mut inner = DiGraph::with_capacity(symbol_count, edges.len());
        for i in 0..symbol_count {
            inner.add_node(SymbolId(i as u32));
        }

        let mut pairs: BTreeMap<(SymbolId, SymbolId), EdgeKind> = BTreeMap::new();
        for edge in edges {
            if edge.source.index() >= symbol_count || edge.target.index() >= symbol_count {
                continue;
            }
            pairs
                .entry((edge.source, edge.target))
                .and_modify(|kind| {
                    if (edge.kind.path_cost(), edge.kind) < (kind.path_cost(), *kind) {
                        *kind = edge.kind;
                    }
                })
                .or_insert(edge.kind);
        }
        for ((source, target), kind) in pairs {
            inner.add_edge(NodeIndex::new(source.index()), NodeIndex::new(target.index()), kind);
        }

        SymbolGraph { inner }
    }

    pub fn inner(&self) -> &DiGraph<SymbolId, EdgeKind> {
        &self.inner
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Distinct targets of `id`, sorted.
    pub fn successors(&self, id: SymbolId) -> Vec<SymbolId> {
        self.neighbours(id, Direction::Outgoing)
    }

    /// Distinct sources pointing at `id`, sorted.
    pub fn predecessors(&self, id: SymbolId) -> Vec<SymbolId> {
        self.neighbours(id, Direction::Incoming)
    }

    fn neighbours(&self, id: SymbolId, direction: Direction) -> Vec<SymbolId> {
        if id.index() >= self.inner.node_count() {
            return Vec::new();
        }
        let mut out: Vec<SymbolId> = self
            .inner
            .neighbors_directed(NodeIndex::new(id.index()), direction)
            .map(|n| SymbolId(n.index() as u32))
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn fan_in(&self, id: SymbolId) -> u32 {
        self.predecessors(id).len() as u32
    }

    pub fn fan_out(&self, id: SymbolId) -> u32 {
        self.successors(id).len() as u32
    }

    /// Kind of the collapsed edge `source -> target`, if any.
    pub fn edge_kind(&self, source: SymbolId, target: SymbolId) -> Option<EdgeKind> {
        let n = self.inner.node_count();
        if source.index() >= n || target.index() >= n {
            return None;
        }
        self.inner
            .find_edge(NodeIndex::new(source.index()), NodeIndex::new(target.index()))
            .and_then(|e| self.inner.edge_weight(e))
            .copied()
    }

    pub fn has_self_loop(&self, id: SymbolId) -> bool {
        self.edge_kind(id, id).is_some()
    }
}
