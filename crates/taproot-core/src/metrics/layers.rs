//! Topological layering over the SCC condensation.
//!
//! Layer 0 holds symbols with no outgoing dependencies; every other symbol
//! sits one layer above the highest layer it depends on. Dependencies must
//! flow downwards: an edge whose source layer is strictly lower than its
//! target layer is an upward violation.
//!
//! Components come from every edge, the same partition the SCC metric
//! reports, so members of one cycle always share a layer. Layer heights are
//! then derived from unambiguous edges between components only; ambiguous
//! edges are checked against the result, which is where violations come from.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::MetricError;
use crate::graph::SymbolGraph;
use crate::model::{Edge, EdgeKind, SymbolId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerViolation {
    pub source: SymbolId,
    pub target: SymbolId,
    pub kind: EdgeKind,
    pub source_layer: u32,
    pub target_layer: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerReport {
    /// symbol index -> layer
    pub layer_of: Vec<u32>,
    /// Number of distinct layers (max layer + 1).
    pub layer_count: u32,
    pub violations: Vec<LayerViolation>,
}

impl LayerReport {
    /// Symbols grouped by layer, ascending.
    pub fn groups(&self) -> Vec<Vec<SymbolId>> {
        let mut groups = vec![Vec::new(); self.layer_count as usize];
        for (i, &layer) in self.layer_of.iter().enumerate() {
            if let Some(group) = groups.get_mut(layer as usize) {
                group.push(SymbolId(i as u32));
            }
        }
        groups
    }
}

/// Assign a layer to every symbol and collect upward violations.
pub fn assign_layers(symbol_count: usize, edges: &[Edge]) -> Result<LayerReport, MetricError> {
    let graph = SymbolGraph::build(symbol_count, edges);
    let g = graph.inner();

    let components = petgraph::algo::tarjan_scc(g);
    let mut component_of = vec![0usize; symbol_count];
    for (c, members) in components.iter().enumerate() {
        for idx in members {
            component_of[idx.index()] = c;
        }
    }

    let count = components.len();
    let mut dependencies: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); count];
    let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); count];
    for edge in edges.iter().filter(|e| !e.ambiguous) {
        if edge.source.index() >= symbol_count || edge.target.index() >= symbol_count {
            continue;
        }
        let (a, b) = (component_of[edge.source.index()], component_of[edge.target.index()]);
        if a != b {
            dependencies[a].insert(b);
            dependents[b].insert(a);
        }
    }

    // Kahn's algorithm from the sinks upwards
    let mut remaining: Vec<usize> = dependencies.iter().map(BTreeSet::len).collect();
    let mut component_layer = vec![0u32; count];
    let mut queue: VecDeque<usize> = (0..count).filter(|&c| remaining[c] == 0).collect();
    let mut settled = 0usize;
    while let Some(c) = queue.pop_front() {
        settled += 1;
        for &parent in &dependents[c] {
            component_layer[parent] = component_layer[parent].max(component_layer[c] + 1);
            remaining[parent] -= 1;
            if remaining[parent] == 0 {
                queue.push_back(parent);
            }
        }
    }
    if settled != count {
        return Err(MetricError::Degenerate("condensation is not acyclic".to_string()));
    }

    let layer_of: Vec<u32> = (0..symbol_count).map(|i| component_layer[component_of[i]]).collect();
    let layer_count = layer_of.iter().max().map_or(0, |&m| m + 1);

    let mut violations: Vec<LayerViolation> = edges
        .iter()
        .filter(|e| e.source.index() < symbol_count && e.target.index() < symbol_count)
        .filter_map(|e| {
            let (source_layer, target_layer) = (layer_of[e.source.index()], layer_of[e.target.index()]);
            (source_layer < target_layer).then_some(LayerViolation {
                source: e.source,
                target: e.target,
                kind: e.kind,
                source_layer,
                target_layer,
            })
        })
        .collect();
    violations.sort_by(|a, b| (a.source, a.target, a.kind).cmp(&(b.source, b.target, b.kind)));

    Ok(LayerReport {
        layer_of,
        layer_count,
        violations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(source: u32, target: u32, ambiguous: bool) -> Edge {
        Edge {
            source: SymbolId(source),
            target: SymbolId(target),
            kind: EdgeKind::Call,
            ambiguous,
        }
    }

    #[test]
    fn test_longest_path_layers() {
        // 3 -> 1 -> 0, 3 -> 0, 2 -> 0
        let report = assign_layers(4, &[edge(3, 1, false), edge(1, 0, false), edge(3, 0, false), edge(2, 0, false)]).unwrap();
        assert_eq!(report.layer_of, vec![0, 1, 1, 2]);
        assert_eq!(report.layer_count, 3);
        assert!(report.violations.is_empty());
        assert_eq!(report.groups()[1], vec![SymbolId(1), SymbolId(2)]);
    }

    #[test]
    fn test_cycle_members_share_a_layer() {
        let report = assign_layers(3, &[edge(0, 1, false), edge(1, 0, false), edge(2, 0, false)]).unwrap();
        assert_eq!(report.layer_of[0], report.layer_of[1]);
        assert_eq!(report.layer_of[2], report.layer_of[0] + 1);
    }

    #[test]
    fn test_ambiguous_upward_edge_is_a_violation() {
        // 1 -> 2 certain; 0 -> 1 only ambiguous, so 0 stays on the floor
        let report = assign_layers(3, &[edge(1, 2, false), edge(0, 1, true)]).unwrap();
        assert_eq!(report.layer_of, vec![0, 1, 0]);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].source, SymbolId(0));
        assert_eq!(report.violations[0].target_layer, 1);
    }

    #[test]
    fn test_ambiguous_back_edge_joins_the_cycle() {
        // 0 -> 1 certain, 1 -> 0 ambiguous: one component, one layer
        let report = assign_layers(2, &[edge(0, 1, false), edge(1, 0, true)]).unwrap();
        assert_eq!(report.layer_of, vec![0, 0]);
        assert!(report.violations.is_empty());
    }
}
