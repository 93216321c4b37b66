//! k-shortest simple paths (Yen) with coupling classification

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashSet};

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::graph::SymbolGraph;
use crate::model::{EdgeKind, SymbolId};

/// Path costs are kept in tenths so equal-cost paths compare exactly.
fn cost_units(kind: EdgeKind) -> u64 {
    (kind.path_cost() * 10.0).round() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouplingStrength {
    Weak,
    Moderate,
    Strong,
}

impl CouplingStrength {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            CouplingStrength::Strong
        } else if score >= 0.4 {
            CouplingStrength::Moderate
        } else {
            CouplingStrength::Weak
        }
    }
}

/// One simple path with its edge kinds and coupling classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPath {
    pub nodes: Vec<SymbolId>,
    /// `kinds[i]` is the kind of the edge `nodes[i] -> nodes[i + 1]`.
    pub kinds: Vec<EdgeKind>,
    pub cost: f64,
    pub coupling: f64,
    pub strength: CouplingStrength,
}

/// Mean edge-kind weight scaled by how direct the path is.
pub fn coupling_score(kinds: &[EdgeKind]) -> f64 {
    if kinds.is_empty() {
        return 0.0;
    }
    let mean = kinds.iter().map(|k| k.coupling_weight()).sum::<f64>() / kinds.len() as f64;
    let directness = (1.0 - 0.15 * (kinds.len() as f64 - 1.0)).max(0.0);
    mean * directness
}

/// Nodes and edges excluded from one spur search.
#[derive(Default)]
struct Blocked {
    nodes: HashSet<usize>,
    edges: HashSet<(usize, usize)>,
}

/// Dijkstra over collapsed edge kinds. Among equal-cost routes the one whose
/// predecessor has the smaller id wins.
fn dijkstra(graph: &SymbolGraph, source: usize, target: usize, blocked: &Blocked) -> Option<(u64, Vec<usize>)> {
    let g = graph.inner();
    let n = g.node_count();
    let mut dist: Vec<Option<u64>> = vec![None; n];
    let mut prev: Vec<Option<usize>> = vec![None; n];
    let mut done = vec![false; n];
    let mut heap = BinaryHeap::new();

    dist[source] = Some(0);
    heap.push(Reverse((0u64, source)));

    while let Some(Reverse((cost, node))) = heap.pop() {
        if done[node] {
            continue;
        }
        done[node] = true;
        if node == target {
            break;
        }
        let mut edges: Vec<(usize, EdgeKind)> = g
            .edges_directed(NodeIndex::new(node), Direction::Outgoing)
            .map(|e| (e.target().index(), *e.weight()))
            .collect();
        edges.sort_by_key(|&(t, _)| t);
        for (next, kind) in edges {
            if done[next] || blocked.nodes.contains(&next) || blocked.edges.contains(&(node, next)) {
                continue;
            }
            let candidate = cost + cost_units(kind);
            let better = match dist[next] {
                None => true,
                Some(d) => candidate < d || (candidate == d && prev[next].is_some_and(|p| node < p)),
            };
            if better {
                dist[next] = Some(candidate);
                prev[next] = Some(node);
                heap.push(Reverse((candidate, next)));
            }
        }
    }

    let total = dist[target]?;
    let mut path = vec![target];
    let mut current = target;
    while current != source {
        current = prev[current]?;
        path.push(current);
    }
    path.reverse();
    Some((total, path))
}

fn path_cost(graph: &SymbolGraph, path: &[usize]) -> u64 {
    path.windows(2)
        .filter_map(|w| graph.edge_kind(SymbolId(w[0] as u32), SymbolId(w[1] as u32)))
        .map(cost_units)
        .sum()
}

/// Up to `k` shortest simple directed paths from `source` to `target`.
///
/// Paths come back in ascending cost; equal costs are ordered
/// lexicographically by node ids.
pub fn k_shortest_paths(graph: &SymbolGraph, source: SymbolId, target: SymbolId, k: usize) -> Vec<ScoredPath> {
    let n = graph.node_count();
    let (s, t) = (source.index(), target.index());
    if k == 0 || s >= n || t >= n || s == t {
        return Vec::new();
    }

    let Some(first) = dijkstra(graph, s, t, &Blocked::default()) else {
        return Vec::new();
    };
    let mut accepted: Vec<(u64, Vec<usize>)> = vec![first];
    let mut candidates: BTreeSet<(u64, Vec<usize>)> = BTreeSet::new();

    while accepted.len() < k {
        let Some((_, last)) = accepted.last().cloned() else {
            break;
        };
        for i in 0..last.len() - 1 {
            let spur = last[i];
            let root = &last[..=i];

            let mut blocked = Blocked::default();
            for (_, path) in &accepted {
                if path.len() > i && &path[..=i] == root {
                    blocked.edges.insert((path[i], path[i + 1]));
                }
            }
            blocked.nodes.extend(root[..i].iter().copied());

            if let Some((_, spur_path)) = dijkstra(graph, spur, t, &blocked) {
                let mut full: Vec<usize> = root[..i].to_vec();
                full.extend(spur_path);
                let cost = path_cost(graph, &full);
                if !accepted.iter().any(|(_, p)| *p == full) {
                    candidates.insert((cost, full));
                }
            }
        }
        match candidates.pop_first() {
            Some(best) => accepted.push(best),
            None => break,
        }
    }

    accepted
        .into_iter()
        .map(|(cost, path)| {
            let kinds: Vec<EdgeKind> = path
                .windows(2)
                .filter_map(|w| graph.edge_kind(SymbolId(w[0] as u32), SymbolId(w[1] as u32)))
                .collect();
            let coupling = coupling_score(&kinds);
            ScoredPath {
                nodes: path.into_iter().map(|i| SymbolId(i as u32)).collect(),
                kinds,
                cost: cost as f64 / 10.0,
                coupling,
                strength: CouplingStrength::from_score(coupling),
            }
        })
        .collect()
}
