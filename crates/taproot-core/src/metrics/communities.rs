//! Community detection (Louvain) and directory cohesion

use std::collections::{BTreeMap, HashMap};

use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use super::MetricError;
use crate::graph::SymbolGraph;
use crate::model::{Symbol, SymbolId};

/// Minimum modularity gain for a move to count.
const GAIN_EPSILON: f64 = 1e-12;
const MAX_PASSES: usize = 100;
const MAX_LEVELS: usize = 32;

/// Community assignment per symbol, ids numbered by smallest member.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub membership: Vec<u32>,
    pub modularity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    pub id: u32,
    pub members: Vec<SymbolId>,
    /// Directory holding most members (`.` for the project root).
    pub directory: String,
    pub label: String,
    /// Internal edges (self-loops excluded).
    pub internal_edges: usize,
    /// Fraction of internal edges whose endpoints share a directory;
    /// `None` when the community has no internal edges.
    pub cohesion: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityReport {
    /// symbol index -> community id
    pub membership: Vec<u32>,
    /// Sorted by size descending, then id.
    pub communities: Vec<Community>,
    pub modularity: f64,
}

/// Weighted undirected graph at one Louvain level.
struct Level {
    /// neighbour lists excluding self-loops, sorted by neighbour
    adj: Vec<Vec<(usize, f64)>>,
    /// weight of self-loops per node
    self_weight: Vec<f64>,
    /// weighted degree, self-loops counted twice
    strength: Vec<f64>,
}

impl Level {
    fn from_pairs(n: usize, pairs: &BTreeMap<(usize, usize), f64>) -> Self {
        let mut adj = vec![Vec::new(); n];
        let mut self_weight = vec![0.0; n];
        let mut strength = vec![0.0; n];
        for (&(a, b), &w) in pairs {
            if a == b {
                self_weight[a] += w;
                strength[a] += 2.0 * w;
            } else {
                adj[a].push((b, w));
                adj[b].push((a, w));
                strength[a] += w;
                strength[b] += w;
            }
        }
        for list in adj.iter_mut() {
            list.sort_by_key(|&(j, _)| j);
        }
        Level {
            adj,
            self_weight,
            strength,
        }
    }

    fn len(&self) -> usize {
        self.adj.len()
    }
}

/// Louvain modularity optimisation on the undirected projection.
///
/// Nodes are visited in id order and equal gains resolve to the smallest
/// community id, so the partition is a pure function of the graph.
pub fn louvain(graph: &SymbolGraph, resolution: f64) -> Result<Partition, MetricError> {
    let g = graph.inner();
    let n = g.node_count();
    if n == 0 {
        return Err(MetricError::EmptyGraph);
    }

    let mut pairs: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for edge in g.edge_references() {
        let (s, t) = (edge.source().index(), edge.target().index());
        if s == t {
            continue;
        }
        *pairs.entry((s.min(t), s.max(t))).or_insert(0.0) += 1.0;
    }
    if pairs.is_empty() {
        return Err(MetricError::Degenerate("graph has no edges between distinct symbols".to_string()));
    }
    let total_weight: f64 = pairs.values().sum();

    // original node -> current level node
    let mut assignment: Vec<usize> = (0..n).collect();
    let mut level = Level::from_pairs(n, &pairs);

    for _ in 0..MAX_LEVELS {
        let (community, moved) = local_moving(&level, total_weight, resolution);
        if !moved {
            break;
        }
        let (renumbered, count) = renumber(&community);
        for a in assignment.iter_mut() {
            *a = renumbered[*a];
        }

        let mut next: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for (i, &w) in level.self_weight.iter().enumerate() {
            if w > 0.0 {
                *next.entry((renumbered[i], renumbered[i])).or_insert(0.0) += w;
            }
        }
        for (i, neighbours) in level.adj.iter().enumerate() {
            for &(j, w) in neighbours {
                if i < j {
                    let (a, b) = (renumbered[i], renumbered[j]);
                    *next.entry((a.min(b), a.max(b))).or_insert(0.0) += w;
                }
            }
        }
        level = Level::from_pairs(count, &next);
    }

    let membership: Vec<u32> = canonical_ids(&assignment);
    let modularity = modularity(n, &pairs, &membership, total_weight, resolution);
    Ok(Partition {
        membership,
        modularity,
    })
}

/// One level of greedy moves; returns community per node and whether anything moved.
fn local_moving(level: &Level, m: f64, resolution: f64) -> (Vec<usize>, bool) {
    let n = level.len();
    let mut community: Vec<usize> = (0..n).collect();
    let mut totals: Vec<f64> = level.strength.clone();
    let mut moved_any = false;

    for _ in 0..MAX_PASSES {
        let mut moved = false;
        for i in 0..n {
            let current = community[i];
            let k_i = level.strength[i];

            let mut links: BTreeMap<usize, f64> = BTreeMap::new();
            for &(j, w) in &level.adj[i] {
                *links.entry(community[j]).or_insert(0.0) += w;
            }

            totals[current] -= k_i;
            let gain = |c: usize, w: f64| w / m - resolution * totals[c] * k_i / (2.0 * m * m);

            let mut best = current;
            let mut best_gain = gain(current, links.get(&current).copied().unwrap_or(0.0));
            for (&c, &w) in &links {
                if c == current {
                    continue;
                }
                let g = gain(c, w);
                if g > best_gain + GAIN_EPSILON {
                    best = c;
                    best_gain = g;
                }
            }
            totals[best] += k_i;

            if best != current {
                community[i] = best;
                moved = true;
                moved_any = true;
            }
        }
        if !moved {
            break;
        }
    }
    (community, moved_any)
}

/// Compact community ids to 0..count in order of first appearance.
fn renumber(community: &[usize]) -> (Vec<usize>, usize) {
    let mut map: HashMap<usize, usize> = HashMap::new();
    let renumbered = community
        .iter()
        .map(|c| {
            let next = map.len();
            *map.entry(*c).or_insert(next)
        })
        .collect();
    (renumbered, map.len())
}

/// Number communities by their smallest member.
fn canonical_ids(assignment: &[usize]) -> Vec<u32> {
    let mut map: HashMap<usize, u32> = HashMap::new();
    assignment
        .iter()
        .map(|c| {
            let next = map.len() as u32;
            *map.entry(*c).or_insert(next)
        })
        .collect()
}

fn modularity(
    n: usize,
    pairs: &BTreeMap<(usize, usize), f64>,
    membership: &[u32],
    m: f64,
    resolution: f64,
) -> f64 {
    let mut strength = vec![0.0; n];
    let mut internal: BTreeMap<u32, f64> = BTreeMap::new();
    for (&(a, b), &w) in pairs {
        strength[a] += w;
        strength[b] += w;
        if membership[a] == membership[b] {
            *internal.entry(membership[a]).or_insert(0.0) += w;
        }
    }
    let mut totals: BTreeMap<u32, f64> = BTreeMap::new();
    for (i, &k) in strength.iter().enumerate() {
        *totals.entry(membership[i]).or_insert(0.0) += k;
    }
    totals
        .iter()
        .map(|(c, &tot)| {
            let inside = internal.get(c).copied().unwrap_or(0.0);
            inside / m - resolution * (tot / (2.0 * m)).powi(2)
        })
        .sum()
}

/// Describe each community: members, majority directory, label and cohesion.
///
/// The label pairs the majority directory with the highest-PageRank
/// type-like member (any member when none is type-like).
pub fn report(
    graph: &SymbolGraph,
    partition: &Partition,
    symbols: &[Symbol],
    pagerank: Option<&[f64]>,
) -> CommunityReport {
    let mut members: BTreeMap<u32, Vec<SymbolId>> = BTreeMap::new();
    for (i, &c) in partition.membership.iter().enumerate() {
        members.entry(c).or_default().push(SymbolId(i as u32));
    }

    let mut internal: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
    for edge in graph.inner().edge_references() {
        let (s, t) = (edge.source().index(), edge.target().index());
        if s == t || partition.membership[s] != partition.membership[t] {
            continue;
        }
        let entry = internal.entry(partition.membership[s]).or_insert((0, 0));
        entry.0 += 1;
        let same_dir = match (symbols.get(s), symbols.get(t)) {
            (Some(a), Some(b)) => a.directory() == b.directory(),
            _ => false,
        };
        if same_dir {
            entry.1 += 1;
        }
    }

    let score = |id: SymbolId| pagerank.and_then(|p| p.get(id.index()).copied()).unwrap_or(0.0);

    let mut communities: Vec<Community> = members
        .into_iter()
        .map(|(id, members)| {
            let mut dirs: BTreeMap<&str, usize> = BTreeMap::new();
            for m in &members {
                if let Some(s) = symbols.get(m.index()) {
                    *dirs.entry(s.directory()).or_insert(0) += 1;
                }
            }
            let directory = dirs
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                .map(|(d, _)| if d.is_empty() { "." } else { *d })
                .unwrap_or(".")
                .to_string();

            let anchor_pool: Vec<SymbolId> = {
                let anchors: Vec<SymbolId> = members
                    .iter()
                    .copied()
                    .filter(|m| symbols.get(m.index()).is_some_and(|s| s.kind.is_anchor()))
                    .collect();
                if anchors.is_empty() { members.clone() } else { anchors }
            };
            let anchor = anchor_pool
                .iter()
                .copied()
                .max_by(|a, b| score(*a).total_cmp(&score(*b)).then(b.cmp(a)))
                .and_then(|a| symbols.get(a.index()))
                .map(|s| s.name.as_str())
                .unwrap_or("?");

            let (internal_edges, same_dir) = internal.get(&id).copied().unwrap_or((0, 0));
            Community {
                id,
                label: format!("{directory} ({anchor})"),
                directory,
                internal_edges,
                cohesion: (internal_edges > 0).then(|| same_dir as f64 / internal_edges as f64),
                members,
            }
        })
        .collect();
    communities.sort_by(|a, b| b.members.len().cmp(&a.members.len()).then(a.id.cmp(&b.id)));

    CommunityReport {
        membership: partition.membership.clone(),
        communities,
        modularity: partition.modularity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, EdgeKind, Language, SymbolKind};

    fn build(n: usize, pairs: &[(u32, u32)]) -> SymbolGraph {
        let edges: Vec<Edge> = pairs
            .iter()
            .map(|&(s, t)| Edge {
                source: SymbolId(s),
                target: SymbolId(t),
                kind: EdgeKind::Call,
                ambiguous: false,
            })
            .collect();
        SymbolGraph::build(n, &edges)
    }

    fn clique_pairs(offset: u32, size: u32) -> Vec<(u32, u32)> {
        let mut pairs = Vec::new();
        for i in 0..size {
            for j in 0..size {
                if i != j {
                    pairs.push((offset + i, offset + j));
                }
            }
        }
        pairs
    }

    fn symbol(id: u32, file: &str, kind: SymbolKind) -> Symbol {
        Symbol {
            id: SymbolId(id),
            name: format!("s{id}"),
            qualified_name: format!("s{id}"),
            kind,
            file_path: file.to_string(),
            start_line: 1,
            end_line: 1,
            signature: String::new(),
            exported: true,
            language: Language::Python,
        }
    }

    #[test]
    fn test_two_cliques_two_communities() {
        let mut pairs = clique_pairs(0, 4);
        pairs.extend(clique_pairs(4, 4));
        pairs.push((3, 4));
        let graph = build(8, &pairs);

        let partition = louvain(&graph, 1.0).unwrap();
        assert_eq!(partition.membership, vec![0, 0, 0, 0, 1, 1, 1, 1]);
        assert!(partition.modularity > 0.3);
    }

    #[test]
    fn test_deterministic_partition() {
        let mut pairs = clique_pairs(0, 5);
        pairs.extend(clique_pairs(5, 3));
        pairs.extend([(0, 5), (7, 2)]);
        let graph = build(8, &pairs);
        assert_eq!(louvain(&graph, 1.0).unwrap(), louvain(&graph, 1.0).unwrap());
    }

    #[test]
    fn test_edgeless_graph_is_degenerate() {
        let graph = build(3, &[(1, 1)]);
        assert!(matches!(louvain(&graph, 1.0), Err(MetricError::Degenerate(_))));
    }

    #[test]
    fn test_cohesion_and_label() {
        let graph = build(3, &[(0, 1), (1, 2), (2, 0)]);
        let symbols = vec![
            symbol(0, "core/a.py", SymbolKind::Class),
            symbol(1, "core/b.py", SymbolKind::Function),
            symbol(2, "util/c.py", SymbolKind::Function),
        ];
        let partition = Partition {
            membership: vec![0, 0, 0],
            modularity: 0.0,
        };
        let report = report(&graph, &partition, &symbols, None);

        let community = &report.communities[0];
        assert_eq!(community.directory, "core");
        assert_eq!(community.label, "core (s0)");
        assert_eq!(community.internal_edges, 3);
        let cohesion = community.cohesion.unwrap();
        assert!((cohesion - 1.0 / 3.0).abs() < 1e-9);
    }
}
