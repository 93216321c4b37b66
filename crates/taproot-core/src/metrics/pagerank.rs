//! PageRank by power iteration

use petgraph::graph::NodeIndex;
use petgraph::Direction;
use rayon::prelude::*;

use super::{MetricError, MetricsConfig};
use crate::graph::SymbolGraph;
use crate::model::SymbolId;

/// Compute PageRank scores indexed by symbol id.
///
/// Pull formulation: every node sums its in-neighbours' contributions in
/// ascending id order, so the parallel map yields the same bits as a
/// sequential one. Dangling mass is spread uniformly and the result is
/// normalised to sum 1.
pub fn pagerank(graph: &SymbolGraph, config: &MetricsConfig) -> Result<Vec<f64>, MetricError> {
    let g = graph.inner();
    let n = g.node_count();
    if n == 0 {
        return Err(MetricError::EmptyGraph);
    }

    let damping = config.damping;
    let base = (1.0 - damping) / n as f64;

    let out_degree: Vec<usize> = g
        .node_indices()
        .map(|idx| g.neighbors_directed(idx, Direction::Outgoing).count())
        .collect();
    let incoming: Vec<Vec<usize>> = g
        .node_indices()
        .map(|idx| {
            let mut sources: Vec<usize> = g
                .neighbors_directed(idx, Direction::Incoming)
                .map(NodeIndex::index)
                .collect();
            sources.sort_unstable();
            sources
        })
        .collect();
    let dangling: Vec<usize> = (0..n).filter(|&i| out_degree[i] == 0).collect();

    let mut scores = vec![1.0 / n as f64; n];
    for _ in 0..config.max_iterations {
        let dangling_mass: f64 = dangling.iter().map(|&i| scores[i]).sum();
        let teleport = base + damping * dangling_mass / n as f64;

        let next: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|i| {
                let pulled: f64 = incoming[i]
                    .iter()
                    .map(|&j| scores[j] / out_degree[j] as f64)
                    .sum();
                teleport + damping * pulled
            })
            .collect();

        let delta: f64 = scores.iter().zip(&next).map(|(a, b)| (a - b).abs()).sum();
        scores = next;
        if delta < config.tolerance {
            break;
        }
    }

    let total: f64 = scores.iter().sum();
    if total > 0.0 {
        for s in scores.iter_mut() {
            *s /= total;
        }
    }
    Ok(scores)
}

/// Symbols by descending score; equal scores fall back to ascending id.
pub fn ranking(scores: &[f64]) -> Vec<(SymbolId, f64)> {
    let mut ranked: Vec<(SymbolId, f64)> = scores
        .iter()
        .enumerate()
        .map(|(i, &s)| (SymbolId(i as u32), s))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
}
