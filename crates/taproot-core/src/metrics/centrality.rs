//! Betweenness centrality (via rustworkx-core)

use super::MetricError;
use crate::graph::SymbolGraph;

/// Normalised betweenness per symbol id, endpoints excluded.
///
/// The parallel threshold is pinned above any graph size so accumulation
/// order, and therefore the result, never depends on scheduling.
pub fn betweenness(graph: &SymbolGraph) -> Result<Vec<f64>, MetricError> {
    let g = graph.inner();
    if g.node_count() == 0 {
        return Err(MetricError::EmptyGraph);
    }

    let scores = rustworkx_core::centrality::betweenness_centrality(
        g,
        false, // include_endpoints
        true,  // normalized
        usize::MAX,
    );
    Ok(scores.into_iter().map(|s| s.unwrap_or(0.0)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, EdgeKind, SymbolId};

    #[test]
    fn test_chain_middle_is_bottleneck() {
        let edges: Vec<Edge> = [(0, 1), (1, 2)]
            .iter()
            .map(|&(s, t)| Edge {
                source: SymbolId(s),
                target: SymbolId(t),
                kind: EdgeKind::Call,
                ambiguous: false,
            })
            .collect();
        let scores = betweenness(&SymbolGraph::build(3, &edges)).unwrap();

        assert!(scores[1] > 0.0);
        assert_eq!(scores[0], 0.0);
        assert_eq!(scores[2], 0.0);
    }
}
