//! Strongly connected components and dependency cycles

use std::collections::{BTreeMap, BTreeSet};

use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};

use super::MetricError;
use crate::graph::SymbolGraph;
use crate::model::{directory_of, FileEdge, Symbol, SymbolId};

/// How loudly a cycle should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleSeverity {
    /// Contained in one directory.
    Info,
    Warning,
    /// Spans more than three files across directories.
    Critical,
}

impl CycleSeverity {
    pub fn classify<'a>(files: impl IntoIterator<Item = &'a str>) -> Self {
        let files: BTreeSet<&str> = files.into_iter().collect();
        let directories: BTreeSet<&str> = files.iter().map(|f| directory_of(f)).collect();
        if directories.len() <= 1 {
            CycleSeverity::Info
        } else if files.len() > 3 {
            CycleSeverity::Critical
        } else {
            CycleSeverity::Warning
        }
    }
}

/// SCC membership for every symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SccPartition {
    /// symbol index -> component id
    pub component_of: Vec<u32>,
    /// component id -> members, ascending
    pub components: Vec<Vec<SymbolId>>,
}

/// A symbol-level cycle: an SCC with more than one member, or a self-loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    pub scc_id: u32,
    pub members: Vec<SymbolId>,
    pub files: Vec<String>,
    pub severity: CycleSeverity,
}

/// A file-level cycle over the aggregated file graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCycle {
    pub files: Vec<String>,
    pub severity: CycleSeverity,
}

/// Run Tarjan's algorithm and number components by their smallest member.
pub fn strongly_connected(graph: &SymbolGraph) -> Result<SccPartition, MetricError> {
    let g = graph.inner();
    let mut components: Vec<Vec<SymbolId>> = petgraph::algo::tarjan_scc(g)
        .into_iter()
        .map(|scc| {
            let mut members: Vec<SymbolId> = scc.into_iter().map(|idx| g[idx]).collect();
            members.sort();
            members
        })
        .collect();
    components.sort_by_key(|members| members.first().copied());

    let mut component_of = vec![0u32; g.node_count()];
    for (id, members) in components.iter().enumerate() {
        for member in members {
            component_of[member.index()] = id as u32;
        }
    }
    Ok(SccPartition {
        component_of,
        components,
    })
}

/// Cycles sorted by size descending, then by smallest member.
pub fn symbol_cycles(graph: &SymbolGraph, scc: &SccPartition, symbols: &[Symbol]) -> Vec<Cycle> {
    let mut cycles: Vec<Cycle> = scc
        .components
        .iter()
        .enumerate()
        .filter(|(_, members)| members.len() > 1 || members.first().is_some_and(|&m| graph.has_self_loop(m)))
        .map(|(id, members)| {
            let files: BTreeSet<&str> = members
                .iter()
                .filter_map(|m| symbols.get(m.index()))
                .map(|s| s.file_path.as_str())
                .collect();
            Cycle {
                scc_id: id as u32,
                members: members.clone(),
                severity: CycleSeverity::classify(files.iter().copied()),
                files: files.into_iter().map(str::to_string).collect(),
            }
        })
        .collect();
    cycles.sort_by(|a, b| {
        b.members
            .len()
            .cmp(&a.members.len())
            .then(a.members.first().cmp(&b.members.first()))
    });
    cycles
}

/// File-level cycles from the aggregated file edges.
pub fn file_cycles(file_edges: &[FileEdge]) -> Vec<FileCycle> {
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();
    for edge in file_edges {
        index.entry(edge.source_file.as_str()).or_insert(0);
        index.entry(edge.target_file.as_str()).or_insert(0);
    }
    let names: Vec<&str> = index.keys().copied().collect();
    for (i, name) in names.iter().enumerate() {
        index.insert(name, i);
    }

    let mut g: DiGraph<&str, ()> = DiGraph::with_capacity(names.len(), file_edges.len());
    for name in &names {
        g.add_node(name);
    }
    for edge in file_edges {
        g.add_edge(
            petgraph::graph::NodeIndex::new(index[edge.source_file.as_str()]),
            petgraph::graph::NodeIndex::new(index[edge.target_file.as_str()]),
            (),
        );
    }

    let mut cycles: Vec<FileCycle> = petgraph::algo::tarjan_scc(&g)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .map(|scc| {
            let mut files: Vec<&str> = scc.into_iter().map(|idx| g[idx]).collect();
            files.sort();
            FileCycle {
                severity: CycleSeverity::classify(files.iter().copied()),
                files: files.into_iter().map(str::to_string).collect(),
            }
        })
        .collect();
    cycles.sort_by(|a, b| b.files.len().cmp(&a.files.len()).then(a.files.cmp(&b.files)));
    cycles
}
