//! File-level rollup of symbol edges

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Edge, FileEdge, Symbol};

/// Compute file edges from the symbol edge set.
///
/// A file edge A->B exists iff at least one symbol edge runs from a symbol in A
/// to a symbol in B with A != B. Output is sorted by (source, target).
pub fn aggregate_file_edges(symbols: &[Symbol], edges: &[Edge]) -> Vec<FileEdge> {
    let mut counts: BTreeMap<(&str, &str), u32> = BTreeMap::new();

    for edge in edges {
        let (Some(source), Some(target)) = (symbols.get(edge.source.index()), symbols.get(edge.target.index())) else {
            continue;
        };
        // Intra-file edges are not imports
        if source.file_path == target.file_path {
            continue;
        }
        *counts
            .entry((source.file_path.as_str(), target.file_path.as_str()))
            .or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|((source_file, target_file), symbol_edge_count)| FileEdge {
            source_file: source_file.to_string(),
            target_file: target_file.to_string(),
            symbol_edge_count,
        })
        .collect()
}

/// Files that `path` depends on, and files that depend on `path`.
pub fn file_neighbours<'a>(file_edges: &'a [FileEdge], path: &str) -> (BTreeSet<&'a str>, BTreeSet<&'a str>) {
    let mut imports = BTreeSet::new();
    let mut imported_by = BTreeSet::new();
    for edge in file_edges {
        if edge.source_file == path {
            imports.insert(edge.target_file.as_str());
        }
        if edge.target_file == path {
            imported_by.insert(edge.source_file.as_str());
        }
    }
    (imports, imported_by)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EdgeKind, Language, SymbolId, SymbolKind};

    fn symbol(id: u32, file: &str) -> Symbol {
        Symbol {
            id: SymbolId(id),
            name: format!("s{id}"),
            qualified_name: format!("s{id}"),
            kind: SymbolKind::Function,
            file_path: file.to_string(),
            start_line: 1,
            end_line: 2,
            signature: String::new(),
            exported: true,
            language: Language::Python,
        }
    }

    fn edge(source: u32, target: u32, kind: EdgeKind) -> Edge {
        Edge {
            source: SymbolId(source),
            target: SymbolId(target),
            kind,
            ambiguous: false,
        }
    }

    #[test]
    fn test_counts_contributing_edges() {
        let symbols = vec![symbol(0, "a.py"), symbol(1, "b.py"), symbol(2, "b.py")];
        let edges = vec![
            edge(1, 0, EdgeKind::Call),
            edge(1, 0, EdgeKind::Import),
            edge(2, 0, EdgeKind::Call),
            edge(2, 1, EdgeKind::Call),
        ];

        let file_edges = aggregate_file_edges(&symbols, &edges);
        assert_eq!(
            file_edges,
            vec![FileEdge {
                source_file: "b.py".to_string(),
                target_file: "a.py".to_string(),
                symbol_edge_count: 3,
            }]
        );

        let (imports, imported_by) = file_neighbours(&file_edges, "a.py");
        assert!(imports.is_empty());
        assert_eq!(imported_by.into_iter().collect::<Vec<_>>(), vec!["b.py"]);
    }
}
