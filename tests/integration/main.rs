//! Integration tests for Taproot
//!
//! These tests drive a full index run through the public API and check the
//! committed snapshot with the query surface.

use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use taproot_core::metrics::CycleSeverity;
use taproot_core::{lock_path, EdgeKind, Snapshot, SnapshotView};
use taproot_indexer::{Coordinator, IndexError, IndexOptions, IndexSummary};
use tempfile::TempDir;

fn repo(files: &[(&str, &str)]) -> TempDir {
    let temp = TempDir::new().unwrap();
    for (path, content) in files {
        write(temp.path(), path, content);
    }
    temp
}

fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(&full, content).unwrap();
    // coarse filesystem clocks may not move the mtime between quick edits
    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
    fs::File::options().write(true).open(&full).unwrap().set_modified(later).unwrap();
}

fn run(root: &Path, force: bool) -> Result<IndexSummary, IndexError> {
    let options = IndexOptions { force, verbose: false };
    Coordinator::new().run(root, options, &AtomicBool::new(false))
}

fn view(root: &Path) -> SnapshotView {
    SnapshotView::open(root).unwrap()
}

/// (source, target, kind, ambiguous) by qualified name.
fn named_edges(snapshot: &Snapshot) -> Vec<(String, String, EdgeKind, bool)> {
    let name = |i: usize| snapshot.symbols[i].qualified_name.clone();
    snapshot
        .edges
        .iter()
        .map(|e| (name(e.source.index()), name(e.target.index()), e.kind, e.ambiguous))
        .collect()
}

#[test]
fn test_typescript_three_file_scenario() {
    let temp = repo(&[
        ("src/a.ts", "export function foo(): void {}\n"),
        ("src/b.ts", "import { foo } from './a';\n\nexport function bar() {\n    foo();\n}\n"),
        ("src/c.ts", "import { foo } from './a';\n\nexport function baz() {\n    foo();\n}\n"),
    ]);
    run(temp.path(), false).unwrap();
    let view = view(temp.path());
    let snapshot = view.snapshot();

    let symbols: Vec<(&str, &str)> = snapshot
        .symbols
        .iter()
        .map(|s| (s.name.as_str(), s.file_path.as_str()))
        .collect();
    assert_eq!(symbols, vec![("foo", "src/a.ts"), ("bar", "src/b.ts"), ("baz", "src/c.ts")]);

    let mut pairs: Vec<(String, String)> = named_edges(snapshot)
        .into_iter()
        .map(|(s, t, _, ambiguous)| {
            assert!(!ambiguous);
            (s, t)
        })
        .collect();
    pairs.dedup();
    assert_eq!(
        pairs,
        vec![("bar".to_string(), "foo".to_string()), ("baz".to_string(), "foo".to_string())]
    );

    let layers: Vec<Option<u32>> = snapshot.metrics.symbols.iter().map(|m| m.layer).collect();
    assert_eq!(layers, vec![Some(0), Some(1), Some(1)]);
    assert_eq!(snapshot.metrics.symbols[0].fan_in, 2);
    assert!(view.cycles().symbol_cycles.is_empty());

    let file = view.file_detail("src/b.ts").unwrap();
    assert_eq!(file.imports, vec!["src/a.ts"]);
    assert!(file.imported_by.is_empty());
}

#[test]
fn test_unique_qualified_reference_gives_one_plain_edge() {
    let temp = repo(&[
        ("models.py", "class Store:\n    def save(self):\n        pass\n"),
        ("app.py", "def run():\n    Store.save()\n"),
    ]);
    run(temp.path(), false).unwrap();
    let snapshot = Snapshot::load(temp.path()).unwrap().unwrap();

    let calls: Vec<_> = named_edges(&snapshot)
        .into_iter()
        .filter(|(_, _, kind, _)| *kind == EdgeKind::Call)
        .collect();
    assert_eq!(calls, vec![("run".to_string(), "Store.save".to_string(), EdgeKind::Call, false)]);
    assert_eq!(snapshot.resolution.ambiguous_references, 0);
}

#[test]
fn test_ambiguous_bare_name_keeps_every_candidate() {
    let temp = repo(&[
        ("x/util.py", "def helper():\n    pass\n"),
        ("y/util.py", "def helper():\n    pass\n"),
        ("z/main.py", "def run():\n    helper()\n"),
    ]);
    run(temp.path(), false).unwrap();
    let snapshot = Snapshot::load(temp.path()).unwrap().unwrap();

    let edges = named_edges(&snapshot);
    assert_eq!(edges.len(), 2);
    assert!(edges.iter().all(|(s, t, kind, ambiguous)| s == "run"
        && t == "helper"
        && *kind == EdgeKind::Call
        && *ambiguous));
    let targets: Vec<&str> = snapshot
        .edges
        .iter()
        .map(|e| snapshot.symbols[e.target.index()].file_path.as_str())
        .collect();
    assert_eq!(targets, vec!["x/util.py", "y/util.py"]);
    assert_eq!(snapshot.resolution.ambiguous_references, 1);
    assert_eq!(snapshot.resolution.ambiguous_edges, 2);
}

#[test]
fn test_three_symbol_cycle_and_its_removal() {
    let temp = repo(&[
        ("a.py", "from b import g\n\ndef f():\n    g()\n"),
        ("b.py", "from c import h\n\ndef g():\n    h()\n"),
        ("c.py", "from a import f\n\ndef h():\n    f()\n"),
    ]);
    run(temp.path(), false).unwrap();

    let cycles = view(temp.path()).cycles();
    assert_eq!(cycles.symbol_cycles.len(), 1);
    let cycle = &cycles.symbol_cycles[0];
    let mut members: Vec<&str> = cycle.members.iter().map(|m| m.name.as_str()).collect();
    members.sort();
    assert_eq!(members, vec!["f", "g", "h"]);
    assert_eq!(cycle.severity, CycleSeverity::Info);
    assert_eq!(cycles.file_cycles.len(), 1);

    write(temp.path(), "c.py", "def h():\n    pass\n");
    let summary = run(temp.path(), false).unwrap();
    assert_eq!(summary.generation.0, 2);
    let cycles = view(temp.path()).cycles();
    assert!(cycles.symbol_cycles.is_empty());
    assert!(cycles.file_cycles.is_empty());
}

#[test]
fn test_pagerank_sums_to_one() {
    let temp = repo(&[
        ("lib/core.rs", "pub struct Engine;\n\nimpl Engine {\n    pub fn start(&self) {\n        self.tick();\n    }\n    fn tick(&self) {}\n}\n"),
        ("lib/main.rs", "mod core;\n\nfn main() {\n    boot();\n}\n\nfn boot() -> Engine {\n    Engine\n}\n"),
    ]);
    run(temp.path(), false).unwrap();
    let snapshot = Snapshot::load(temp.path()).unwrap().unwrap();

    assert!(!snapshot.edges.is_empty());
    let total: f64 = snapshot.metrics.symbols.iter().filter_map(|m| m.pagerank).sum();
    assert!((total - 1.0).abs() < 1e-6, "pagerank sums to {total}");
}

#[test]
fn test_rebuilds_are_deterministic() {
    let files = [
        ("pkg/__init__.py", ""),
        ("pkg/store.py", "class Store:\n    def load(self):\n        return self.parse()\n\n    def parse(self):\n        pass\n"),
        ("pkg/api.py", "from .store import Store\n\ndef handler():\n    Store().load()\n"),
        ("web/app.js", "const { handler } = require('./routes');\n\nfunction main() {\n    handler();\n}\n"),
        ("web/routes.js", "function handler() {}\n\nmodule.exports = { handler };\n"),
    ];
    let temp = repo(&files);
    run(temp.path(), false).unwrap();
    let first = Snapshot::load(temp.path()).unwrap().unwrap();

    run(temp.path(), true).unwrap();
    let second = Snapshot::load(temp.path()).unwrap().unwrap();

    assert_eq!(first.symbols, second.symbols);
    assert_eq!(first.edges, second.edges);
    assert_eq!(first.file_edges, second.file_edges);
    assert_eq!(first.metrics, second.metrics);
    assert_eq!(first.resolution, second.resolution);
    assert!(named_edges(&first).contains(&(
        "main".to_string(),
        "handler".to_string(),
        EdgeKind::Call,
        false
    )));
}

#[test]
fn test_incremental_run_equals_forced_rebuild() {
    let temp = repo(&[
        ("a.py", "def foo():\n    pass\n"),
        ("b.py", "from a import foo\n\ndef bar():\n    foo()\n"),
        ("c.py", "from b import bar\n\ndef baz():\n    bar()\n"),
    ]);
    run(temp.path(), false).unwrap();

    write(temp.path(), "a.py", "def foo():\n    bar()\n\ndef bar():\n    pass\n");
    let summary = run(temp.path(), false).unwrap();
    assert_eq!(summary.files.changed, 1);
    let incremental = Snapshot::load(temp.path()).unwrap().unwrap();

    run(temp.path(), true).unwrap();
    let full = Snapshot::load(temp.path()).unwrap().unwrap();

    assert_eq!(named_edges(&incremental), named_edges(&full));
    assert_eq!(incremental.symbols, full.symbols);
    assert_eq!(incremental.metrics, full.metrics);
}

#[test]
fn test_second_writer_fails_on_live_lock() {
    let temp = repo(&[("a.py", "def foo():\n    pass\n")]);
    fs::create_dir_all(temp.path().join(".taproot")).unwrap();
    let lock = lock_path(temp.path());
    fs::write(
        &lock,
        format!("{{\"pid\":{},\"started_at\":\"2026-01-01T00:00:00Z\"}}", std::process::id()),
    )
    .unwrap();

    let err = run(temp.path(), false).unwrap_err();
    match &err {
        IndexError::LockContention { lock_path, pid } => {
            assert_eq!(lock_path, &lock);
            assert_eq!(*pid, std::process::id());
        }
        other => panic!("expected lock contention, got {other}"),
    }

    fs::remove_file(&lock).unwrap();
    assert_eq!(run(temp.path(), false).unwrap().symbols, 1);
    assert!(!lock.exists());
}
