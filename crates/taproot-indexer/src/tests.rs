//! Index runs through the coordinator

use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use taproot_core::{extractions_path, lock_path, snapshot_path, EdgeKind, Generation, Snapshot, SnapshotView};

use crate::test_utils::{bump_mtime, create_repo_with_structure, write_file};
use crate::{clear_index, Coordinator, IndexError, IndexOptions, IndexSummary};

const THREE_FILES: &[(&str, &str)] = &[
    ("a.py", "def foo():\n    pass\n"),
    ("b.py", "from a import foo\n\ndef bar():\n    foo()\n"),
    ("c.py", "from a import foo\n\ndef baz():\n    foo()\n"),
];

fn index(root: &Path) -> IndexSummary {
    Coordinator::new()
        .run(root, IndexOptions::default(), &AtomicBool::new(false))
        .unwrap()
}

fn rebuild(root: &Path) -> IndexSummary {
    let options = IndexOptions {
        force: true,
        ..IndexOptions::default()
    };
    Coordinator::new().run(root, options, &AtomicBool::new(false)).unwrap()
}

fn load(root: &Path) -> Snapshot {
    Snapshot::load(root).unwrap().unwrap()
}

/// Symbol names, edges by name, and metrics: everything that must not depend
/// on how a generation was built.
fn graph_of(snapshot: &Snapshot) -> impl PartialEq + std::fmt::Debug {
    let name = |id: taproot_core::SymbolId| snapshot.symbols[id.index()].qualified_name.clone();
    let edges: Vec<(String, String, EdgeKind, bool)> = snapshot
        .edges
        .iter()
        .map(|e| (name(e.source), name(e.target), e.kind, e.ambiguous))
        .collect();
    let files: Vec<(String, String)> = snapshot.files.iter().map(|f| (f.path.clone(), f.hash.clone())).collect();
    (
        files,
        snapshot.symbols.clone(),
        edges,
        snapshot.file_edges.clone(),
        snapshot.metrics.clone(),
        snapshot.resolution.clone(),
    )
}

#[test]
fn test_end_to_end_three_files() {
    let temp = create_repo_with_structure(THREE_FILES);
    let summary = index(temp.path());

    assert_eq!(summary.generation.0, 1);
    assert_eq!(summary.files.discovered, 3);
    assert_eq!(summary.files.changed, 3);
    assert_eq!(summary.symbols, 3);
    assert_eq!(summary.files.failed, 0);

    let view = SnapshotView::open(temp.path()).unwrap();
    let foo = &view.symbol_detail("foo").unwrap()[0];
    assert_eq!(foo.symbol.file_path, "a.py");
    let callers: Vec<&str> = foo.callers.iter().map(|n| n.symbol.name.as_str()).collect();
    assert!(callers.contains(&"bar") && callers.contains(&"baz"));
    assert_eq!(foo.metrics.as_ref().unwrap().fan_in, 2);
    assert!(view.cycles().symbol_cycles.is_empty());

    let layers = view.layers().unwrap();
    let layer_of = |name: &str| {
        layers
            .layers
            .iter()
            .find(|l| l.members.iter().any(|m| m.name == name))
            .map(|l| l.layer)
    };
    assert_eq!(layer_of("foo"), Some(0));
    assert_eq!(layer_of("bar"), Some(1));
    assert_eq!(layer_of("baz"), Some(1));

    assert!(!lock_path(temp.path()).exists());
}

#[test]
fn test_unchanged_tree_is_up_to_date_and_deterministic() {
    let temp = create_repo_with_structure(THREE_FILES);
    index(temp.path());
    let first = load(temp.path());

    let summary = index(temp.path());
    assert!(summary.up_to_date);
    assert_eq!(summary.generation, first.generation());
    assert_eq!(summary.files.unchanged, 3);

    // a touched but identical file is hashed once and then remembered
    bump_mtime(temp.path(), "a.py");
    let summary = index(temp.path());
    assert!(summary.up_to_date);
    let touched = load(temp.path());
    assert_eq!(touched.generation(), first.generation());
    assert_ne!(touched.files[0].mtime, first.files[0].mtime);

    rebuild(temp.path());
    let rebuilt = load(temp.path());
    assert_eq!(graph_of(&rebuilt), graph_of(&first));
}

#[test]
fn test_incremental_matches_full_rebuild() {
    let temp = create_repo_with_structure(THREE_FILES);
    write_file(temp.path(), "pkg/d.py", "from a import foo\n\ndef qux():\n    foo()\n");
    index(temp.path());

    write_file(temp.path(), "a.py", "def foo():\n    helper()\n\ndef helper():\n    pass\n");
    bump_mtime(temp.path(), "a.py");
    fs::remove_file(temp.path().join("c.py")).unwrap();
    write_file(temp.path(), "e.py", "from b import bar\n\ndef top():\n    bar()\n");

    let summary = index(temp.path());
    assert_eq!(summary.generation.0, 2);
    assert_eq!(summary.files.changed, 2);
    assert_eq!(summary.files.removed, 1);
    assert_eq!(summary.files.unchanged, 2);
    let incremental = load(temp.path());
    assert!(incremental.symbols.iter().all(|s| s.file_path != "c.py"));
    assert!(incremental.symbols.iter().any(|s| s.name == "helper"));

    rebuild(temp.path());
    let full = load(temp.path());
    assert_eq!(graph_of(&incremental), graph_of(&full));
}

#[test]
fn test_edit_to_target_file_reresolves_unchanged_callers() {
    let temp = create_repo_with_structure(THREE_FILES);
    index(temp.path());

    // foo moves away; b.py and c.py are untouched but lose their edges
    write_file(temp.path(), "a.py", "def other():\n    pass\n");
    bump_mtime(temp.path(), "a.py");
    index(temp.path());

    let snapshot = load(temp.path());
    assert!(snapshot.edges.is_empty());
    assert!(snapshot.resolution.unresolved > 0);
}

#[test]
fn test_live_lock_blocks_until_removed() {
    let temp = create_repo_with_structure(THREE_FILES);
    fs::create_dir_all(temp.path().join(".taproot")).unwrap();
    let held = format!(
        "{{\"pid\":{},\"started_at\":\"2026-01-01T00:00:00Z\"}}",
        std::process::id()
    );
    fs::write(lock_path(temp.path()), held).unwrap();

    let err = Coordinator::new()
        .run(temp.path(), IndexOptions::default(), &AtomicBool::new(false))
        .unwrap_err();
    assert!(matches!(err, IndexError::LockContention { .. }));
    assert!(err.to_string().contains(".taproot/index.lock"));
    assert!(!snapshot_path(temp.path()).exists());

    fs::remove_file(lock_path(temp.path())).unwrap();
    assert_eq!(index(temp.path()).symbols, 3);
}

#[test]
fn test_cancelled_run_commits_nothing() {
    let temp = create_repo_with_structure(THREE_FILES);
    let err = Coordinator::new()
        .run(temp.path(), IndexOptions::default(), &AtomicBool::new(true))
        .unwrap_err();
    assert!(matches!(err, IndexError::Cancelled));
    assert!(!snapshot_path(temp.path()).exists());
    assert!(!lock_path(temp.path()).exists());
}

#[test]
fn test_corrupt_snapshot_needs_force() {
    let temp = create_repo_with_structure(THREE_FILES);
    index(temp.path());
    fs::write(snapshot_path(temp.path()), b"definitely not a snapshot").unwrap();

    let err = Coordinator::new()
        .run(temp.path(), IndexOptions::default(), &AtomicBool::new(false))
        .unwrap_err();
    assert!(matches!(err, IndexError::Snapshot(_)));
    assert!(err.to_string().contains("--force"));

    let summary = rebuild(temp.path());
    assert_eq!(summary.generation.0, 2);
    assert_eq!(summary.symbols, 3);
}

#[test]
fn test_forced_rebuild_advances_generation() {
    let temp = create_repo_with_structure(THREE_FILES);
    index(temp.path());
    write_file(temp.path(), "a.py", "def foo():\n    return 1\n");
    bump_mtime(temp.path(), "a.py");
    assert_eq!(index(temp.path()).generation, Generation(2));

    let summary = rebuild(temp.path());
    assert_eq!(summary.generation, Generation(3));
    assert_eq!(summary.files.changed, 3);
    assert_eq!(load(temp.path()).generation(), Generation(3));
}

#[test]
fn test_failed_forced_run_keeps_committed_snapshot() {
    let temp = create_repo_with_structure(THREE_FILES);
    index(temp.path());
    let committed = load(temp.path());

    // the cache can no longer be written, so Commit fails
    let cache = extractions_path(temp.path());
    fs::remove_file(&cache).unwrap();
    fs::create_dir(&cache).unwrap();
    let options = IndexOptions {
        force: true,
        ..IndexOptions::default()
    };
    let err = Coordinator::new()
        .run(temp.path(), options, &AtomicBool::new(false))
        .unwrap_err();
    assert!(matches!(err, IndexError::Io(_)));
    assert_eq!(load(temp.path()), committed);
    assert!(!lock_path(temp.path()).exists());

    fs::remove_dir(&cache).unwrap();
    assert_eq!(rebuild(temp.path()).generation, Generation(2));
}

#[test]
fn test_cancelled_forced_run_keeps_committed_snapshot() {
    let temp = create_repo_with_structure(THREE_FILES);
    index(temp.path());
    let options = IndexOptions {
        force: true,
        ..IndexOptions::default()
    };
    let err = Coordinator::new()
        .run(temp.path(), options, &AtomicBool::new(true))
        .unwrap_err();
    assert!(matches!(err, IndexError::Cancelled));
    assert_eq!(load(temp.path()).generation(), Generation(1));
    assert!(index(temp.path()).up_to_date);
}

#[test]
fn test_clear_refuses_while_a_writer_holds_the_lock() {
    let temp = create_repo_with_structure(THREE_FILES);
    index(temp.path());
    let held = format!(
        "{{\"pid\":{},\"started_at\":\"2026-01-01T00:00:00Z\"}}",
        std::process::id()
    );
    fs::write(lock_path(temp.path()), held).unwrap();

    let err = clear_index(temp.path()).unwrap_err();
    assert!(matches!(err, IndexError::LockContention { .. }));
    assert!(snapshot_path(temp.path()).exists());

    fs::remove_file(lock_path(temp.path())).unwrap();
    clear_index(temp.path()).unwrap();
    assert!(!snapshot_path(temp.path()).exists());
    assert!(!extractions_path(temp.path()).exists());
    assert!(!lock_path(temp.path()).exists());
}

#[test]
fn test_extraction_failure_is_counted_not_fatal() {
    let temp = create_repo_with_structure(THREE_FILES);
    fs::write(temp.path().join("broken.py"), [0x64, 0x65, 0x66, 0xff, 0xfe]).unwrap();

    let summary = index(temp.path());
    assert_eq!(summary.files.discovered, 4);
    assert_eq!(summary.files.failed, 1);
    assert_eq!(summary.symbols, 3);
    assert_eq!(load(temp.path()).failed_files, vec!["broken.py"]);

    // still reported once the file is unchanged
    assert_eq!(index(temp.path()).files.failed, 1);
}

#[test]
fn test_mixed_languages_do_not_cross_resolve() {
    let temp = create_repo_with_structure(&[
        ("py/util.py", "def shared():\n    pass\n"),
        ("js/app.js", "function main() {\n    shared();\n}\n"),
        ("src/lib.rs", "pub fn shared() {}\n\nfn run() {\n    shared();\n}\n"),
    ]);
    index(temp.path());

    let snapshot = load(temp.path());
    assert_eq!(snapshot.edges.len(), 1);
    let edge = snapshot.edges[0];
    assert_eq!(snapshot.symbols[edge.source.index()].qualified_name, "run");
    assert_eq!(snapshot.symbols[edge.target.index()].file_path, "src/lib.rs");
}
