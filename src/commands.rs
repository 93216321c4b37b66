//! CLI command implementations

use std::path::Path;
use std::sync::atomic::AtomicBool;

use anyhow::Context;
use serde::Serialize;
use taproot_core::{FanMode, SnapshotView};
use taproot_indexer::{clear_index, Coordinator, IndexOptions, TaprootConfig};

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open(root: &Path) -> anyhow::Result<SnapshotView> {
    SnapshotView::open(root).with_context(|| format!("Cannot read index under {}", root.display()))
}

pub fn index(root: &Path, force: bool, verbose: bool) -> anyhow::Result<()> {
    tracing::info!("Indexing repository: {}", root.display());

    let options = IndexOptions { force, verbose };
    let cancel = AtomicBool::new(false);
    let summary = Coordinator::new().run(root, options, &cancel)?;

    tracing::info!(
        "Generation {}: {} symbols, {} edges",
        summary.generation.0,
        summary.symbols,
        summary.edges
    );
    print_json(&summary)
}

pub fn status(root: &Path) -> anyhow::Result<()> {
    print_json(&open(root)?.stats())
}

pub fn symbol(root: &Path, name: &str) -> anyhow::Result<()> {
    print_json(&open(root)?.symbol_detail(name)?)
}

pub fn file(root: &Path, path: &str) -> anyhow::Result<()> {
    print_json(&open(root)?.file_detail(path)?)
}

pub fn path(root: &Path, from: &str, to: &str, k: Option<usize>) -> anyhow::Result<()> {
    let k = match k {
        Some(k) => k,
        None => TaprootConfig::load(root)?.metrics.k_paths,
    };
    let paths = open(root)?.k_shortest_paths(from, to, k)?;
    if paths.is_empty() {
        tracing::info!("No dependency path from {} to {}", from, to);
    }
    print_json(&paths)
}

pub fn cycles(root: &Path) -> anyhow::Result<()> {
    print_json(&open(root)?.cycles())
}

pub fn communities(root: &Path) -> anyhow::Result<()> {
    print_json(&open(root)?.communities()?)
}

pub fn layers(root: &Path) -> anyhow::Result<()> {
    print_json(&open(root)?.layers()?)
}

pub fn fan(root: &Path, mode: FanMode, limit: usize) -> anyhow::Result<()> {
    print_json(&open(root)?.fan_ranking(mode, limit))
}

pub fn clear(root: &Path) -> anyhow::Result<()> {
    tracing::info!("Clearing index for: {}", root.display());

    clear_index(root)?;

    tracing::info!("Index cleared");
    Ok(())
}
