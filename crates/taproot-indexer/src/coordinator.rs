//! Orchestrates one index run
//!
//! A run walks `Locked -> Discover -> Diff -> Extract -> Resolve -> Metrics ->
//! Commit` through an [`IndexSession`], which carries the configuration, the
//! working file set and the generation being built. Only `Commit` touches the
//! files readers see; a run that stops earlier leaves the last generation in
//! place and its lock released.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use taproot_core::{
    aggregate_file_edges, clear_state, compute_all, diff_files, resolve, ExtractedFile, FileChangeSet, FileRecord,
    Generation, IndexState, ObservedFile, OmittedMetric, ResolutionStats, Snapshot, SymbolTable, SNAPSHOT_VERSION,
};
use tracing::{debug, info, warn};

use crate::config::{IndexOptions, TaprootConfig};
use crate::discovery::{discover, Candidate, Discovery, DiscoverySource};
use crate::error::{IndexError, Result};
use crate::extraction_cache::{CachedFile, ExtractionCache};
use crate::extractor::{content_hash, extract_file, ExtractorRegistry, FileExtraction};
use crate::lock::IndexLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Locked,
    Discover,
    Diff,
    Extract,
    Resolve,
    Metrics,
    Commit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileCounts {
    pub discovered: usize,
    pub changed: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// No extractor for the file.
    pub skipped: usize,
    pub too_large: usize,
    /// Files in the generation whose extraction failed.
    pub failed: usize,
}

/// What a run did, for the caller to report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexSummary {
    pub generation: Generation,
    /// Nothing changed since the committed generation.
    pub up_to_date: bool,
    pub files: FileCounts,
    pub symbols: usize,
    pub edges: usize,
    pub file_edges: usize,
    pub resolution: ResolutionStats,
    pub omitted_metrics: Vec<OmittedMetric>,
    pub discovery: DiscoverySource,
    pub elapsed_ms: u64,
}

/// Context threaded through the phases of one run.
pub struct IndexSession<'a> {
    root: PathBuf,
    config: TaprootConfig,
    options: IndexOptions,
    cancel: &'a AtomicBool,
    registry: &'a ExtractorRegistry,
    phase: Phase,
    started: Instant,
}

impl<'a> IndexSession<'a> {
    pub fn new(
        root: &Path,
        config: TaprootConfig,
        options: IndexOptions,
        registry: &'a ExtractorRegistry,
        cancel: &'a AtomicBool,
    ) -> Self {
        IndexSession {
            root: root.to_path_buf(),
            config,
            options,
            cancel,
            registry,
            phase: Phase::Idle,
            started: Instant::now(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) -> Result<()> {
        if self.cancelled() {
            warn!(phase = ?self.phase, "Index run cancelled");
            return Err(IndexError::Cancelled);
        }
        debug!(from = ?self.phase, to = ?phase, "Index phase");
        self.phase = phase;
        Ok(())
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn run(mut self) -> Result<IndexSummary> {
        self.enter(Phase::Locked)?;
        let lock = IndexLock::acquire(&self.root)?;
        info!("Indexing {}", self.root.display());

        let force = self.options.force;
        let previous = match Snapshot::load(&self.root) {
            Ok(previous) => previous,
            Err(e) if force => {
                warn!("Rebuilding over unreadable snapshot: {}", e);
                None
            }
            Err(e) => return Err(e.into()),
        };
        let stored = ExtractionCache::load(&self.root);
        let last_generation = [
            previous.as_ref().map(Snapshot::generation),
            Snapshot::peek_generation(&self.root),
            Some(stored.generation()),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or_default();
        let mut cache = if force {
            info!("Forced rebuild: re-extracting every file");
            ExtractionCache::default()
        } else {
            stored
        };

        self.enter(Phase::Discover)?;
        let discovery = discover(&self.root, &self.config, self.registry);

        self.enter(Phase::Diff)?;
        let baseline = if force { None } else { previous.as_ref() };
        let changes = self.diff(baseline, &discovery, &cache);
        if let Some(previous) = previous.filter(|_| !force && changes.is_empty()) {
            let summary = self.refresh(previous, &discovery, &changes, &mut cache)?;
            drop(lock);
            return Ok(summary);
        }
        let generation = last_generation.next();

        self.enter(Phase::Extract)?;
        self.extract(&discovery, &changes, generation, &mut cache)?;

        self.enter(Phase::Resolve)?;
        let files: Vec<ExtractedFile> = cache.entries().map(|e| e.extracted.clone()).collect();
        let table = SymbolTable::build(&files);
        let resolution = resolve(&table, &files);
        let symbols = table.into_symbols();
        let file_edges = aggregate_file_edges(&symbols, &resolution.edges);
        info!(
            "Resolved {} edges over {} symbols ({:.1}% coverage)",
            resolution.edges.len(),
            symbols.len(),
            resolution.stats.coverage() * 100.0
        );

        self.enter(Phase::Metrics)?;
        let metrics = compute_all(&symbols, &resolution.edges, &file_edges, &self.config.metrics);

        self.enter(Phase::Commit)?;
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            state: IndexState {
                generation,
                built_at: Utc::now(),
                lock_owner: Some(lock.info().pid),
            },
            files: cache.entries().map(|e| e.record.clone()).collect(),
            symbols,
            edges: resolution.edges,
            file_edges,
            metrics,
            resolution: resolution.stats,
            failed_files: failed_paths(&cache),
        };
        cache.set_generation(generation);
        cache.save(&self.root)?;
        snapshot.save(&self.root)?;
        drop(lock);

        let summary = self.summary(&snapshot, &discovery, &changes, false);
        info!(
            "Committed generation {}: {} files, {} symbols, {} edges in {}ms",
            generation.0, summary.files.discovered, summary.symbols, summary.edges, summary.elapsed_ms
        );
        Ok(summary)
    }

    /// Compare Discovery's file set against the committed generation.
    fn diff(&self, previous: Option<&Snapshot>, discovery: &Discovery, cache: &ExtractionCache) -> FileChangeSet {
        let previous_files = previous.map_or(&[][..], |s| s.files.as_slice());
        let observed: Vec<ObservedFile> = discovery.files.iter().map(Candidate::observed).collect();
        let mut changes = diff_files(previous_files, &observed, |path| hash_file(&self.root.join(path)));

        let uncached: Vec<String> = changes
            .unchanged
            .iter()
            .filter(|path| !cache.contains(path))
            .cloned()
            .collect();
        if !uncached.is_empty() {
            debug!("{} unchanged files have no cached extraction", uncached.len());
        }
        for path in &uncached {
            changes.force_modified(path);
        }

        info!(
            "{} added, {} modified, {} removed, {} unchanged",
            changes.added.len(),
            changes.modified.len(),
            changes.removed.len(),
            changes.unchanged.len()
        );
        changes
    }

    /// Extract changed files in parallel and merge them into the cache.
    fn extract(
        &self,
        discovery: &Discovery,
        changes: &FileChangeSet,
        generation: Generation,
        cache: &mut ExtractionCache,
    ) -> Result<()> {
        let by_path: HashMap<&str, &Candidate> = discovery.files.iter().map(|c| (c.path.as_str(), c)).collect();
        let jobs: Vec<&Candidate> = changes
            .changed()
            .iter()
            .filter_map(|path| by_path.get(path.as_str()).copied())
            .collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.index.threads)
            .build()
            .map_err(io::Error::other)?;
        let root = self.root.as_path();
        let cancel = self.cancel;
        let verbose = self.options.verbose;
        let results: Vec<Option<(&Candidate, Option<String>, FileExtraction)>> = pool.install(|| {
            jobs.par_iter()
                .map(|candidate| {
                    if cancel.load(Ordering::Relaxed) {
                        return None;
                    }
                    if verbose {
                        info!("Extracting {}", candidate.path);
                    }
                    let (hash, extraction) = extract_file(&root.join(&candidate.path), candidate.extractor);
                    Some((*candidate, hash, extraction))
                })
                .collect()
        });
        if self.cancelled() {
            warn!("Index run cancelled during extraction");
            return Err(IndexError::Cancelled);
        }

        for path in &changes.removed {
            cache.remove(path);
        }
        let mut failures = 0;
        for (candidate, hash, extraction) in results.into_iter().flatten() {
            let failure = match &extraction {
                FileExtraction::Failed { reason } => {
                    warn!("No symbols extracted from {}: {}", candidate.path, reason);
                    failures += 1;
                    Some(reason.clone())
                }
                FileExtraction::Parsed { .. } => None,
            };
            let language = candidate.extractor.language();
            let (symbols, references) = extraction.into_parts();
            cache.insert(CachedFile {
                record: FileRecord {
                    path: candidate.path.clone(),
                    language,
                    hash: hash.unwrap_or_default(),
                    mtime: candidate.mtime,
                    generation,
                },
                extracted: ExtractedFile {
                    path: candidate.path.clone(),
                    language,
                    symbols,
                    references,
                },
                failure,
            });
        }
        apply_touched(changes, cache);
        let keep: Vec<String> = discovery.files.iter().map(|c| c.path.clone()).collect();
        cache.retain_paths(&keep);

        info!("Extracted {} files ({} failed)", jobs.len(), failures);
        Ok(())
    }

    /// Nothing to re-extract: keep the committed generation, recording moved
    /// mtimes so the next run does not hash those files again.
    fn refresh(
        &mut self,
        mut snapshot: Snapshot,
        discovery: &Discovery,
        changes: &FileChangeSet,
        cache: &mut ExtractionCache,
    ) -> Result<IndexSummary> {
        if !changes.touched.is_empty() {
            self.enter(Phase::Commit)?;
            for record in snapshot.files.iter_mut() {
                if let Some((mtime, hash)) = changes.touched.get(&record.path) {
                    record.mtime = *mtime;
                    record.hash = hash.clone();
                }
            }
            apply_touched(changes, cache);
            cache.save(&self.root)?;
            snapshot.save(&self.root)?;
        }
        info!("Index is up to date at generation {}", snapshot.generation().0);
        Ok(self.summary(&snapshot, discovery, changes, true))
    }

    fn summary(
        &self,
        snapshot: &Snapshot,
        discovery: &Discovery,
        changes: &FileChangeSet,
        up_to_date: bool,
    ) -> IndexSummary {
        IndexSummary {
            generation: snapshot.generation(),
            up_to_date,
            files: FileCounts {
                discovered: discovery.files.len(),
                changed: changes.added.len() + changes.modified.len(),
                removed: changes.removed.len(),
                unchanged: changes.unchanged.len(),
                skipped: discovery.skipped,
                too_large: discovery.too_large.len(),
                failed: snapshot.failed_files.len(),
            },
            symbols: snapshot.symbols.len(),
            edges: snapshot.edges.len(),
            file_edges: snapshot.file_edges.len(),
            resolution: snapshot.resolution.clone(),
            omitted_metrics: snapshot.metrics.omitted.clone(),
            discovery: discovery.source,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

fn apply_touched(changes: &FileChangeSet, cache: &mut ExtractionCache) {
    for (path, (mtime, hash)) in &changes.touched {
        if let Some(entry) = cache.get_mut(path) {
            entry.record.mtime = *mtime;
            entry.record.hash = hash.clone();
        }
    }
}

fn failed_paths(cache: &ExtractionCache) -> Vec<String> {
    cache
        .entries()
        .filter(|e| e.failure.is_some())
        .map(|e| e.record.path.clone())
        .collect()
}

fn hash_file(path: &Path) -> Option<String> {
    fs::read(path).ok().map(|bytes| content_hash(&bytes))
}

/// Remove the committed snapshot and extraction cache under the index lock.
pub fn clear_index(root: &Path) -> Result<()> {
    let lock = IndexLock::acquire(root)?;
    clear_state(root)?;
    drop(lock);
    debug!("Cleared index state under {}", root.display());
    Ok(())
}

/// Entry point for index runs.
#[derive(Debug, Default)]
pub struct Coordinator {
    registry: ExtractorRegistry,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `.taproot.toml` from `root` and run.
    pub fn run(&self, root: &Path, options: IndexOptions, cancel: &AtomicBool) -> Result<IndexSummary> {
        let config = TaprootConfig::load(root)?;
        self.run_with_config(root, config, options, cancel)
    }

    pub fn run_with_config(
        &self,
        root: &Path,
        config: TaprootConfig,
        options: IndexOptions,
        cancel: &AtomicBool,
    ) -> Result<IndexSummary> {
        IndexSession::new(root, config, options, &self.registry, cancel).run()
    }
}
