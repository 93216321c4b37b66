//! Per-file extraction results carried between runs
//!
//! Incremental runs re-extract only changed files, but Resolution needs every
//! file's symbols and references. Those of unchanged files come from here.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use taproot_core::{atomic_write, extractions_path, ExtractedFile, FileRecord, Generation};
use tracing::{debug, warn};

/// Bumped whenever the cached layout or extractor output changes shape.
const CACHE_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedFile {
    pub record: FileRecord,
    pub extracted: ExtractedFile,
    /// Set when extraction failed; `extracted` is then empty.
    pub failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionCache {
    version: u32,
    /// Generation these entries were committed with.
    generation: Generation,
    entries: BTreeMap<String, CachedFile>,
}

impl Default for ExtractionCache {
    fn default() -> Self {
        ExtractionCache {
            version: CACHE_VERSION,
            generation: Generation::default(),
            entries: BTreeMap::new(),
        }
    }
}

impl ExtractionCache {
    /// Load the cache; a missing, unreadable or outdated cache is empty, which
    /// makes every file count as changed.
    pub fn load(root: &Path) -> Self {
        let path = extractions_path(root);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!("Ignoring unreadable extraction cache {}: {}", path.display(), e);
                return Self::default();
            }
        };
        match bincode::deserialize::<ExtractionCache>(&bytes) {
            Ok(cache) if cache.version == CACHE_VERSION => {
                debug!("Loaded {} cached extractions", cache.entries.len());
                cache
            }
            Ok(cache) => {
                warn!("Discarding extraction cache version {}", cache.version);
                Self::default()
            }
            Err(e) => {
                warn!("Discarding corrupt extraction cache {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, root: &Path) -> io::Result<()> {
        let bytes = bincode::serialize(self).map_err(io::Error::other)?;
        atomic_write(&extractions_path(root), &bytes)
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn set_generation(&mut self, generation: Generation) {
        self.generation = generation;
    }

    pub fn get(&self, path: &str) -> Option<&CachedFile> {
        self.entries.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut CachedFile> {
        self.entries.get_mut(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn insert(&mut self, entry: CachedFile) {
        self.entries.insert(entry.record.path.clone(), entry);
    }

    pub fn remove(&mut self, path: &str) -> Option<CachedFile> {
        self.entries.remove(path)
    }

    /// Drop every entry whose path is not in `keep` (sorted).
    pub fn retain_paths(&mut self, keep: &[String]) {
        self.entries
            .retain(|path, _| keep.binary_search_by(|k| k.as_str().cmp(path)).is_ok());
    }

    /// Entries in path order.
    pub fn entries(&self) -> impl Iterator<Item = &CachedFile> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taproot_core::Language;

    fn entry(path: &str) -> CachedFile {
        CachedFile {
            record: FileRecord {
                path: path.to_string(),
                language: Language::Rust,
                hash: "abc".to_string(),
                mtime: 7,
                generation: Generation(1),
            },
            extracted: ExtractedFile {
                path: path.to_string(),
                language: Language::Rust,
                symbols: Vec::new(),
                references: Vec::new(),
            },
            failure: None,
        }
    }

    #[test]
    fn test_save_and_load() {
        let temp = tempfile::tempdir().unwrap();
        let mut cache = ExtractionCache::default();
        cache.insert(entry("b.rs"));
        cache.insert(entry("a.rs"));
        cache.set_generation(Generation(4));
        cache.save(temp.path()).unwrap();

        let loaded = ExtractionCache::load(temp.path());
        assert_eq!(loaded, cache);
        assert_eq!(loaded.generation(), Generation(4));
        let order: Vec<&str> = loaded.entries().map(|e| e.record.path.as_str()).collect();
        assert_eq!(order, vec!["a.rs", "b.rs"]);
    }

    #[test]
    fn test_corrupt_cache_loads_empty() {
        let temp = tempfile::tempdir().unwrap();
        atomic_write(&extractions_path(temp.path()), b"\x01garbage").unwrap();
        assert!(ExtractionCache::load(temp.path()).is_empty());
    }

    #[test]
    fn test_retain_paths() {
        let mut cache = ExtractionCache::default();
        cache.insert(entry("a.rs"));
        cache.insert(entry("b.rs"));
        cache.retain_paths(&["b.rs".to_string()]);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("b.rs"));
    }
}
