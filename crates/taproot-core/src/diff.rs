//! File-set diffing for incremental updates

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::{FileRecord, Language};

/// A file as seen by Discovery in the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedFile {
    pub path: String,
    pub language: Language,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime: i64,
}

/// Outcome of comparing the discovered file set against the last generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeSet {
    /// New files, sorted.
    pub added: Vec<String>,
    /// Files whose content hash differs, sorted.
    pub modified: Vec<String>,
    /// Files that disappeared from Discovery, sorted.
    pub removed: Vec<String>,
    /// Files whose stored record still describes their content, sorted.
    pub unchanged: Vec<String>,
    /// Unchanged files whose mtime moved; path -> (new mtime, hash).
    pub touched: BTreeMap<String, (i64, String)>,
}

impl FileChangeSet {
    /// Files that need extraction, sorted.
    pub fn changed(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self.added.iter().chain(&self.modified).collect();
        set.into_iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Move an unchanged file into `modified`, e.g. when its cached extraction is gone.
    pub fn force_modified(&mut self, path: &str) {
        if let Ok(pos) = self.unchanged.binary_search_by(|p| p.as_str().cmp(path)) {
            let path = self.unchanged.remove(pos);
            self.touched.remove(&path);
            if let Err(at) = self.modified.binary_search(&path) {
                self.modified.insert(at, path);
            }
        }
    }
}

/// Compare the current file set against the previous generation's records.
///
/// The stored mtime is checked first; only when it moved is the content hash
/// computed (through `hash_of`) and compared. A file that cannot be hashed is
/// treated as modified so extraction reports it.
pub fn diff_files<F>(previous: &[FileRecord], current: &[ObservedFile], mut hash_of: F) -> FileChangeSet
where
    F: FnMut(&str) -> Option<String>,
{
    let before: BTreeMap<&str, &FileRecord> = previous.iter().map(|r| (r.path.as_str(), r)).collect();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut changes = FileChangeSet::default();

    for file in current {
        seen.insert(file.path.as_str());
        let Some(record) = before.get(file.path.as_str()) else {
            changes.added.push(file.path.clone());
            continue;
        };
        if record.language != file.language {
            changes.modified.push(file.path.clone());
            continue;
        }
        if record.mtime == file.mtime {
            changes.unchanged.push(file.path.clone());
            continue;
        }
        match hash_of(&file.path) {
            Some(hash) if hash == record.hash => {
                changes.unchanged.push(file.path.clone());
                changes.touched.insert(file.path.clone(), (file.mtime, hash));
            }
            _ => changes.modified.push(file.path.clone()),
        }
    }

    changes.removed = before
        .keys()
        .filter(|path| !seen.contains(*path))
        .map(|path| path.to_string())
        .collect();
    changes.added.sort();
    changes.modified.sort();
    changes.unchanged.sort();
    changes
}
