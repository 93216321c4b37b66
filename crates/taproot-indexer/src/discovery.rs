//! Candidate file enumeration
//!
//! Asks git for the tracked and untracked-but-not-ignored files when the root
//! is a work tree, and walks the directory otherwise. Both paths apply the
//! same filters so the file set does not depend on which one ran.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::process::Command;
use std::time::UNIX_EPOCH;

use globset::GlobSet;
use ignore::WalkBuilder;
use serde::Serialize;
use taproot_core::{is_git_root, ObservedFile, STATE_DIR};
use tracing::{debug, warn};

use crate::config::TaprootConfig;
use crate::extractor::{Extractor, ExtractorRegistry};

/// Bytes read from extension-less files to look for a shebang.
const SNIFF_BYTES: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    Git,
    Walk,
}

/// A file with a selected extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Project-relative, `/`-separated.
    pub path: String,
    pub extractor: Extractor,
    /// Nanoseconds since the Unix epoch.
    pub mtime: i64,
}

impl Candidate {
    pub fn observed(&self) -> ObservedFile {
        ObservedFile {
            path: self.path.clone(),
            language: self.extractor.language(),
            mtime: self.mtime,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Discovery {
    /// Sorted by path.
    pub files: Vec<Candidate>,
    /// Files no extractor handles.
    pub skipped: usize,
    /// Files over `max_file_bytes`, sorted.
    pub too_large: Vec<String>,
    pub source: DiscoverySource,
}

pub fn discover(root: &Path, config: &TaprootConfig, registry: &ExtractorRegistry) -> Discovery {
    let exclude = config.exclude_set().unwrap_or_else(|e| {
        // patterns were validated when the config was loaded
        warn!("Ignoring exclude patterns: {}", e);
        GlobSet::empty()
    });

    let (source, mut paths) = match git_files(root, config.index.use_git) {
        Some(paths) => (DiscoverySource::Git, paths),
        None => (DiscoverySource::Walk, walk_files(root)),
    };
    paths.retain(|p| !is_hidden(p) && !exclude.is_match(p));
    paths.sort();
    paths.dedup();

    let mut discovery = Discovery {
        files: Vec::with_capacity(paths.len()),
        skipped: 0,
        too_large: Vec::new(),
        source,
    };
    for path in paths {
        let full = root.join(&path);
        // git may list files deleted from the work tree
        let Ok(meta) = fs::metadata(&full) else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let extractor = if registry.knows_extension(Path::new(&path)) {
            registry.select(Path::new(&path), b"")
        } else if Path::new(&path).extension().is_none() {
            registry.select(Path::new(&path), &read_head(&full))
        } else {
            None
        };
        let Some(extractor) = extractor else {
            discovery.skipped += 1;
            continue;
        };
        if meta.len() > config.index.max_file_bytes {
            debug!("Skipping {} ({} bytes)", path, meta.len());
            discovery.too_large.push(path);
            continue;
        }
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        discovery.files.push(Candidate { path, extractor, mtime });
    }

    debug!(
        "Discovered {} files via {:?} ({} skipped, {} too large)",
        discovery.files.len(),
        discovery.source,
        discovery.skipped,
        discovery.too_large.len()
    );
    discovery
}

/// `git ls-files` output, or `None` when git is off, absent or fails.
fn git_files(root: &Path, use_git: bool) -> Option<Vec<String>> {
    if !use_git || !is_git_root(root) {
        return None;
    }
    let output = Command::new("git")
        .args(["ls-files", "-z", "--cached", "--others", "--exclude-standard"])
        .current_dir(root)
        .output();
    match output {
        Ok(output) if output.status.success() => Some(
            output
                .stdout
                .split(|&b| b == 0)
                .filter(|p| !p.is_empty())
                .map(|p| String::from_utf8_lossy(p).into_owned())
                .collect(),
        ),
        Ok(output) => {
            warn!(
                "git ls-files failed, falling back to directory walk: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            None
        }
        Err(e) => {
            warn!("git unavailable, falling back to directory walk: {}", e);
            None
        }
    }
}

fn walk_files(root: &Path) -> Vec<String> {
    WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .require_git(false)
        .filter_entry(|entry| entry.file_name() != STATE_DIR)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(root).ok()?;
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            Some(parts.join("/"))
        })
        .collect()
}

/// Any path component starting with a dot, which covers `.taproot/`.
fn is_hidden(path: &str) -> bool {
    path.split('/').any(|part| part.starts_with('.') && part != "." && part != "..")
}

fn read_head(path: &Path) -> Vec<u8> {
    let mut head = Vec::new();
    if let Ok(file) = File::open(path) {
        let _ = file.take(SNIFF_BYTES).read_to_end(&mut head);
    }
    head
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::script::Dialect;
    use crate::test_utils::create_repo_with_structure;

    fn paths(discovery: &Discovery) -> Vec<&str> {
        discovery.files.iter().map(|c| c.path.as_str()).collect()
    }

    #[test]
    fn test_walk_honours_gitignore_and_excludes() {
        let temp = create_repo_with_structure(&[
            (".gitignore", "build/\n"),
            ("src/app.py", "def main():\n    pass\n"),
            ("src/ui/view.tsx", "export const View = () => null;\n"),
            ("build/out.js", "x()\n"),
            ("vendor/lib.rs", "fn f() {}\n"),
            (".taproot/snapshot.bin", ""),
            (".hidden/secret.py", "x = 1\n"),
            ("README.md", "# readme\n"),
            ("bin/tool", "#!/usr/bin/env python3\nprint('hi')\n"),
        ]);
        let mut config = TaprootConfig::default();
        config.index.exclude = vec!["vendor/**".to_string()];

        let discovery = discover(temp.path(), &config, &ExtractorRegistry::new());
        assert_eq!(discovery.source, DiscoverySource::Walk);
        assert_eq!(paths(&discovery), vec!["bin/tool", "src/app.py", "src/ui/view.tsx"]);
        assert_eq!(discovery.files[2].extractor, Extractor::Script { dialect: Dialect::Tsx });
        assert_eq!(discovery.files[0].extractor, Extractor::Python);
        assert_eq!(discovery.skipped, 1);
        assert!(discovery.files.iter().all(|c| c.mtime > 0));
    }

    #[test]
    fn test_large_files_are_counted() {
        let temp = create_repo_with_structure(&[("big.py", &"x = 1\n".repeat(100)), ("small.py", "y = 2\n")]);
        let mut config = TaprootConfig::default();
        config.index.max_file_bytes = 64;

        let discovery = discover(temp.path(), &config, &ExtractorRegistry::new());
        assert_eq!(paths(&discovery), vec!["small.py"]);
        assert_eq!(discovery.too_large, vec!["big.py"]);
    }

    #[test]
    fn test_use_git_off_walks() {
        let temp = create_repo_with_structure(&[("a.rs", "fn a() {}\n")]);
        fs::create_dir(temp.path().join(".git")).unwrap();
        let mut config = TaprootConfig::default();
        config.index.use_git = false;

        let discovery = discover(temp.path(), &config, &ExtractorRegistry::new());
        assert_eq!(discovery.source, DiscoverySource::Walk);
        assert_eq!(paths(&discovery), vec!["a.rs"]);
    }
}
