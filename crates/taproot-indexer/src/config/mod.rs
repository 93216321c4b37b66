//! Project configuration loaded from `.taproot.toml`

use std::fs;
use std::io;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use taproot_core::{config_path, MetricsConfig};
use tracing::debug;

use crate::error::{IndexError, Result};

/// Files larger than this are skipped and counted.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Glob patterns, relative to the project root, that Discovery skips.
    pub exclude: Vec<String>,
    pub max_file_bytes: u64,
    /// Extraction worker threads; 0 uses the rayon default.
    pub threads: usize,
    /// Ask git for the file list when the root is a work tree.
    pub use_git: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            exclude: Vec::new(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            threads: 0,
            use_git: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaprootConfig {
    pub index: IndexConfig,
    pub metrics: MetricsConfig,
}

impl TaprootConfig {
    /// Load `.taproot.toml` from the project root, falling back to defaults
    /// when the file does not exist.
    pub fn load(root: &Path) -> Result<Self> {
        let path = config_path(root);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No {} found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let config: TaprootConfig = toml::from_str(&content).map_err(|e| IndexError::Config {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        config.validate(&path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |reason: String| IndexError::Config {
            path: path.to_path_buf(),
            reason,
        };
        let m = &self.metrics;
        if !(0.0..1.0).contains(&m.damping) {
            return Err(invalid(format!("metrics.damping must be in [0, 1), got {}", m.damping)));
        }
        if m.tolerance <= 0.0 {
            return Err(invalid("metrics.tolerance must be positive".to_string()));
        }
        if m.louvain_resolution <= 0.0 {
            return Err(invalid("metrics.louvain_resolution must be positive".to_string()));
        }
        self.exclude_set().map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }

    /// Compile the `exclude` patterns.
    pub fn exclude_set(&self) -> std::result::Result<GlobSet, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.index.exclude {
            builder.add(Glob::new(pattern)?);
        }
        builder.build()
    }
}

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Drop the previous snapshot and extraction cache and re-extract every file.
    pub force: bool,
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = TaprootConfig::load(temp.path()).unwrap();
        assert_eq!(config, TaprootConfig::default());
        assert_eq!(config.index.max_file_bytes, DEFAULT_MAX_FILE_BYTES);
        assert!((config.metrics.damping - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(
            temp.path().join(".taproot.toml"),
            "[index]\nexclude = [\"vendor/**\"]\n\n[metrics]\nk_paths = 5\n",
        )
        .unwrap();

        let config = TaprootConfig::load(temp.path()).unwrap();
        assert_eq!(config.index.exclude, vec!["vendor/**"]);
        assert!(config.index.use_git);
        assert_eq!(config.metrics.k_paths, 5);
        assert_eq!(config.metrics.max_iterations, 100);
        assert!(config.exclude_set().unwrap().is_match("vendor/lib/x.py"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join(".taproot.toml"), "[metrics]\ndamping = 1.5\n").unwrap();
        assert!(matches!(TaprootConfig::load(temp.path()), Err(IndexError::Config { .. })));

        fs::write(temp.path().join(".taproot.toml"), "[index]\nexclude = [\"[\"]\n").unwrap();
        assert!(matches!(TaprootConfig::load(temp.path()), Err(IndexError::Config { .. })));
    }
}
