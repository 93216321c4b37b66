//! Extractor registry and per-file extraction results

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use taproot_core::{Language, RawReference, SymbolDef};

use crate::languages::python::PythonExtractor;
use crate::languages::rust::RustExtractor;
use crate::languages::script::{Dialect, ScriptExtractor};
use crate::languages::FileOutput;
use crate::parser_pool::ParseError;

/// The closed set of extractors. Exactly one is selected per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extractor {
    Python,
    Script { dialect: Dialect },
    Rust,
}

impl Extractor {
    pub fn language(self) -> Language {
        match self {
            Extractor::Python => Language::Python,
            Extractor::Script { dialect: Dialect::JavaScript } => Language::JavaScript,
            Extractor::Script { .. } => Language::TypeScript,
            Extractor::Rust => Language::Rust,
        }
    }

    pub fn extract(self, source: &str) -> FileExtraction {
        let output: Result<FileOutput, ParseError> = match self {
            Extractor::Python => PythonExtractor.extract(source),
            Extractor::Script { dialect } => ScriptExtractor::new(dialect).extract(source),
            Extractor::Rust => RustExtractor.extract(source),
        };
        match output {
            Ok(output) => FileExtraction::Parsed {
                symbols: output.symbols,
                references: output.references,
            },
            Err(e) => FileExtraction::Failed { reason: e.to_string() },
        }
    }
}

/// Outcome of extracting one file. Failures stay local to the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileExtraction {
    Parsed {
        symbols: Vec<SymbolDef>,
        references: Vec<RawReference>,
    },
    Failed { reason: String },
}

impl FileExtraction {
    pub fn is_failed(&self) -> bool {
        matches!(self, FileExtraction::Failed { .. })
    }

    /// Symbols and references; empty for a failed file.
    pub fn into_parts(self) -> (Vec<SymbolDef>, Vec<RawReference>) {
        match self {
            FileExtraction::Parsed { symbols, references } => (symbols, references),
            FileExtraction::Failed { .. } => (Vec::new(), Vec::new()),
        }
    }
}

/// Picks the extractor for a file by extension, falling back to the
/// interpreter named on a shebang line.
#[derive(Debug, Clone)]
pub struct ExtractorRegistry {
    by_extension: HashMap<&'static str, Extractor>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        let script = |dialect| Extractor::Script { dialect };
        let by_extension = HashMap::from([
            ("py", Extractor::Python),
            ("pyi", Extractor::Python),
            ("rs", Extractor::Rust),
            ("js", script(Dialect::JavaScript)),
            ("jsx", script(Dialect::JavaScript)),
            ("mjs", script(Dialect::JavaScript)),
            ("cjs", script(Dialect::JavaScript)),
            ("ts", script(Dialect::TypeScript)),
            ("mts", script(Dialect::TypeScript)),
            ("cts", script(Dialect::TypeScript)),
            ("tsx", script(Dialect::Tsx)),
        ]);
        Self { by_extension }
    }
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `path` has an extension the registry knows.
    pub fn knows_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.by_extension.contains_key(e))
    }

    /// `head` is the start of the file and is only consulted for files
    /// without an extension.
    pub fn select(&self, path: &Path, head: &[u8]) -> Option<Extractor> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.by_extension.get(ext).copied(),
            None => sniff_shebang(head),
        }
    }
}

fn sniff_shebang(head: &[u8]) -> Option<Extractor> {
    let line = head.split(|&b| b == b'\n').next()?;
    let line = std::str::from_utf8(line).ok()?.strip_prefix("#!")?;
    let mut words = line.split_whitespace();
    let mut program = words.next()?.rsplit('/').next()?;
    if program == "env" {
        program = words.find(|w| !w.starts_with('-'))?;
    }
    if program.starts_with("python") {
        Some(Extractor::Python)
    } else if program == "node" || program == "nodejs" {
        Some(Extractor::Script { dialect: Dialect::JavaScript })
    } else if program == "deno" || program == "ts-node" {
        Some(Extractor::Script { dialect: Dialect::TypeScript })
    } else {
        None
    }
}

/// Hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Read, hash and extract one file. The hash is `None` when the file could
/// not be read.
pub fn extract_file(path: &Path, extractor: Extractor) -> (Option<String>, FileExtraction) {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return (None, FileExtraction::Failed { reason: format!("read failed: {e}") });
        }
    };
    let hash = content_hash(&bytes);
    let extraction = match std::str::from_utf8(&bytes) {
        Ok(source) => extractor.extract(source),
        Err(e) => FileExtraction::Failed {
            reason: format!("not valid UTF-8: {e}"),
        },
    };
    (Some(hash), extraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_by_extension() {
        let registry = ExtractorRegistry::new();
        assert_eq!(registry.select(Path::new("a/b.py"), b""), Some(Extractor::Python));
        assert_eq!(
            registry.select(Path::new("ui/App.tsx"), b""),
            Some(Extractor::Script { dialect: Dialect::Tsx })
        );
        assert_eq!(registry.select(Path::new("README.md"), b"#!/usr/bin/env python3"), None);
        assert_eq!(Extractor::Script { dialect: Dialect::Tsx }.language(), Language::TypeScript);
    }

    #[test]
    fn test_select_by_shebang() {
        let registry = ExtractorRegistry::new();
        assert_eq!(
            registry.select(Path::new("bin/tool"), b"#!/usr/bin/env python3\nimport os\n"),
            Some(Extractor::Python)
        );
        assert_eq!(
            registry.select(Path::new("bin/serve"), b"#!/usr/bin/env -S node --harmony\n"),
            Some(Extractor::Script { dialect: Dialect::JavaScript })
        );
        assert_eq!(registry.select(Path::new("bin/run"), b"#!/bin/sh\n"), None);
        assert_eq!(registry.select(Path::new("Makefile"), b"all:\n"), None);
    }

    #[test]
    fn test_invalid_utf8_fails_file_only() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bad.py");
        fs::write(&path, [0x66, 0x6f, 0xff, 0xfe]).unwrap();

        let (hash, extraction) = extract_file(&path, Extractor::Python);
        assert!(hash.is_some());
        assert!(extraction.is_failed());
        assert_eq!(extraction.into_parts(), (Vec::new(), Vec::new()));

        let (hash, extraction) = extract_file(&temp.path().join("missing.py"), Extractor::Python);
        assert!(hash.is_none());
        assert!(extraction.is_failed());
    }

    #[test]
    fn test_syntax_errors_still_parse() {
        let extraction = Extractor::Python.extract("def ok():\n    pass\n\ndef broken(:\n");
        match extraction {
            FileExtraction::Parsed { symbols, .. } => assert!(symbols.iter().any(|s| s.name == "ok")),
            FileExtraction::Failed { reason } => panic!("unexpected failure: {reason}"),
        }
    }
}
