//! Per-thread tree-sitter parsers.
//!
//! `tree_sitter::Parser` is not `Sync`, so every rayon worker keeps its own
//! parser per grammar in thread-local storage and reuses it across files.

use std::cell::RefCell;
use std::collections::HashMap;

use thiserror::Error;
use tree_sitter::{Language, Parser, Tree};

/// Grammars the extractors parse with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grammar {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Rust,
}

impl Grammar {
    pub fn language(self) -> Language {
        match self {
            Grammar::Python => tree_sitter_python::LANGUAGE.into(),
            Grammar::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Grammar::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Grammar::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Grammar::Rust => tree_sitter_rust::LANGUAGE.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to load {grammar:?} grammar: {reason}")]
    Language { grammar: Grammar, reason: String },

    #[error("parser produced no tree")]
    NoTree,
}

thread_local! {
    static PARSERS: RefCell<HashMap<Grammar, Parser>> = RefCell::new(HashMap::new());
}

/// Parse `source` with this thread's parser for `grammar`.
pub fn parse(grammar: Grammar, source: &str) -> Result<Tree, ParseError> {
    PARSERS.with(|parsers| {
        let mut parsers = parsers.borrow_mut();
        let parser = match parsers.entry(grammar) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let mut parser = Parser::new();
                parser
                    .set_language(&grammar.language())
                    .map_err(|e| ParseError::Language {
                        grammar,
                        reason: e.to_string(),
                    })?;
                tracing::debug!(?grammar, "Parser created for worker thread");
                entry.insert(parser)
            }
        };
        parser.parse(source, None).ok_or(ParseError::NoTree)
    })
}
