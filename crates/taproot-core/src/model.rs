//! Core data structures for the symbol graph

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a symbol within one generation.
///
/// Ids are dense and assigned in canonical order (file path, start line,
/// qualified name, kind) every time a generation's symbol table is assembled,
/// so a full rebuild and an incremental run over the same tree agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonically increasing index-build counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

/// Discriminates what kind of code entity a symbol represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Module,
    Class,
    Struct,
    Enum,
    Interface,
    Trait,
    Function,
    Method,
    Field,
    Variable,
    Constant,
    TypeAlias,
}

impl SymbolKind {
    /// Type-like kinds anchor community labels.
    pub fn is_anchor(self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Struct
                | SymbolKind::Enum
                | SymbolKind::Interface
                | SymbolKind::Trait
                | SymbolKind::Module
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Module => "module",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::Interface => "interface",
            SymbolKind::Trait => "trait",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Field => "field",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::TypeAlias => "type_alias",
        }
    }
}

/// Languages with a symbol extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Rust,
    TypeScript,
    JavaScript,
    Python,
}

impl Language {
    /// Detect language from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("rs") => Some(Language::Rust),
            Some("ts") | Some("tsx") | Some("mts") | Some("cts") => Some(Language::TypeScript),
            Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Some(Language::JavaScript),
            Some("py") | Some("pyi") => Some(Language::Python),
            _ => None,
        }
    }

    /// Languages in the same family may reference each other's symbols.
    pub fn family(self) -> LanguageFamily {
        match self {
            Language::Rust => LanguageFamily::Rust,
            Language::TypeScript | Language::JavaScript => LanguageFamily::Script,
            Language::Python => LanguageFamily::Python,
        }
    }

    /// Separator the language uses between scope segments.
    pub fn scope_separator(self) -> &'static str {
        match self {
            Language::Rust => "::",
            _ => ".",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Python => "python",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageFamily {
    Rust,
    Script,
    Python,
}

/// One indexed file. Identity is the project-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Project-relative path with `/` separators.
    pub path: String,
    pub language: Language,
    /// Hex SHA-256 of the file contents.
    pub hash: String,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime: i64,
    /// Generation in which this file was last extracted.
    pub generation: Generation,
}

/// A symbol as produced by an extractor, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDef {
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub start_line: u32,
    pub end_line: u32,
    pub signature: String,
    pub exported: bool,
}

/// A symbol in a committed generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub signature: String,
    pub exported: bool,
    pub language: Language,
}

impl Symbol {
    /// Directory part of the owning file's path (`""` for the project root).
    pub fn directory(&self) -> &str {
        directory_of(&self.file_path)
    }
}

/// Directory part of a project-relative path.
pub fn directory_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// What a raw reference points at. Each kind carries exactly what it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceKind {
    /// A call or instantiation; `name` may be bare or qualified.
    Call { name: String },
    /// `module` is the import path as written. `name` is `None` for
    /// whole-module imports; `alias` is the local binding when renamed.
    Import {
        module: String,
        name: Option<String>,
        alias: Option<String>,
    },
    Inherits { name: String },
    Implements { name: String },
    TypeRef { name: String },
    /// A CommonJS `require`. `name` is set for destructured bindings.
    Requires {
        module: String,
        name: Option<String>,
        alias: Option<String>,
    },
}

impl ReferenceKind {
    pub fn edge_kind(&self) -> EdgeKind {
        match self {
            ReferenceKind::Call { .. } => EdgeKind::Call,
            ReferenceKind::Import { .. } => EdgeKind::Import,
            ReferenceKind::Inherits { .. } => EdgeKind::Inherits,
            ReferenceKind::Implements { .. } => EdgeKind::Implements,
            ReferenceKind::TypeRef { .. } => EdgeKind::TypeReference,
            ReferenceKind::Requires { .. } => EdgeKind::Requires,
        }
    }
}

/// An unresolved reference produced by an extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReference {
    /// Qualified name of the originating symbol; `None` at module level.
    pub source: Option<String>,
    pub line: u32,
    pub kind: ReferenceKind,
}

/// What kind of relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Call,
    Import,
    Inherits,
    Implements,
    TypeReference,
    Requires,
}

impl EdgeKind {
    /// Traversal cost used by path finding; runtime dependencies are cheapest.
    pub fn path_cost(self) -> f64 {
        match self {
            EdgeKind::Call | EdgeKind::Inherits | EdgeKind::Implements => 1.0,
            EdgeKind::Import | EdgeKind::Requires => 1.1,
            EdgeKind::TypeReference => 1.5,
        }
    }

    /// Coupling weight used when classifying path strength.
    pub fn coupling_weight(self) -> f64 {
        match self {
            EdgeKind::Call | EdgeKind::Inherits | EdgeKind::Implements => 1.0,
            EdgeKind::Import | EdgeKind::Requires | EdgeKind::TypeReference => 0.5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Call => "call",
            EdgeKind::Import => "import",
            EdgeKind::Inherits => "inherits",
            EdgeKind::Implements => "implements",
            EdgeKind::TypeReference => "type_reference",
            EdgeKind::Requires => "requires",
        }
    }
}

/// A resolved, directed edge between two symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: SymbolId,
    pub target: SymbolId,
    pub kind: EdgeKind,
    /// Set when the reference matched several equally-ranked candidates.
    pub ambiguous: bool,
}

/// File-level rollup of symbol edges.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileEdge {
    pub source_file: String,
    pub target_file: String,
    pub symbol_edge_count: u32,
}

/// Derived per-symbol metrics. A `None` column means that metric was omitted
/// for this generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMetrics {
    pub symbol_id: SymbolId,
    pub pagerank: Option<f64>,
    pub betweenness: Option<f64>,
    pub scc_id: Option<u32>,
    pub community_id: Option<u32>,
    pub layer: Option<u32>,
    pub fan_in: u32,
    pub fan_out: u32,
}

/// Bookkeeping row for the committed generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexState {
    pub generation: Generation,
    pub built_at: DateTime<Utc>,
    /// Pid of the process that held the index lock while building.
    pub lock_owner: Option<u32>,
}
