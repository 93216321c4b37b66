//! Language extractors for the supported languages.
//!
//! Each extractor walks a tree-sitter tree top-down, threading an explicit
//! [`Scope`] through the recursion instead of looking at parent nodes.

pub mod python;
pub mod rust;
pub mod script;

use taproot_core::{RawReference, ReferenceKind, SymbolDef, SymbolKind};
use tree_sitter::Node;

/// Longest signature kept, in characters.
const MAX_SIGNATURE: usize = 200;

/// Where the walk currently is.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// Qualified-name segments of the enclosing definitions.
    chain: Vec<String>,
    /// Qualified name of the innermost enclosing class, struct or impl target.
    enclosing_type: Option<String>,
    /// Qualified name of the innermost enclosing symbol; references found
    /// here are attributed to it.
    enclosing_symbol: Option<String>,
    /// Inside an export statement.
    exported: bool,
}

impl Scope {
    pub fn qualify(&self, name: &str, separator: &str) -> String {
        if self.chain.is_empty() {
            name.to_string()
        } else {
            format!("{}{separator}{name}", self.chain.join(separator))
        }
    }

    /// Scope for the body of a symbol named `name`.
    pub fn enter(&self, name: &str, separator: &str) -> Scope {
        let qualified = self.qualify(name, separator);
        let mut chain = self.chain.clone();
        chain.push(name.to_string());
        Scope {
            chain,
            enclosing_type: self.enclosing_type.clone(),
            enclosing_symbol: Some(qualified),
            exported: false,
        }
    }

    /// Scope for the body of a type; `self`/`this`/`Self` refer to it.
    pub fn enter_type(&self, name: &str, separator: &str) -> Scope {
        let mut scope = self.enter(name, separator);
        scope.enclosing_type = scope.enclosing_symbol.clone();
        scope
    }

    pub fn exporting(&self) -> Scope {
        Scope {
            exported: true,
            ..self.clone()
        }
    }

    pub fn enclosing_type(&self) -> Option<&str> {
        self.enclosing_type.as_deref()
    }

    pub fn source(&self) -> Option<String> {
        self.enclosing_symbol.clone()
    }

    pub fn is_exported(&self) -> bool {
        self.exported
    }

    pub fn is_top_level(&self) -> bool {
        self.chain.is_empty()
    }
}

/// Symbols and references collected for one file.
#[derive(Debug, Default)]
pub struct FileOutput {
    pub symbols: Vec<SymbolDef>,
    pub references: Vec<RawReference>,
}

impl FileOutput {
    pub fn symbol(&mut self, node: Node, name: &str, qualified_name: String, kind: SymbolKind, source: &[u8], exported: bool) {
        self.symbols.push(SymbolDef {
            name: name.to_string(),
            qualified_name,
            kind,
            start_line: line(node),
            end_line: end_line(node),
            signature: signature(node, source),
            exported,
        });
    }

    pub fn reference(&mut self, scope: &Scope, node: Node, kind: ReferenceKind) {
        self.references.push(RawReference {
            source: scope.source(),
            line: line(node),
            kind,
        });
    }
}

/// 1-based start line.
pub fn line(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

pub fn end_line(node: Node) -> u32 {
    node.end_position().row as u32 + 1
}

pub fn text<'a>(node: Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

pub fn field_text<'a>(node: Node, field: &str, source: &'a [u8]) -> Option<&'a str> {
    node.child_by_field_name(field)
        .map(|n| text(n, source))
        .filter(|t| !t.is_empty())
}

/// Declaration header: text up to the body, collapsed onto one line.
pub fn signature(node: Node, source: &[u8]) -> String {
    let end = node
        .child_by_field_name("body")
        .map_or(node.end_byte(), |body| body.start_byte());
    let header = source
        .get(node.start_byte()..end)
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .unwrap_or("");
    let collapsed = header.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_end_matches([':', '{', ' ']);
    trimmed.chars().take(MAX_SIGNATURE).collect()
}

/// Strip quotes from a string literal.
pub fn unquote(literal: &str) -> &str {
    literal.trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

/// Named children of `node`, in order.
pub fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}
