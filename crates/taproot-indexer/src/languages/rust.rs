//! Rust extractor

use taproot_core::{ReferenceKind, SymbolKind};
use tree_sitter::Node;

use super::{field_text, named_children, text, FileOutput, Scope};
use crate::parser_pool::{self, Grammar, ParseError};

const SEP: &str = "::";

/// Type names from the prelude and primitives; never project symbols.
const BUILTIN_TYPES: &[&str] = &[
    "Self", "String", "Vec", "Option", "Result", "Box", "str", "bool", "char", "u8", "u16", "u32", "u64", "u128",
    "usize", "i8", "i16", "i32", "i64", "i128", "isize", "f32", "f64",
];

pub struct RustExtractor;

impl RustExtractor {
    pub fn extract(&self, source: &str) -> Result<FileOutput, ParseError> {
        let tree = parser_pool::parse(Grammar::Rust, source)?;
        let mut out = FileOutput::default();
        self.walk(tree.root_node(), source.as_bytes(), &Scope::default(), &mut out);
        Ok(out)
    }

    fn walk(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        for child in named_children(node) {
            self.visit(child, source, scope, out);
        }
    }

    fn visit(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        match node.kind() {
            "function_item" | "function_signature_item" => self.function(node, source, scope, out),
            "struct_item" | "union_item" => self.structure(node, source, scope, out),
            "enum_item" => self.item(node, source, scope, out, SymbolKind::Enum),
            "trait_item" => self.trait_item(node, source, scope, out),
            "impl_item" => self.impl_item(node, source, scope, out),
            "mod_item" => self.module(node, source, scope, out),
            "const_item" | "static_item" => self.item(node, source, scope, out, SymbolKind::Constant),
            "type_item" => self.item(node, source, scope, out, SymbolKind::TypeAlias),
            "use_declaration" => {
                if let Some(argument) = node.child_by_field_name("argument") {
                    use_tree(argument, "", source, scope, node, out);
                }
            }
            "call_expression" => {
                if let Some(name) = node
                    .child_by_field_name("function")
                    .and_then(|f| call_target(f, source, scope))
                {
                    out.reference(scope, node, ReferenceKind::Call { name });
                }
                self.walk(node, source, scope, out);
            }
            "struct_expression" => {
                if let Some(name) = node.child_by_field_name("name").and_then(|n| type_name(n, source, scope)) {
                    out.reference(scope, node, ReferenceKind::Call { name });
                }
                self.walk(node, source, scope, out);
            }
            _ => self.walk(node, source, scope, out),
        }
    }

    fn function(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        let Some(name) = field_text(node, "name", source) else {
            return;
        };
        let kind = if scope.enclosing_type().is_some() {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };
        out.symbol(node, name, scope.qualify(name, SEP), kind, source, is_pub(node));

        let inner = scope.enter(name, SEP);
        if let Some(parameters) = node.child_by_field_name("parameters") {
            for parameter in named_children(parameters) {
                if let Some(ty) = parameter.child_by_field_name("type") {
                    self.type_refs(ty, source, &inner, out);
                }
            }
        }
        if let Some(returns) = node.child_by_field_name("return_type") {
            self.type_refs(returns, source, &inner, out);
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body, source, &inner, out);
        }
    }

    fn structure(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        let Some(name) = field_text(node, "name", source) else {
            return;
        };
        out.symbol(node, name, scope.qualify(name, SEP), SymbolKind::Struct, source, is_pub(node));
        let inner = scope.enter_type(name, SEP);
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        for field in named_children(body) {
            match field.kind() {
                "field_declaration" => {
                    let Some(field_name) = field_text(field, "name", source) else {
                        continue;
                    };
                    out.symbol(field, field_name, inner.qualify(field_name, SEP), SymbolKind::Field, source, is_pub(field));
                    if let Some(ty) = field.child_by_field_name("type") {
                        self.type_refs(ty, source, &inner, out);
                    }
                }
                // tuple struct
                _ => self.type_refs(field, source, &inner, out),
            }
        }
    }

    fn item(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput, kind: SymbolKind) {
        let Some(name) = field_text(node, "name", source) else {
            return;
        };
        out.symbol(node, name, scope.qualify(name, SEP), kind, source, is_pub(node));
        let inner = scope.enter(name, SEP);
        if let Some(ty) = node.child_by_field_name("type") {
            self.type_refs(ty, source, &inner, out);
        }
        for field in ["value", "body"] {
            if let Some(child) = node.child_by_field_name(field) {
                self.walk(child, source, &inner, out);
            }
        }
    }

    fn trait_item(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        let Some(name) = field_text(node, "name", source) else {
            return;
        };
        out.symbol(node, name, scope.qualify(name, SEP), SymbolKind::Trait, source, is_pub(node));
        let inner = scope.enter_type(name, SEP);
        if let Some(bounds) = node.child_by_field_name("bounds") {
            for bound in named_children(bounds) {
                if let Some(base) = type_name(bound, source, &inner) {
                    out.reference(&inner, bound, ReferenceKind::Inherits { name: base });
                }
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body, source, &inner, out);
        }
    }

    /// Methods of `impl T` and `impl Trait for T` are qualified under `T`.
    fn impl_item(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        let Some(target) = node.child_by_field_name("type").and_then(|t| base_type(t, source)) else {
            return;
        };
        let inner = scope.enter_type(target, SEP);
        if let Some(name) = node.child_by_field_name("trait").and_then(|t| type_name(t, source, scope)) {
            out.reference(&inner, node, ReferenceKind::Implements { name });
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body, source, &inner, out);
        }
    }

    fn module(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        let Some(name) = field_text(node, "name", source) else {
            return;
        };
        // `mod x;` declares a file module; only inline modules are symbols
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        out.symbol(node, name, scope.qualify(name, SEP), SymbolKind::Module, source, is_pub(node));
        self.walk(body, source, &scope.enter(name, SEP), out);
    }

    fn type_refs(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        match node.kind() {
            "type_identifier" | "scoped_type_identifier" => {
                if let Some(name) = type_name(node, source, scope) {
                    if !BUILTIN_TYPES.contains(&name.as_str()) {
                        out.reference(scope, node, ReferenceKind::TypeRef { name });
                    }
                }
            }
            "generic_type" => {
                if let Some(base) = node.child_by_field_name("type") {
                    self.type_refs(base, source, scope, out);
                }
                if let Some(arguments) = node.child_by_field_name("type_arguments") {
                    self.type_refs(arguments, source, scope, out);
                }
            }
            _ => {
                for child in named_children(node) {
                    self.type_refs(child, source, scope, out);
                }
            }
        }
    }
}

fn is_pub(node: Node) -> bool {
    named_children(node).iter().any(|c| c.kind() == "visibility_modifier")
}

/// Name of the implemented type with generics stripped: `Foo<T>` -> `Foo`.
fn base_type<'a>(node: Node, source: &'a [u8]) -> Option<&'a str> {
    match node.kind() {
        "type_identifier" => Some(text(node, source)),
        "scoped_type_identifier" => field_text(node, "name", source),
        "generic_type" => base_type(node.child_by_field_name("type")?, source),
        "reference_type" => base_type(node.child_by_field_name("type")?, source),
        _ => None,
    }
}

/// Path-like type or trait name, with `Self` rewritten to the enclosing type.
fn type_name(node: Node, source: &[u8], scope: &Scope) -> Option<String> {
    match node.kind() {
        "type_identifier" | "identifier" => {
            let name = text(node, source);
            match (name, scope.enclosing_type()) {
                ("Self", Some(owner)) => Some(owner.to_string()),
                _ => Some(name.to_string()),
            }
        }
        "scoped_type_identifier" | "scoped_identifier" => Some(text(node, source).split_whitespace().collect()),
        "generic_type" => type_name(node.child_by_field_name("type")?, source, scope),
        _ => None,
    }
}

/// Target name of a call: `f`, `a::f`, `Self::f`, `self.f`, `x.f`.
fn call_target(function: Node, source: &[u8], scope: &Scope) -> Option<String> {
    match function.kind() {
        "identifier" => Some(text(function, source).to_string()),
        "scoped_identifier" => {
            let name = field_text(function, "name", source)?;
            let path = function.child_by_field_name("path").map(|p| text(p, source));
            Some(match (path, scope.enclosing_type()) {
                (Some("Self"), Some(owner)) => format!("{owner}{SEP}{name}"),
                (Some(path), _) => format!("{path}{SEP}{name}"),
                (None, _) => name.to_string(),
            })
        }
        "field_expression" => {
            let field = field_text(function, "field", source)?;
            let receiver = function.child_by_field_name("value").map(|v| (v.kind(), text(v, source)));
            Some(match (receiver, scope.enclosing_type()) {
                (Some(("self", _)), Some(owner)) => format!("{owner}{SEP}{field}"),
                (Some(("identifier", receiver)), _) => format!("{receiver}.{field}"),
                _ => field.to_string(),
            })
        }
        "generic_function" => call_target(function.child_by_field_name("function")?, source, scope),
        _ => None,
    }
}

fn join(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{prefix}{SEP}{path}")
    }
}

/// Flatten a `use` tree into one `Import` per bound item.
fn use_tree(node: Node, prefix: &str, source: &[u8], scope: &Scope, statement: Node, out: &mut FileOutput) {
    let mut emit = |module: String, name: Option<&str>, alias: Option<&str>| {
        out.reference(
            scope,
            statement,
            ReferenceKind::Import {
                module,
                name: name.map(str::to_string),
                alias: alias.map(str::to_string),
            },
        );
    };
    match node.kind() {
        "identifier" | "crate" | "super" => {
            let name = text(node, source);
            if prefix.is_empty() {
                emit(name.to_string(), None, None);
            } else {
                emit(prefix.to_string(), Some(name), None);
            }
        }
        // `use a::{self}` binds the module itself
        "self" if !prefix.is_empty() => {
            let last = prefix.rsplit(SEP).next();
            emit(prefix.to_string(), None, last);
        }
        "scoped_identifier" => {
            let Some(name) = field_text(node, "name", source) else {
                return;
            };
            match node.child_by_field_name("path") {
                Some(path) => emit(join(prefix, text(path, source)), Some(name), None),
                None => emit(prefix.to_string(), Some(name), None),
            }
        }
        "use_as_clause" => {
            let (Some(path), Some(alias)) = (node.child_by_field_name("path"), field_text(node, "alias", source)) else {
                return;
            };
            match path.kind() {
                "scoped_identifier" => {
                    let module = path.child_by_field_name("path").map(|p| join(prefix, text(p, source)));
                    if let (Some(module), Some(name)) = (module, field_text(path, "name", source)) {
                        emit(module, Some(name), Some(alias));
                    }
                }
                _ if prefix.is_empty() => emit(text(path, source).to_string(), None, Some(alias)),
                _ => emit(prefix.to_string(), Some(text(path, source)), Some(alias)),
            }
        }
        "scoped_use_list" => {
            let prefix = match node.child_by_field_name("path") {
                Some(path) => join(prefix, text(path, source)),
                None => prefix.to_string(),
            };
            if let Some(list) = node.child_by_field_name("list") {
                use_tree(list, &prefix, source, scope, statement, out);
            }
        }
        "use_list" => {
            for item in named_children(node) {
                use_tree(item, prefix, source, scope, statement, out);
            }
        }
        "use_wildcard" => {
            let path = named_children(node).into_iter().next().map(|p| text(p, source));
            let module = match path {
                Some(path) => join(prefix, path),
                None => prefix.to_string(),
            };
            emit(module, Some("*"), None);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> FileOutput {
        RustExtractor.extract(source).unwrap()
    }

    fn imports(out: &FileOutput) -> Vec<(String, Option<String>, Option<String>)> {
        out.references
            .iter()
            .filter_map(|r| match &r.kind {
                ReferenceKind::Import { module, name, alias } => Some((module.clone(), name.clone(), alias.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_items_and_impl_methods() {
        let out = extract(
            "pub struct Client {\n    pub addr: Addr,\n}\n\nimpl Client {\n    pub fn send(&self) {\n        self.encode();\n        Self::log();\n    }\n    fn encode(&self) {}\n    fn log() {}\n}\n\nimpl Transport for Client {}\n\nmod net {\n    pub fn connect() -> Client { Client { addr: Addr } }\n}\n",
        );

        let symbols: Vec<(&str, SymbolKind, bool)> = out
            .symbols
            .iter()
            .map(|s| (s.qualified_name.as_str(), s.kind, s.exported))
            .collect();
        assert_eq!(
            symbols,
            vec![
                ("Client", SymbolKind::Struct, true),
                ("Client::addr", SymbolKind::Field, true),
                ("Client::send", SymbolKind::Method, true),
                ("Client::encode", SymbolKind::Method, false),
                ("Client::log", SymbolKind::Method, false),
                ("net", SymbolKind::Module, false),
                ("net::connect", SymbolKind::Function, true),
            ]
        );

        let refs: Vec<(Option<&str>, &ReferenceKind)> =
            out.references.iter().map(|r| (r.source.as_deref(), &r.kind)).collect();
        assert!(refs.contains(&(Some("Client::send"), &ReferenceKind::Call { name: "Client::encode".to_string() })));
        assert!(refs.contains(&(Some("Client::send"), &ReferenceKind::Call { name: "Client::log".to_string() })));
        assert!(refs.contains(&(Some("Client"), &ReferenceKind::Implements { name: "Transport".to_string() })));
        assert!(refs.contains(&(Some("Client"), &ReferenceKind::TypeRef { name: "Addr".to_string() })));
        assert!(refs.contains(&(Some("net::connect"), &ReferenceKind::TypeRef { name: "Client".to_string() })));
    }

    #[test]
    fn test_use_trees_flatten() {
        let out = extract("use crate::store::{Store, io::{read as load}};\nuse super::util::*;\nuse serde;\n");
        assert_eq!(
            imports(&out),
            vec![
                ("crate::store".to_string(), Some("Store".to_string()), None),
                ("crate::store::io".to_string(), Some("read".to_string()), Some("load".to_string())),
                ("super::util".to_string(), Some("*".to_string()), None),
                ("serde".to_string(), None, None),
            ]
        );
    }

    #[test]
    fn test_scoped_and_generic_calls() {
        let out = extract("fn run() {\n    store::open();\n    parse::<u8>();\n    client.send();\n}\n");
        let calls: Vec<&str> = out
            .references
            .iter()
            .filter_map(|r| match &r.kind {
                ReferenceKind::Call { name } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(calls, vec!["store::open", "parse", "client.send"]);
    }
}
