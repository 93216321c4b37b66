//! Python extractor

use taproot_core::{ReferenceKind, SymbolKind};
use tree_sitter::Node;

use super::{field_text, named_children, text, FileOutput, Scope};
use crate::parser_pool::{self, Grammar, ParseError};

const SEP: &str = ".";

/// Annotation names that never resolve to project symbols.
const BUILTIN_TYPES: &[&str] = &[
    "int", "str", "float", "bool", "bytes", "None", "object", "list", "dict", "set", "tuple", "type", "Any",
    "Optional", "Union", "List", "Dict", "Set", "Tuple", "Callable", "Iterable", "Iterator", "Sequence",
];

pub struct PythonExtractor;

impl PythonExtractor {
    pub fn extract(&self, source: &str) -> Result<FileOutput, ParseError> {
        let tree = parser_pool::parse(Grammar::Python, source)?;
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
            "function_definition" => self.function(node, source, scope, out),
            "class_definition" => self.class(node, source, scope, out),
            "import_statement" => self.import(node, source, scope, out),
            "import_from_statement" => self.import_from(node, source, scope, out),
            "decorator" => {
                for child in named_children(node) {
                    if let Some(name) = call_target(child, source, scope) {
                        out.reference(scope, node, ReferenceKind::Call { name });
                    } else {
                        self.visit(child, source, scope, out);
                    }
                }
            }
            "call" => {
                if let Some(function) = node.child_by_field_name("function") {
                    if let Some(name) = call_target(function, source, scope) {
                        out.reference(scope, node, ReferenceKind::Call { name });
                    }
                }
                self.walk(node, source, scope, out);
            }
            "assignment" => {
                self.assignment(node, source, scope, out);
                self.walk(node, source, scope, out);
            }
            _ => self.walk(node, source, scope, out),
        }
    }

    fn function(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        let Some(name) = field_text(node, "name", source) else {
            return;
        };
        let kind = if in_type_body(scope) {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };
        let exported = is_public(name) && (scope.is_top_level() || in_type_body(scope));
        out.symbol(node, name, scope.qualify(name, SEP), kind, source, exported);

        let inner = scope.enter(name, SEP);
        if let Some(parameters) = node.child_by_field_name("parameters") {
            for parameter in named_children(parameters) {
                if let Some(annotation) = parameter.child_by_field_name("type") {
                    self.type_refs(annotation, source, &inner, out);
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

    fn class(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        let Some(name) = field_text(node, "name", source) else {
            return;
        };
        let exported = is_public(name) && (scope.is_top_level() || in_type_body(scope));
        out.symbol(node, name, scope.qualify(name, SEP), SymbolKind::Class, source, exported);

        let inner = scope.enter_type(name, SEP);
        if let Some(bases) = node.child_by_field_name("superclasses") {
            for base in named_children(bases) {
                // skip keyword arguments such as metaclass=
                if let Some(parts) = dotted(base, source) {
                    out.reference(&inner, base, ReferenceKind::Inherits { name: parts.join(SEP) });
                }
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body, source, &inner, out);
        }
    }

    /// Module-level and class-level `NAME = value` bindings.
    fn assignment(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        let class_body = in_type_body(scope);
        if !scope.is_top_level() && !class_body {
            return;
        }
        let Some(left) = node.child_by_field_name("left") else {
            return;
        };
        if left.kind() != "identifier" {
            return;
        }
        let name = text(left, source);
        let kind = if class_body {
            SymbolKind::Field
        } else if name.len() > 1 && name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_') {
            SymbolKind::Constant
        } else {
            SymbolKind::Variable
        };
        out.symbol(node, name, scope.qualify(name, SEP), kind, source, is_public(name));
        if let Some(annotation) = node.child_by_field_name("type") {
            self.type_refs(annotation, source, scope, out);
        }
    }

    fn type_refs(&self, annotation: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        match annotation.kind() {
            "identifier" | "attribute" => {
                if let Some(parts) = dotted(annotation, source) {
                    let name = parts.join(SEP);
                    if !BUILTIN_TYPES.contains(&name.as_str()) {
                        out.reference(scope, annotation, ReferenceKind::TypeRef { name });
                    }
                }
            }
            _ => {
                for child in named_children(annotation) {
                    self.type_refs(child, source, scope, out);
                }
            }
        }
    }

    /// `import a.b`, `import a.b as c`
    fn import(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        let mut cursor = node.walk();
        for item in node.children_by_field_name("name", &mut cursor) {
            let (module, alias) = match item.kind() {
                "aliased_import" => (
                    field_text(item, "name", source),
                    field_text(item, "alias", source).map(str::to_string),
                ),
                _ => (Some(text(item, source)), None),
            };
            if let Some(module) = module {
                out.reference(
                    scope,
                    node,
                    ReferenceKind::Import {
                        module: module.to_string(),
                        name: None,
                        alias,
                    },
                );
            }
        }
    }

    /// `from m import a, b as c`, `from . import x`, `from m import *`
    fn import_from(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        let Some(module) = field_text(node, "module_name", source) else {
            return;
        };
        let import = |name: &str, alias: Option<String>| ReferenceKind::Import {
            module: module.to_string(),
            name: Some(name.to_string()),
            alias,
        };

        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for item in names {
            match item.kind() {
                "aliased_import" => {
                    if let Some(name) = field_text(item, "name", source) {
                        let alias = field_text(item, "alias", source).map(str::to_string);
                        out.reference(scope, node, import(name, alias));
                    }
                }
                _ => out.reference(scope, node, import(text(item, source), None)),
            }
        }
        if named_children(node).iter().any(|c| c.kind() == "wildcard_import") {
            out.reference(scope, node, import("*", None));
        }
    }
}

fn in_type_body(scope: &Scope) -> bool {
    scope.enclosing_type().is_some() && scope.source().as_deref() == scope.enclosing_type()
}

/// Leading underscore means private; dunder names are part of the protocol.
fn is_public(name: &str) -> bool {
    !name.starts_with('_') || (name.starts_with("__") && name.ends_with("__"))
}

/// `a.b.c` as segments, when the expression is a plain attribute chain.
fn dotted<'a>(node: Node, source: &'a [u8]) -> Option<Vec<&'a str>> {
    match node.kind() {
        "identifier" => Some(vec![text(node, source)]),
        "attribute" => {
            let mut parts = dotted(node.child_by_field_name("object")?, source)?;
            parts.push(field_text(node, "attribute", source)?);
            Some(parts)
        }
        _ => None,
    }
}

/// Target name of a call, with `self.`/`cls.` rewritten to the enclosing class.
fn call_target(function: Node, source: &[u8], scope: &Scope) -> Option<String> {
    match dotted(function, source) {
        Some(parts) => {
            let (head, rest) = parts.split_first()?;
            if matches!(*head, "self" | "cls") && !rest.is_empty() {
                let rest = rest.join(SEP);
                Some(match scope.enclosing_type() {
                    Some(owner) => format!("{owner}{SEP}{rest}"),
                    None => rest,
                })
            } else {
                Some(parts.join(SEP))
            }
        }
        // `make().run()` and friends: only the method name is known
        None if function.kind() == "attribute" => field_text(function, "attribute", source).map(str::to_string),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taproot_core::{RawReference, SymbolDef};

    fn extract(source: &str) -> FileOutput {
        PythonExtractor.extract(source).unwrap()
    }

    fn find<'a>(out: &'a FileOutput, qualified: &str) -> &'a SymbolDef {
        out.symbols.iter().find(|s| s.qualified_name == qualified).unwrap()
    }

    fn calls(out: &FileOutput) -> Vec<(Option<&str>, &str)> {
        out.references
            .iter()
            .filter_map(|r: &RawReference| match &r.kind {
                ReferenceKind::Call { name } => Some((r.source.as_deref(), name.as_str())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_classes_methods_and_self_calls() {
        let out = extract(
            "class Store(Base):\n    def save(self):\n        self.flush()\n\n    def flush(self):\n        pass\n\n\ndef _helper():\n    Store().save()\n",
        );

        assert_eq!(find(&out, "Store").kind, SymbolKind::Class);
        assert_eq!(find(&out, "Store.save").kind, SymbolKind::Method);
        assert_eq!(find(&out, "Store.save").start_line, 2);
        assert!(!find(&out, "_helper").exported);
        assert_eq!(find(&out, "Store.save").signature, "def save(self)");

        let calls = calls(&out);
        assert!(calls.contains(&(Some("Store.save"), "Store.flush")));
        assert!(calls.contains(&(Some("_helper"), "Store")));
        assert!(calls.contains(&(Some("_helper"), "save")));

        assert!(out.references.iter().any(|r| r.kind
            == ReferenceKind::Inherits {
                name: "Base".to_string()
            }
            && r.source.as_deref() == Some("Store")));
    }

    #[test]
    fn test_imports() {
        let out = extract("import os.path as p\nfrom .models import User, Group as G\nfrom pkg import *\n");
        let imports: Vec<&ReferenceKind> = out.references.iter().map(|r| &r.kind).collect();

        assert_eq!(
            imports[0],
            &ReferenceKind::Import {
                module: "os.path".to_string(),
                name: None,
                alias: Some("p".to_string())
            }
        );
        assert_eq!(
            imports[2],
            &ReferenceKind::Import {
                module: ".models".to_string(),
                name: Some("Group".to_string()),
                alias: Some("G".to_string())
            }
        );
        assert_eq!(
            imports[3],
            &ReferenceKind::Import {
                module: "pkg".to_string(),
                name: Some("*".to_string()),
                alias: None
            }
        );
        assert!(out.references.iter().all(|r| r.source.is_none()));
    }

    #[test]
    fn test_module_level_bindings_and_annotations() {
        let out = extract("MAX_SIZE = 10\nregistry = {}\n\ndef load(path: Path) -> Config:\n    return Config()\n");
        assert_eq!(find(&out, "MAX_SIZE").kind, SymbolKind::Constant);
        assert_eq!(find(&out, "registry").kind, SymbolKind::Variable);

        let types: Vec<&str> = out
            .references
            .iter()
            .filter_map(|r| match &r.kind {
                ReferenceKind::TypeRef { name } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(types, vec!["Path", "Config"]);
    }
}
