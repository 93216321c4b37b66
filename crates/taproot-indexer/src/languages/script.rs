//! JavaScript and TypeScript extractor

use taproot_core::{ReferenceKind, SymbolKind};
use tree_sitter::Node;

use super::{field_text, named_children, text, unquote, FileOutput, Scope};
use crate::parser_pool::{self, Grammar, ParseError};

const SEP: &str = ".";

/// Which grammar a script file is parsed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    JavaScript,
    TypeScript,
    Tsx,
}

impl Dialect {
    fn grammar(self) -> Grammar {
        match self {
            Dialect::JavaScript => Grammar::JavaScript,
            Dialect::TypeScript => Grammar::TypeScript,
            Dialect::Tsx => Grammar::Tsx,
        }
    }
}

pub struct ScriptExtractor {
    pub dialect: Dialect,
}

impl ScriptExtractor {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn extract(&self, source: &str) -> Result<FileOutput, ParseError> {
        let tree = parser_pool::parse(self.dialect.grammar(), source)?;
        let mut out = FileOutput::default();
        let root = tree.root_node();
        self.walk(root, source.as_bytes(), &Scope::default(), &mut out);
        mark_commonjs_exports(root, source.as_bytes(), &mut out);
        Ok(out)
    }

    fn walk(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        for child in named_children(node) {
            self.visit(child, source, scope, out);
        }
    }

    fn visit(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        match node.kind() {
            "export_statement" => self.walk(node, source, &scope.exporting(), out),
            "function_declaration" | "generator_function_declaration" => {
                self.function(node, source, scope, out, SymbolKind::Function)
            }
            "class_declaration" | "abstract_class_declaration" | "class" => self.class(node, source, scope, out),
            "interface_declaration" => self.interface(node, source, scope, out),
            "type_alias_declaration" => self.simple(node, source, scope, out, SymbolKind::TypeAlias),
            "enum_declaration" => self.simple(node, source, scope, out, SymbolKind::Enum),
            "lexical_declaration" | "variable_declaration" => self.declaration(node, source, scope, out),
            "import_statement" => self.import(node, source, scope, out),
            "call_expression" => {
                if !self.require(node, source, scope, None, out) {
                    if let Some(name) = node
                        .child_by_field_name("function")
                        .and_then(|f| call_target(f, source, scope))
                    {
                        out.reference(scope, node, ReferenceKind::Call { name });
                    }
                }
                self.walk(node, source, scope, out);
            }
            "new_expression" => {
                if let Some(name) = node
                    .child_by_field_name("constructor")
                    .and_then(|c| call_target(c, source, scope))
                {
                    out.reference(scope, node, ReferenceKind::Call { name });
                }
                self.walk(node, source, scope, out);
            }
            "type_annotation" => self.type_refs(node, source, scope, out),
            _ => self.walk(node, source, scope, out),
        }
    }

    fn function(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput, kind: SymbolKind) {
        let Some(name) = field_text(node, "name", source) else {
            return;
        };
        out.symbol(node, name, scope.qualify(name, SEP), kind, source, scope.is_exported());
        self.body(node, source, &scope.enter(name, SEP), out);
    }

    /// Parameters, return type and body of a function-like node.
    fn body(&self, node: Node, source: &[u8], inner: &Scope, out: &mut FileOutput) {
        for field in ["parameters", "return_type", "body"] {
            if let Some(child) = node.child_by_field_name(field) {
                self.visit(child, source, inner, out);
            }
        }
    }

    fn class(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        let Some(name) = field_text(node, "name", source) else {
            self.walk(node, source, scope, out);
            return;
        };
        let exported = scope.is_exported();
        out.symbol(node, name, scope.qualify(name, SEP), SymbolKind::Class, source, exported);
        let inner = scope.enter_type(name, SEP);

        for child in named_children(node) {
            if child.kind() == "class_heritage" {
                self.heritage(child, source, &inner, out);
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.members(body, source, &inner, exported, out);
        }
    }

    fn heritage(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        for clause in named_children(node) {
            match clause.kind() {
                "extends_clause" => {
                    for base in named_children(clause) {
                        if let Some(name) = type_name(base, source) {
                            out.reference(scope, base, ReferenceKind::Inherits { name });
                        }
                    }
                }
                "implements_clause" => {
                    for interface in named_children(clause) {
                        if let Some(name) = type_name(interface, source) {
                            out.reference(scope, interface, ReferenceKind::Implements { name });
                        }
                    }
                }
                // plain JavaScript: `class A extends B`
                _ => {
                    if let Some(name) = type_name(clause, source) {
                        out.reference(scope, clause, ReferenceKind::Inherits { name });
                    }
                }
            }
        }
    }

    fn members(&self, body: Node, source: &[u8], scope: &Scope, exported: bool, out: &mut FileOutput) {
        for member in named_children(body) {
            match member.kind() {
                "method_definition" | "abstract_method_signature" | "method_signature" => {
                    let Some(name) = field_text(member, "name", source) else {
                        continue;
                    };
                    out.symbol(member, name, scope.qualify(name, SEP), SymbolKind::Method, source, exported);
                    self.body(member, source, &scope.enter(name, SEP), out);
                }
                "public_field_definition" | "field_definition" | "property_signature" => {
                    let name = field_text(member, "name", source).or_else(|| field_text(member, "property", source));
                    let Some(name) = name else {
                        continue;
                    };
                    out.symbol(member, name, scope.qualify(name, SEP), SymbolKind::Field, source, exported);
                    let inner = scope.enter(name, SEP);
                    for child in named_children(member) {
                        self.visit(child, source, &inner, out);
                    }
                }
                _ => self.visit(member, source, scope, out),
            }
        }
    }

    fn interface(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        let Some(name) = field_text(node, "name", source) else {
            return;
        };
        let exported = scope.is_exported();
        out.symbol(node, name, scope.qualify(name, SEP), SymbolKind::Interface, source, exported);
        let inner = scope.enter_type(name, SEP);
        for child in named_children(node) {
            match child.kind() {
                "extends_type_clause" => {
                    for base in named_children(child) {
                        if let Some(name) = type_name(base, source) {
                            out.reference(&inner, base, ReferenceKind::Inherits { name });
                        }
                    }
                }
                "interface_body" | "object_type" => self.members(child, source, &inner, exported, out),
                _ => {}
            }
        }
    }

    fn simple(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput, kind: SymbolKind) {
        let Some(name) = field_text(node, "name", source) else {
            return;
        };
        out.symbol(node, name, scope.qualify(name, SEP), kind, source, scope.is_exported());
        let inner = scope.enter(name, SEP);
        for child in named_children(node) {
            self.visit(child, source, &inner, out);
        }
    }

    /// `const a = ...`, `let f = () => ...`, `const { x } = require("m")`
    fn declaration(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        let constant = node.child(0).is_some_and(|k| text(k, source) == "const");
        for declarator in named_children(node) {
            if declarator.kind() != "variable_declarator" {
                self.visit(declarator, source, scope, out);
                continue;
            }
            let (Some(target), value) = (declarator.child_by_field_name("name"), declarator.child_by_field_name("value")) else {
                continue;
            };

            if let Some(value) = value {
                if value.kind() == "call_expression" && self.require(value, source, scope, Some(target), out) {
                    continue;
                }
            }
            if target.kind() != "identifier" {
                for name in pattern_names(target, source) {
                    let kind = if constant { SymbolKind::Constant } else { SymbolKind::Variable };
                    out.symbol(node, name, scope.qualify(name, SEP), kind, source, scope.is_exported());
                }
                if let Some(value) = value {
                    self.visit(value, source, scope, out);
                }
                continue;
            }

            let name = text(target, source);
            let kind = match value.map(|v| v.kind()) {
                Some("arrow_function" | "function_expression" | "function" | "generator_function") => SymbolKind::Function,
                Some("class") => SymbolKind::Class,
                _ if constant => SymbolKind::Constant,
                _ => SymbolKind::Variable,
            };
            out.symbol(node, name, scope.qualify(name, SEP), kind, source, scope.is_exported());

            let inner = match kind {
                SymbolKind::Class => scope.enter_type(name, SEP),
                _ => scope.enter(name, SEP),
            };
            if let Some(annotation) = declarator.child_by_field_name("type") {
                self.type_refs(annotation, source, &inner, out);
            }
            match value {
                Some(v) if kind == SymbolKind::Function => self.body(v, source, &inner, out),
                Some(v) if kind == SymbolKind::Class => {
                    for child in named_children(v) {
                        if child.kind() == "class_heritage" {
                            self.heritage(child, source, &inner, out);
                        }
                    }
                    if let Some(body) = v.child_by_field_name("body") {
                        self.members(body, source, &inner, scope.is_exported(), out);
                    }
                }
                Some(v) => self.visit(v, source, &inner, out),
                None => {}
            }
        }
    }

    /// Record `require("m")`. Returns false when `call` is not a require.
    fn require(&self, call: Node, source: &[u8], scope: &Scope, binding: Option<Node>, out: &mut FileOutput) -> bool {
        let is_require = call
            .child_by_field_name("function")
            .is_some_and(|f| f.kind() == "identifier" && text(f, source) == "require");
        let module = call
            .child_by_field_name("arguments")
            .and_then(|args| named_children(args).into_iter().find(|a| a.kind() == "string"))
            .map(|s| unquote(text(s, source)).to_string());
        let (true, Some(module)) = (is_require, module) else {
            return false;
        };

        let requires = |name: Option<&str>, alias: Option<&str>| ReferenceKind::Requires {
            module: module.clone(),
            name: name.map(str::to_string),
            alias: alias.map(str::to_string),
        };
        match binding {
            Some(target) if target.kind() == "identifier" => {
                out.reference(scope, call, requires(None, Some(text(target, source))));
            }
            Some(target) if target.kind() == "object_pattern" => {
                for property in named_children(target) {
                    match property.kind() {
                        "shorthand_property_identifier_pattern" => {
                            out.reference(scope, call, requires(Some(text(property, source)), None));
                        }
                        "pair_pattern" => {
                            let key = field_text(property, "key", source);
                            let value = field_text(property, "value", source);
                            if let Some(key) = key {
                                out.reference(scope, call, requires(Some(key), value));
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => out.reference(scope, call, requires(None, None)),
        }
        true
    }

    fn import(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        let Some(module) = field_text(node, "source", source).map(|m| unquote(m).to_string()) else {
            return;
        };
        let import = |name: Option<&str>, alias: Option<&str>| ReferenceKind::Import {
            module: module.clone(),
            name: name.map(str::to_string),
            alias: alias.map(str::to_string),
        };

        let Some(clause) = named_children(node).into_iter().find(|c| c.kind() == "import_clause") else {
            // side-effect import
            out.reference(scope, node, import(None, None));
            return;
        };
        for part in named_children(clause) {
            match part.kind() {
                // default import binds the exported symbol of the same name
                "identifier" => out.reference(scope, node, import(Some(text(part, source)), None)),
                "namespace_import" => {
                    let alias = named_children(part).into_iter().find(|c| c.kind() == "identifier");
                    out.reference(scope, node, import(None, alias.map(|a| text(a, source))));
                }
                "named_imports" => {
                    for specifier in named_children(part) {
                        if specifier.kind() != "import_specifier" {
                            continue;
                        }
                        if let Some(name) = field_text(specifier, "name", source) {
                            let alias = field_text(specifier, "alias", source);
                            out.reference(scope, node, import(Some(name), alias));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn type_refs(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FileOutput) {
        match node.kind() {
            "type_identifier" | "nested_type_identifier" => {
                if let Some(name) = type_name(node, source) {
                    out.reference(scope, node, ReferenceKind::TypeRef { name });
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

/// Identifier, type identifier or dotted path naming a type.
fn type_name(node: Node, source: &[u8]) -> Option<String> {
    match node.kind() {
        "identifier" | "type_identifier" | "nested_type_identifier" | "member_expression" => {
            Some(text(node, source).split_whitespace().collect())
        }
        "generic_type" => node.named_child(0).and_then(|n| type_name(n, source)),
        _ => None,
    }
}

/// `a.b.c` as segments when the expression is a plain member chain.
fn dotted<'a>(node: Node, source: &'a [u8]) -> Option<Vec<&'a str>> {
    match node.kind() {
        "identifier" | "this" => Some(vec![text(node, source)]),
        "member_expression" => {
            let mut parts = dotted(node.child_by_field_name("object")?, source)?;
            parts.push(field_text(node, "property", source)?);
            Some(parts)
        }
        _ => None,
    }
}

/// Target name of a call, with `this.` rewritten to the enclosing class.
fn call_target(function: Node, source: &[u8], scope: &Scope) -> Option<String> {
    match dotted(function, source) {
        Some(parts) => {
            let (head, rest) = parts.split_first()?;
            if *head == "this" {
                if rest.is_empty() {
                    return None;
                }
                let rest = rest.join(SEP);
                Some(match scope.enclosing_type() {
                    Some(owner) => format!("{owner}{SEP}{rest}"),
                    None => rest,
                })
            } else {
                Some(parts.join(SEP))
            }
        }
        None if function.kind() == "member_expression" => field_text(function, "property", source).map(str::to_string),
        None => None,
    }
}

/// Names bound by a destructuring pattern.
fn pattern_names<'a>(pattern: Node, source: &'a [u8]) -> Vec<&'a str> {
    let mut names = Vec::new();
    for child in named_children(pattern) {
        match child.kind() {
            "identifier" | "shorthand_property_identifier_pattern" => names.push(text(child, source)),
            "pair_pattern" => {
                if let Some(value) = child.child_by_field_name("value") {
                    if value.kind() == "identifier" {
                        names.push(text(value, source));
                    } else {
                        names.extend(pattern_names(value, source));
                    }
                }
            }
            "object_assignment_pattern" | "assignment_pattern" => {
                if let Some(left) = child.child_by_field_name("left") {
                    if left.kind() == "identifier" || left.kind() == "shorthand_property_identifier_pattern" {
                        names.push(text(left, source));
                    }
                }
            }
            _ => names.extend(pattern_names(child, source)),
        }
    }
    names
}

/// `module.exports = name` and `exports.name = ...` mark symbols exported.
fn mark_commonjs_exports(root: Node, source: &[u8], out: &mut FileOutput) {
    for statement in named_children(root) {
        if statement.kind() != "expression_statement" {
            continue;
        }
        let Some(assignment) = statement.named_child(0).filter(|n| n.kind() == "assignment_expression") else {
            continue;
        };
        let (Some(left), Some(right)) = (
            assignment.child_by_field_name("left"),
            assignment.child_by_field_name("right"),
        ) else {
            continue;
        };
        let left = text(left, source);
        let exported: Vec<&str> = if left == "module.exports" {
            match right.kind() {
                "identifier" => vec![text(right, source)],
                "object" => named_children(right)
                    .into_iter()
                    .filter(|p| p.kind() == "shorthand_property_identifier")
                    .map(|p| text(p, source))
                    .collect(),
                _ => Vec::new(),
            }
        } else if let Some(name) = left.strip_prefix("exports.").or_else(|| left.strip_prefix("module.exports.")) {
            vec![name]
        } else {
            Vec::new()
        };
        for symbol in out.symbols.iter_mut() {
            if exported.contains(&symbol.qualified_name.as_str()) {
                symbol.exported = true;
            }
        }
    }
}
