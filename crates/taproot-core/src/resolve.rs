//! Reference resolution: turns raw references into symbol edges.
//!
//! Matching runs in four tiers and the first tier with a candidate wins:
//!
//! 1. exact qualified-name match, narrowed by import binding then proximity
//! 2. import-path resolution through the file's import bindings
//! 3. bare-name match in the same file or directory, or a unique project-wide one
//! 4. every project-wide bare-name candidate, each edge flagged ambiguous
//!
//! Candidates are always restricted to the referencing file's language family.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{
    directory_of, Edge, EdgeKind, Language, LanguageFamily, RawReference, ReferenceKind, Symbol,
    SymbolId,
};
use crate::symbols::{ExtractedFile, SymbolTable};

/// Re-export chains longer than this are treated as unresolved.
const MAX_BINDING_DEPTH: usize = 6;

/// Which matching tier produced an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Qualified = 0,
    ImportPath = 1,
    Proximate = 2,
    Fallback = 3,
}

/// Coverage statistics for one resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub references: usize,
    pub resolved: usize,
    /// References that matched more than one equally-ranked candidate.
    pub ambiguous_references: usize,
    /// Edges carrying the ambiguous flag after deduplication.
    pub ambiguous_edges: usize,
    /// References with no candidate at any tier, external ones included.
    pub unresolved: usize,
    /// Unresolved references bound to a module outside the project.
    pub external: usize,
    /// Whole-module imports and references to a module itself.
    pub module_references: usize,
    /// Resolved references in files that define no symbol to attribute them to.
    pub sourceless: usize,
    pub by_tier: [usize; 4],
}

impl ResolutionStats {
    /// Fraction of symbol-targeted references that produced an edge.
    pub fn coverage(&self) -> f64 {
        let attempted = self.resolved + self.unresolved;
        if attempted == 0 {
            1.0
        } else {
            self.resolved as f64 / attempted as f64
        }
    }
}

/// Output of a resolution pass: the deduplicated, sorted edge set.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub edges: Vec<Edge>,
    pub stats: ResolutionStats,
}

/// What a local name in a file is bound to by an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// `from m import name`, `import { name } from "m"`, `use m::name`
    Item { module: String, name: String },
    /// `import m`, `import * as m from "m"`, `const m = require("m")`
    Module { module: String },
}

impl Binding {
    fn module(&self) -> &str {
        match self {
            Binding::Item { module, .. } | Binding::Module { module } => module,
        }
    }
}

/// Local name -> binding, for one file.
pub type FileBindings = HashMap<String, Binding>;

/// Build the import-alias map of one file. The first binding of a name wins.
pub fn collect_bindings(file: &ExtractedFile) -> FileBindings {
    let mut bindings = FileBindings::new();
    for reference in &file.references {
        let (module, name, alias) = match &reference.kind {
            ReferenceKind::Import { module, name, alias }
            | ReferenceKind::Requires { module, name, alias } => (module, name, alias),
            _ => continue,
        };
        match name.as_deref() {
            Some("*") => {}
            Some(name) => {
                let local = alias.clone().unwrap_or_else(|| name.to_string());
                bindings.entry(local).or_insert_with(|| Binding::Item {
                    module: module.clone(),
                    name: name.to_string(),
                });
            }
            None => {
                let (local, bound) = match (alias, file.language.family()) {
                    (Some(alias), _) => (alias.clone(), module.clone()),
                    // `import a.b` binds `a`
                    (None, LanguageFamily::Python) if !module.starts_with('.') => {
                        let head = module.split('.').next().unwrap_or(module).to_string();
                        (head.clone(), head)
                    }
                    _ => continue,
                };
                bindings
                    .entry(local)
                    .or_insert(Binding::Module { module: bound });
            }
        }
    }
    bindings
}

/// Maps module paths as written in source onto project files.
#[derive(Debug, Default)]
pub struct ModuleIndex {
    /// extension-less path (and package directory) -> files
    stems: BTreeMap<String, Vec<String>>,
    /// every `/`-suffix of every stem -> files
    suffixes: HashMap<String, Vec<String>>,
    files: BTreeSet<String>,
}

enum ModuleKey {
    Anchored(String),
    Suffix(String),
}

impl ModuleIndex {
    pub fn new<'a>(paths: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index = ModuleIndex::default();
        for path in paths {
            index.files.insert(path.to_string());
            let stem = strip_extension(path);
            index.add(stem, path);

            let base = stem.rsplit('/').next().unwrap_or(stem);
            let is_package = matches!(base, "__init__" | "index" | "mod")
                || (path.ends_with(".rs") && matches!(base, "lib" | "main"));
            if is_package {
                index.add(directory_of(path), path);
            }
        }
        for files in index.stems.values_mut() {
            files.sort();
            files.dedup();
        }
        for files in index.suffixes.values_mut() {
            files.sort();
            files.dedup();
        }
        index
    }

    fn add(&mut self, stem: &str, path: &str) {
        self.stems
            .entry(stem.to_string())
            .or_default()
            .push(path.to_string());
        let mut rest = stem;
        loop {
            self.suffixes
                .entry(rest.to_string())
                .or_default()
                .push(path.to_string());
            match rest.split_once('/') {
                Some((_, tail)) => rest = tail,
                None => break,
            }
        }
    }

    /// Resolve `module`, as written in `from`, to project files of the same
    /// language family. An empty result means the module is external.
    pub fn resolve(&self, from: &str, language: Language, module: &str) -> Vec<String> {
        let key = match language.family() {
            LanguageFamily::Python => python_key(from, module),
            LanguageFamily::Script => script_key(from, module),
            LanguageFamily::Rust => self.rust_key(from, module),
        };
        let found = match key {
            Some(ModuleKey::Anchored(key)) => self.stems.get(&key),
            Some(ModuleKey::Suffix(key)) if !key.is_empty() => self.suffixes.get(&key),
            _ => None,
        };
        let family = language.family();
        found
            .map(|files| {
                files
                    .iter()
                    .filter(|f| {
                        Language::from_path(std::path::Path::new(f.as_str()))
                            .is_some_and(|l| l.family() == family)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn rust_key(&self, from: &str, module: &str) -> Option<ModuleKey> {
        let segments: Vec<&str> = module.split("::").filter(|s| !s.is_empty()).collect();
        let (first, rest) = segments.split_first()?;
        match *first {
            "crate" => match self.crate_root(from) {
                Some(root) => Some(ModuleKey::Anchored(join_path(&root, &rest.join("/")))),
                None => Some(ModuleKey::Suffix(rest.join("/"))),
            },
            "self" | "super" => {
                let mut base: Vec<&str> = rust_module_path(from)
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .collect();
                let mut tail = segments.as_slice();
                if tail.first() == Some(&"self") {
                    tail = &tail[1..];
                }
                while tail.first() == Some(&"super") {
                    base.pop()?;
                    tail = &tail[1..];
                }
                Some(ModuleKey::Anchored(join_path(&base.join("/"), &tail.join("/"))))
            }
            "std" | "core" | "alloc" => None,
            _ => Some(ModuleKey::Suffix(segments.join("/"))),
        }
    }

    /// Nearest ancestor directory holding `lib.rs` or `main.rs`.
    fn crate_root(&self, from: &str) -> Option<String> {
        let mut dir = directory_of(from);
        loop {
            let lib = join_path(dir, "lib.rs");
            let main = join_path(dir, "main.rs");
            if self.files.contains(&lib) || self.files.contains(&main) {
                return Some(dir.to_string());
            }
            if dir.is_empty() {
                return None;
            }
            dir = directory_of(dir);
        }
    }
}

fn python_key(from: &str, module: &str) -> Option<ModuleKey> {
    let dots = module.chars().take_while(|&c| c == '.').count();
    let rest = module[dots..].replace('.', "/");
    if dots == 0 {
        return Some(ModuleKey::Suffix(rest));
    }
    let mut dir: Vec<&str> = directory_of(from)
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    for _ in 1..dots {
        dir.pop()?;
    }
    Some(ModuleKey::Anchored(join_path(&dir.join("/"), &rest)))
}

fn script_key(from: &str, module: &str) -> Option<ModuleKey> {
    if module.starts_with("./") || module.starts_with("../") || module == "." || module == ".." {
        let joined = join_path(directory_of(from), module);
        let normalized = normalize_path(&joined)?;
        return Some(ModuleKey::Anchored(strip_script_extension(&normalized).to_string()));
    }
    if let Some(rest) = module.strip_prefix("@/").or_else(|| module.strip_prefix("~/")) {
        return Some(ModuleKey::Suffix(strip_script_extension(rest).to_string()));
    }
    if let Some(rest) = module.strip_prefix('/') {
        return Some(ModuleKey::Anchored(strip_script_extension(rest).to_string()));
    }
    // bare specifiers name packages
    None
}

/// Module path of a Rust file: `src/a/mod.rs` and `src/a.rs` are both `src/a`.
fn rust_module_path(path: &str) -> &str {
    let stem = strip_extension(path);
    match stem.rsplit('/').next() {
        Some("mod" | "lib" | "main") => directory_of(path),
        _ => stem,
    }
}

fn strip_extension(path: &str) -> &str {
    match path.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') && !stem.is_empty() && !stem.ends_with('/') => stem,
        _ => path,
    }
}

fn strip_script_extension(path: &str) -> &str {
    for ext in [".ts", ".tsx", ".mts", ".cts", ".js", ".jsx", ".mjs", ".cjs"] {
        if let Some(stem) = path.strip_suffix(ext) {
            return stem;
        }
    }
    path
}

fn join_path(dir: &str, rest: &str) -> String {
    match (dir.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => dir.to_string(),
        _ => format!("{dir}/{rest}"),
    }
}

/// Collapse `.` and `..` segments; `None` when the path escapes the root.
fn normalize_path(path: &str) -> Option<String> {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop()?;
            }
            s => out.push(s),
        }
    }
    Some(out.join("/"))
}

fn submodule_path(language: Language, module: &str, name: &str) -> String {
    match language.family() {
        LanguageFamily::Script if module.ends_with('/') => format!("{module}{name}"),
        LanguageFamily::Script => format!("{module}/{name}"),
        LanguageFamily::Python if module.ends_with('.') => format!("{module}{name}"),
        LanguageFamily::Python => format!("{module}.{name}"),
        LanguageFamily::Rust => format!("{module}::{name}"),
    }
}

enum Outcome {
    Matched { tier: Tier, targets: Vec<SymbolId> },
    Module,
    External,
    Unresolved,
}

enum Bound {
    Symbols(Vec<SymbolId>),
    Module,
    External,
    Missing,
}

/// Resolves every reference of a generation against its symbol table.
pub struct Resolver<'a> {
    table: &'a SymbolTable,
    modules: ModuleIndex,
    bindings: HashMap<&'a str, FileBindings>,
}

impl<'a> Resolver<'a> {
    pub fn new(table: &'a SymbolTable, files: &'a [ExtractedFile]) -> Self {
        let bindings = files
            .iter()
            .map(|f| (f.path.as_str(), collect_bindings(f)))
            .collect();
        Resolver {
            table,
            modules: ModuleIndex::new(table.files()),
            bindings,
        }
    }

    /// Resolve all references of `files`, in path order, into edges.
    pub fn resolve_all(&self, files: &[ExtractedFile]) -> Resolution {
        let mut ordered: Vec<&ExtractedFile> = files.iter().collect();
        ordered.sort_by(|a, b| a.path.cmp(&b.path));

        let mut stats = ResolutionStats::default();
        let mut edges: BTreeMap<(SymbolId, SymbolId, EdgeKind), bool> = BTreeMap::new();

        for file in ordered {
            for reference in &file.references {
                stats.references += 1;
                let (tier, targets) = match self.resolve_reference(file, reference) {
                    Outcome::Matched { tier, targets } => (tier, targets),
                    Outcome::Module => {
                        stats.module_references += 1;
                        continue;
                    }
                    Outcome::External => {
                        stats.external += 1;
                        stats.unresolved += 1;
                        continue;
                    }
                    Outcome::Unresolved => {
                        stats.unresolved += 1;
                        continue;
                    }
                };
                let Some(source) = self.attribute(file, reference) else {
                    stats.sourceless += 1;
                    continue;
                };

                stats.resolved += 1;
                stats.by_tier[tier as usize] += 1;
                let ambiguous = targets.len() > 1;
                if ambiguous {
                    stats.ambiguous_references += 1;
                }
                let kind = reference.kind.edge_kind();
                for target in targets {
                    let flag = edges.entry((source, target, kind)).or_insert(ambiguous);
                    *flag = *flag && ambiguous;
                }
            }
        }

        let edges: Vec<Edge> = edges
            .into_iter()
            .map(|((source, target, kind), ambiguous)| Edge {
                source,
                target,
                kind,
                ambiguous,
            })
            .collect();
        stats.ambiguous_edges = edges.iter().filter(|e| e.ambiguous).count();

        debug!(
            references = stats.references,
            resolved = stats.resolved,
            unresolved = stats.unresolved,
            ambiguous = stats.ambiguous_references,
            "Resolution pass complete"
        );
        Resolution { edges, stats }
    }

    fn resolve_reference(&self, file: &ExtractedFile, reference: &RawReference) -> Outcome {
        let (target, explicit) = match &reference.kind {
            ReferenceKind::Call { name }
            | ReferenceKind::Inherits { name }
            | ReferenceKind::Implements { name }
            | ReferenceKind::TypeRef { name } => (name.as_str(), None),
            ReferenceKind::Import {
                module,
                name: Some(name),
                ..
            }
            | ReferenceKind::Requires {
                module,
                name: Some(name),
                ..
            } if name != "*" => (
                name.as_str(),
                Some(Binding::Item {
                    module: module.clone(),
                    name: name.clone(),
                }),
            ),
            _ => return Outcome::Module,
        };

        let language = file.language;
        let family = language.family();
        let segments: Vec<&str> = target
            .split(language.scope_separator())
            .filter(|s| !s.is_empty())
            .collect();
        let Some((&head, tail)) = segments.split_first() else {
            return Outcome::Unresolved;
        };
        let (binding, rest) = match explicit {
            Some(binding) => (Some(binding), &[][..]),
            None => (self.binding_for(file, head), tail),
        };

        // Tier 1
        let qualified = self.in_family(self.table.lookup_qualified(target), family);
        if qualified.len() == 1 {
            return Outcome::Matched {
                tier: Tier::Qualified,
                targets: qualified,
            };
        }
        if !qualified.is_empty() {
            let scoped: Vec<SymbolId> = match &binding {
                Some(binding) => {
                    let files = self.modules.resolve(&file.path, language, binding.module());
                    qualified
                        .iter()
                        .copied()
                        .filter(|&id| self.symbol_file(id).is_some_and(|f| files.iter().any(|x| x == f)))
                        .collect()
                }
                None => Vec::new(),
            };
            let pool = if scoped.is_empty() { qualified } else { scoped };
            return Outcome::Matched {
                tier: Tier::Qualified,
                targets: self.nearest(&file.path, pool),
            };
        }

        // Tier 2
        if let Some(binding) = &binding {
            return match self.follow(&file.path, language, binding, rest, 0) {
                Bound::Symbols(targets) => Outcome::Matched {
                    tier: Tier::ImportPath,
                    targets,
                },
                Bound::Module => Outcome::Module,
                Bound::External => Outcome::External,
                Bound::Missing => Outcome::Unresolved,
            };
        }

        // Tiers 3 and 4
        let bare = segments.last().copied().unwrap_or(head);
        let candidates = self.in_family(self.table.lookup_name(bare), family);
        if candidates.is_empty() {
            return Outcome::Unresolved;
        }
        let best = candidates
            .iter()
            .map(|&id| self.proximity(&file.path, id))
            .min()
            .unwrap_or(Proximity::Elsewhere);
        let group = self.nearest(&file.path, candidates);
        let tier = if best < Proximity::Elsewhere || group.len() == 1 {
            Tier::Proximate
        } else {
            Tier::Fallback
        };
        Outcome::Matched {
            tier,
            targets: group,
        }
    }

    fn binding_for(&self, file: &ExtractedFile, head: &str) -> Option<Binding> {
        if let Some(binding) = self.bindings.get(file.path.as_str()).and_then(|b| b.get(head)) {
            return Some(binding.clone());
        }
        match (file.language, head) {
            (Language::Rust, "crate" | "self" | "super") => Some(Binding::Module {
                module: head.to_string(),
            }),
            _ => None,
        }
    }

    fn follow(&self, from: &str, language: Language, binding: &Binding, rest: &[&str], depth: usize) -> Bound {
        if depth > MAX_BINDING_DEPTH {
            return Bound::Missing;
        }
        let files = self.modules.resolve(from, language, binding.module());
        if files.is_empty() {
            return Bound::External;
        }
        match binding {
            Binding::Module { module } => match rest.split_first() {
                None => Bound::Module,
                Some((name, tail)) => self.follow_item(from, language, module, &files, name, tail, depth),
            },
            Binding::Item { module, name } => {
                self.follow_item(from, language, module, &files, name, rest, depth)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn follow_item(
        &self,
        from: &str,
        language: Language,
        module: &str,
        files: &[String],
        name: &str,
        rest: &[&str],
        depth: usize,
    ) -> Bound {
        let sep = language.scope_separator();
        let mut qualified = name.to_string();
        for segment in rest {
            qualified.push_str(sep);
            qualified.push_str(segment);
        }

        let mut hits: Vec<SymbolId> = self
            .symbols_of(files)
            .filter(|s| s.qualified_name == qualified)
            .map(|s| s.id)
            .collect();
        if hits.is_empty() && rest.is_empty() {
            hits = self
                .symbols_of(files)
                .filter(|s| s.exported && s.name == name)
                .map(|s| s.id)
                .collect();
        }
        if !hits.is_empty() {
            hits.sort();
            return Bound::Symbols(hits);
        }

        // re-exported from another module
        for file in files {
            let Some(next) = self.bindings.get(file.as_str()).and_then(|b| b.get(name)) else {
                continue;
            };
            let next_language = self.table.file_language(file).unwrap_or(language);
            match self.follow(file, next_language, next, rest, depth + 1) {
                found @ (Bound::Symbols(_) | Bound::Module) => return found,
                _ => {}
            }
        }

        // submodule of the bound module
        let submodule = Binding::Module {
            module: submodule_path(language, module, name),
        };
        match self.follow(from, language, &submodule, rest, depth + 1) {
            Bound::External => Bound::Missing,
            found => found,
        }
    }

    fn symbols_of<'s>(&'s self, files: &'s [String]) -> impl Iterator<Item = &'s Symbol> + 's {
        files
            .iter()
            .flat_map(move |f| self.table.symbols_in_file(f).iter())
            .filter_map(move |&id| self.table.get(id))
    }

    fn attribute(&self, file: &ExtractedFile, reference: &RawReference) -> Option<SymbolId> {
        let ids = self.table.symbols_in_file(&file.path);
        if let Some(source) = &reference.source {
            let named: Vec<SymbolId> = ids
                .iter()
                .copied()
                .filter(|&id| self.table.get(id).is_some_and(|s| &s.qualified_name == source))
                .collect();
            let containing = named.iter().copied().find(|&id| {
                self.table
                    .get(id)
                    .is_some_and(|s| s.start_line <= reference.line && reference.line <= s.end_line)
            });
            if let Some(id) = containing.or_else(|| named.first().copied()) {
                return Some(id);
            }
        }
        self.table
            .innermost_at(&file.path, reference.line)
            .or_else(|| ids.first().copied())
    }

    fn in_family(&self, ids: &[SymbolId], family: LanguageFamily) -> Vec<SymbolId> {
        ids.iter()
            .copied()
            .filter(|&id| self.table.get(id).is_some_and(|s| s.language.family() == family))
            .collect()
    }

    fn symbol_file(&self, id: SymbolId) -> Option<&str> {
        self.table.get(id).map(|s| s.file_path.as_str())
    }

    fn proximity(&self, from: &str, id: SymbolId) -> Proximity {
        match self.symbol_file(id) {
            Some(path) if path == from => Proximity::SameFile,
            Some(path) if directory_of(path) == directory_of(from) => Proximity::SameDirectory,
            _ => Proximity::Elsewhere,
        }
    }

    /// Keep only the best-ranked candidates, sorted by id.
    fn nearest(&self, from: &str, mut ids: Vec<SymbolId>) -> Vec<SymbolId> {
        let Some(best) = ids.iter().map(|&id| self.proximity(from, id)).min() else {
            return ids;
        };
        ids.retain(|&id| self.proximity(from, id) == best);
        ids.sort();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Proximity {
    SameFile,
    SameDirectory,
    Elsewhere,
}

/// Resolve a generation's references into edges.
pub fn resolve(table: &SymbolTable, files: &[ExtractedFile]) -> Resolution {
    Resolver::new(table, files).resolve_all(files)
}
