//! Project-wide symbol table for cross-file resolution

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::{Language, RawReference, Symbol, SymbolDef, SymbolId};

/// Everything Extraction produced for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFile {
    pub path: String,
    pub language: Language,
    pub symbols: Vec<SymbolDef>,
    pub references: Vec<RawReference>,
}

/// Symbol table indexed by qualified name, bare name and owning file.
///
/// Built once per generation from the merged extraction results; ids are
/// assigned here.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_qualified: HashMap<String, Vec<SymbolId>>,
    by_name: HashMap<String, Vec<SymbolId>>,
    /// file path -> symbols ordered by start line
    by_file: BTreeMap<String, Vec<SymbolId>>,
    languages: BTreeMap<String, Language>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble the table, assigning ids in canonical order.
    pub fn build(files: &[ExtractedFile]) -> Self {
        let mut ordered: Vec<&ExtractedFile> = files.iter().collect();
        ordered.sort_by(|a, b| a.path.cmp(&b.path));

        let mut table = SymbolTable::new();
        for file in ordered {
            table.languages.insert(file.path.clone(), file.language);
            table.by_file.entry(file.path.clone()).or_default();

            let mut defs: Vec<&SymbolDef> = file.symbols.iter().collect();
            defs.sort_by(|a, b| {
                (a.start_line, &a.qualified_name, a.kind, a.end_line, &a.name)
                    .cmp(&(b.start_line, &b.qualified_name, b.kind, b.end_line, &b.name))
            });
            for def in defs {
                table.insert(file, def);
            }
        }
        table
    }

    fn insert(&mut self, file: &ExtractedFile, def: &SymbolDef) {
        let id = SymbolId(self.symbols.len() as u32);
        self.by_qualified
            .entry(def.qualified_name.clone())
            .or_default()
            .push(id);
        self.by_name.entry(def.name.clone()).or_default().push(id);
        self.by_file.entry(file.path.clone()).or_default().push(id);
        self.symbols.push(Symbol {
            id,
            name: def.name.clone(),
            qualified_name: def.qualified_name.clone(),
            kind: def.kind,
            file_path: file.path.clone(),
            start_line: def.start_line,
            end_line: def.end_line,
            signature: def.signature.clone(),
            exported: def.exported,
            language: file.language,
        });
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.index())
    }

    /// Look up symbols by fully qualified name.
    pub fn lookup_qualified(&self, qualified_name: &str) -> &[SymbolId] {
        self.by_qualified
            .get(qualified_name)
            .map_or(&[], |ids| ids.as_slice())
    }

    /// Look up symbols by bare name.
    pub fn lookup_name(&self, name: &str) -> &[SymbolId] {
        self.by_name.get(name).map_or(&[], |ids| ids.as_slice())
    }

    /// Get all symbols defined in a file, ordered by start line.
    pub fn symbols_in_file(&self, file_path: &str) -> &[SymbolId] {
        self.by_file.get(file_path).map_or(&[], |ids| ids.as_slice())
    }

    pub fn file_language(&self, file_path: &str) -> Option<Language> {
        self.languages.get(file_path).copied()
    }

    /// All known file paths in sorted order, including files without symbols.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.languages.keys().map(String::as_str)
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn into_symbols(self) -> Vec<Symbol> {
        self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Innermost symbol of `file_path` whose line span contains `line`.
    pub fn innermost_at(&self, file_path: &str, line: u32) -> Option<SymbolId> {
        self.symbols_in_file(file_path)
            .iter()
            .copied()
            .filter(|&id| {
                let sym = &self.symbols[id.index()];
                sym.start_line <= line && line <= sym.end_line
            })
            .max_by_key(|&id| {
                let sym = &self.symbols[id.index()];
                (sym.start_line, std::cmp::Reverse(sym.end_line), std::cmp::Reverse(id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SymbolKind;

    fn def(name: &str, qualified: &str, start: u32, end: u32) -> SymbolDef {
        SymbolDef {
            name: name.to_string(),
            qualified_name: qualified.to_string(),
            kind: SymbolKind::Function,
            start_line: start,
            end_line: end,
            signature: String::new(),
            exported: true,
        }
    }

    #[test]
    fn test_ids_follow_canonical_order() {
        let files = vec![
            ExtractedFile {
                path: "b.py".to_string(),
                language: Language::Python,
                symbols: vec![def("late", "late", 9, 10), def("early", "early", 1, 2)],
                references: vec![],
            },
            ExtractedFile {
                path: "a.py".to_string(),
                language: Language::Python,
                symbols: vec![def("first", "first", 4, 5)],
                references: vec![],
            },
        ];

        let table = SymbolTable::build(&files);
        let names: Vec<_> = table.symbols().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "early", "late"]);
        assert_eq!(table.lookup_name("late"), &[SymbolId(2)]);
        assert_eq!(table.symbols_in_file("b.py"), &[SymbolId(1), SymbolId(2)]);
    }

    #[test]
    fn test_innermost_symbol_wins() {
        let files = vec![ExtractedFile {
            path: "m.py".to_string(),
            language: Language::Python,
            symbols: vec![def("Outer", "Outer", 1, 20), def("inner", "Outer.inner", 5, 8)],
            references: vec![],
        }];
        let table = SymbolTable::build(&files);
        assert_eq!(table.innermost_at("m.py", 6), Some(SymbolId(1)));
        assert_eq!(table.innermost_at("m.py", 12), Some(SymbolId(0)));
        assert_eq!(table.innermost_at("m.py", 30), None);
    }
}
