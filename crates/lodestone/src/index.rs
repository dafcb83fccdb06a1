//! Project-wide symbol index.
//!
//! Derived state over the dependency graph: built in two passes and rebuilt
//! wholesale whenever the graph changes materially. Pass 1 records every
//! declared symbol as a definition (duplicates across files are kept) and
//! the exported subset per file; pass 2 walks each symbol's dependency list
//! and records a reference for every referenced name, including names with
//! no known definition (externally-defined identifiers still need their
//! referencing files findable).
//!
//! All read paths are total: unknown names yield empty results, never
//! errors.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::graph::DependencyGraph;
use crate::storage::IndexSnapshot;
use crate::types::{SymbolDefinition, SymbolReference};

/// Symbol definitions and references, keyed by name.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    definitions: HashMap<String, Vec<SymbolDefinition>>,
    references: HashMap<String, Vec<SymbolReference>>,
    exports: HashMap<PathBuf, Vec<SymbolDefinition>>,
}

impl SymbolIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from every analysis in the graph.
    ///
    /// Files are visited in sorted path order, so "first definition" is
    /// stable across rebuilds regardless of analysis arrival order.
    #[must_use]
    pub fn build(graph: &DependencyGraph) -> Self {
        let mut index = Self::new();
        let paths = graph.paths();

        // Pass 1: definitions and exports.
        for path in &paths {
            let Some(analysis) = graph.analysis(path) else {
                continue;
            };
            for symbol in &analysis.symbols {
                let definition = SymbolDefinition {
                    name: symbol.name.clone(),
                    kind: symbol.kind,
                    file_path: analysis.path.clone(),
                    line: symbol.line,
                    column: symbol.column,
                    signature: symbol.signature.clone(),
                    is_exported: symbol.is_exported,
                };
                if symbol.is_exported {
                    index
                        .exports
                        .entry(analysis.path.clone())
                        .or_default()
                        .push(definition.clone());
                }
                index
                    .definitions
                    .entry(symbol.name.clone())
                    .or_default()
                    .push(definition);
            }
        }

        // Pass 2: references. Recorded even for names without a local
        // definition, so externally-defined identifiers still resolve to
        // their referencing files.
        for path in &paths {
            let Some(analysis) = graph.analysis(path) else {
                continue;
            };
            for symbol in &analysis.symbols {
                for dep_name in &symbol.dependencies {
                    index
                        .references
                        .entry(dep_name.clone())
                        .or_default()
                        .push(SymbolReference {
                            name: dep_name.clone(),
                            from_file: analysis.path.clone(),
                            from_symbol: symbol.name.clone(),
                            line: symbol.line,
                        });
                }
            }
        }

        tracing::debug!(
            file_count = paths.len(),
            definition_names = index.definitions.len(),
            referenced_names = index.references.len(),
            "symbol index rebuilt"
        );
        index
    }

    /// First known definition for a name.
    ///
    /// When a name is defined in several files, the definition from the
    /// lexicographically smallest path wins. Documented first-match
    /// behavior; callers needing all candidates use [`Self::definitions_of`].
    #[must_use]
    pub fn resolve_definition(&self, name: &str) -> Option<&SymbolDefinition> {
        self.definitions.get(name).and_then(|defs| defs.first())
    }

    /// All definitions sharing a name.
    #[must_use]
    pub fn definitions_of(&self, name: &str) -> &[SymbolDefinition] {
        self.definitions.get(name).map_or(&[], Vec::as_slice)
    }

    /// All recorded references to a name.
    #[must_use]
    pub fn find_references(&self, name: &str) -> &[SymbolReference] {
        self.references.get(name).map_or(&[], Vec::as_slice)
    }

    /// Exported definitions of a file.
    #[must_use]
    pub fn exports_of(&self, path: &Path) -> &[SymbolDefinition] {
        self.exports.get(path).map_or(&[], Vec::as_slice)
    }

    /// Number of distinct definition names whose name contains `token`
    /// (case-insensitive), excluding exact matches.
    #[must_use]
    pub fn fuzzy_matches(&self, token: &str) -> usize {
        let lower = token.to_lowercase();
        self.definitions
            .keys()
            .filter(|name| *name != token && name.to_lowercase().contains(&lower))
            .count()
    }

    /// Number of distinct definition names.
    #[must_use]
    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    /// Serialize the index for persistence.
    #[must_use]
    pub fn snapshot(&self) -> IndexSnapshot {
        let mut definitions: Vec<SymbolDefinition> =
            self.definitions.values().flatten().cloned().collect();
        definitions.sort_by(|a, b| (&a.file_path, a.line).cmp(&(&b.file_path, b.line)));
        let mut references: Vec<SymbolReference> =
            self.references.values().flatten().cloned().collect();
        references.sort_by(|a, b| (&a.from_file, a.line).cmp(&(&b.from_file, b.line)));
        IndexSnapshot {
            definitions,
            references,
        }
    }

    /// Reconstruct an index from a persisted snapshot.
    ///
    /// Only used to warm a fresh session; the first graph rebuild replaces
    /// it wholesale.
    #[must_use]
    pub fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        let mut index = Self::new();
        for definition in snapshot.definitions {
            if definition.is_exported {
                index
                    .exports
                    .entry(definition.file_path.clone())
                    .or_default()
                    .push(definition.clone());
            }
            index
                .definitions
                .entry(definition.name.clone())
                .or_default()
                .push(definition);
        }
        for reference in snapshot.references {
            index
                .references
                .entry(reference.name.clone())
                .or_default()
                .push(reference);
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileAnalysis, Symbol, SymbolKind};
    use std::sync::Arc;

    fn symbol(name: &str, line: u32, exported: bool, deps: &[&str]) -> Symbol {
        Symbol {
            name: name.to_string(),
            kind: SymbolKind::Function,
            line,
            column: 0,
            signature: None,
            documentation: None,
            is_exported: exported,
            dependencies: deps.iter().map(ToString::to_string).collect(),
        }
    }

    fn file(path: &str, symbols: Vec<Symbol>) -> Arc<FileAnalysis> {
        let mut analysis = FileAnalysis::empty(PathBuf::from(path));
        analysis.exports = symbols
            .iter()
            .filter(|s| s.is_exported)
            .map(|s| s.name.clone())
            .collect();
        analysis.symbols = symbols;
        Arc::new(analysis)
    }

    fn sample_graph() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.upsert(file(
            "src/util.ts",
            vec![symbol("formatDate", 1, true, &[])],
        ));
        graph.upsert(file(
            "src/report.ts",
            vec![symbol("buildReport", 3, true, &["formatDate"])],
        ));
        graph
    }

    #[test]
    fn definition_and_reference_are_linked() {
        let index = SymbolIndex::build(&sample_graph());

        let def = index.resolve_definition("formatDate").unwrap();
        assert_eq!(def.file_path, PathBuf::from("src/util.ts"));

        let refs = index.find_references("formatDate");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].from_file, PathBuf::from("src/report.ts"));
        assert_eq!(refs[0].from_symbol, "buildReport");
    }

    #[test]
    fn unknown_names_yield_empty_results() {
        let index = SymbolIndex::build(&sample_graph());

        assert!(index.resolve_definition("nope").is_none());
        assert!(index.find_references("nope").is_empty());
        assert!(index.exports_of(Path::new("missing.ts")).is_empty());
    }

    #[test]
    fn duplicate_names_keep_all_definitions_first_match_stable() {
        let mut graph = DependencyGraph::new();
        // Inserted in reverse path order; build sorts, so a.ts wins.
        graph.upsert(file("src/b.ts", vec![symbol("helper", 9, false, &[])]));
        graph.upsert(file("src/a.ts", vec![symbol("helper", 2, false, &[])]));

        let index = SymbolIndex::build(&graph);
        assert_eq!(index.definitions_of("helper").len(), 2);
        assert_eq!(
            index.resolve_definition("helper").unwrap().file_path,
            PathBuf::from("src/a.ts")
        );
    }

    #[test]
    fn references_to_externally_defined_names_are_recorded() {
        let mut graph = DependencyGraph::new();
        graph.upsert(file(
            "src/a.ts",
            vec![symbol("main", 1, true, &["externalLib"])],
        ));

        let index = SymbolIndex::build(&graph);
        // No definition anywhere, but the referencing file is still findable.
        assert!(index.resolve_definition("externalLib").is_none());
        let refs = index.find_references("externalLib");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].from_file, PathBuf::from("src/a.ts"));
        assert_eq!(refs[0].from_symbol, "main");
    }

    #[test]
    fn exports_of_lists_only_exported() {
        let mut graph = DependencyGraph::new();
        graph.upsert(file(
            "src/a.ts",
            vec![
                symbol("public_api", 1, true, &[]),
                symbol("private_helper", 5, false, &[]),
            ],
        ));

        let index = SymbolIndex::build(&graph);
        let exports = index.exports_of(Path::new("src/a.ts"));
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].name, "public_api");
    }

    #[test]
    fn fuzzy_matches_count_partial_names() {
        let mut graph = DependencyGraph::new();
        graph.upsert(file(
            "src/a.ts",
            vec![
                symbol("parseConfig", 1, true, &[]),
                symbol("parseArgs", 2, true, &[]),
                symbol("render", 3, true, &[]),
            ],
        ));

        let index = SymbolIndex::build(&graph);
        assert_eq!(index.fuzzy_matches("parse"), 2);
        // Exact matches are excluded from the fuzzy count.
        assert_eq!(index.fuzzy_matches("render"), 0);
    }

    #[test]
    fn snapshot_round_trips() {
        let index = SymbolIndex::build(&sample_graph());
        let restored = SymbolIndex::from_snapshot(index.snapshot());

        assert_eq!(restored.definition_count(), index.definition_count());
        assert_eq!(
            restored.resolve_definition("formatDate").map(|d| &d.file_path),
            index.resolve_definition("formatDate").map(|d| &d.file_path)
        );
        assert_eq!(restored.find_references("formatDate").len(), 1);
    }
}
