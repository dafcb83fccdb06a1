//! File parsing collaborator.
//!
//! The engine never parses source itself; it delegates to a [`FileParser`]
//! injected by the host. The contract is **fail-closed**: a parser asked
//! about a file type it does not understand returns an empty-but-valid
//! [`FileAnalysis`] (no symbols, no edges) rather than an error, so unknown
//! files participate normally in the cache and graph without poisoning
//! either.
//!
//! [`HeuristicParser`] is the bundled bootstrap implementation: a
//! line-scanning symbol extractor for TypeScript/JavaScript, Python, Rust,
//! and Go. It trades precision for zero native dependencies; hosts with a
//! real AST parser plug it in through the same trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::Result;
use crate::types::{FileAnalysis, Symbol, SymbolKind};

/// Parses file content into a [`FileAnalysis`].
///
/// Implementations must be fail-closed: unsupported file types yield
/// `FileAnalysis::empty`, and `Err` is reserved for files the parser claims
/// to support but cannot process.
#[async_trait]
pub trait FileParser: Send + Sync {
    /// Parse `content` as the file at `path`.
    async fn parse(&self, path: &Path, content: &str) -> Result<FileAnalysis>;
}

// ============================================================================
// Heuristic Parser
// ============================================================================

/// Languages the bundled heuristic parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lang {
    TypeScript,
    Python,
    Rust,
    Go,
}

impl Lang {
    fn detect(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str())? {
            "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => Some(Self::TypeScript),
            "py" => Some(Self::Python),
            "rs" => Some(Self::Rust),
            "go" => Some(Self::Go),
            _ => None,
        }
    }
}

/// Line-scanning bootstrap parser.
///
/// Extraction is declaration-oriented: a symbol is recorded for every line
/// that starts (after modifiers) with a declaration keyword. A symbol's
/// dependency list is the set of identifier-like tokens appearing between
/// its declaration and the next one, capped to keep index noise bounded.
/// Complexity is a branch-keyword count over the whole file.
#[derive(Debug, Default, Clone)]
pub struct HeuristicParser;

impl HeuristicParser {
    /// Create a parser instance.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileParser for HeuristicParser {
    async fn parse(&self, path: &Path, content: &str) -> Result<FileAnalysis> {
        let Some(lang) = Lang::detect(path) else {
            tracing::debug!(path = %path.display(), "unsupported file type, empty analysis");
            return Ok(FileAnalysis::empty(path.to_path_buf()));
        };

        let lines: Vec<&str> = content.lines().collect();

        let mut declarations: Vec<(usize, Symbol)> = Vec::new();
        let mut imports: Vec<String> = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            if let Some(spec) = extract_import(lang, line) {
                if !imports.contains(&spec) {
                    imports.push(spec);
                }
            }
            if let Some(symbol) = parse_declaration(lang, line, idx) {
                declarations.push((idx, symbol));
            }
        }

        // Attach doc comments and body-token dependencies.
        let boundaries: Vec<usize> = declarations.iter().map(|(idx, _)| *idx).collect();
        for (pos, (decl_idx, symbol)) in declarations.iter_mut().enumerate() {
            symbol.documentation = doc_comment_above(lang, &lines, *decl_idx);

            let body_end = boundaries
                .get(pos + 1)
                .copied()
                .unwrap_or(lines.len());
            symbol.dependencies = body_identifiers(&lines[*decl_idx..body_end], &symbol.name);
        }

        let symbols: Vec<Symbol> = declarations.into_iter().map(|(_, s)| s).collect();
        let exports: Vec<String> = symbols
            .iter()
            .filter(|s| s.is_exported)
            .map(|s| s.name.clone())
            .collect();
        let dependencies = resolve_relative_imports(path, &imports);
        let complexity = complexity_estimate(content);

        tracing::debug!(
            path = %path.display(),
            symbol_count = symbols.len(),
            import_count = imports.len(),
            "heuristic parse complete"
        );

        Ok(FileAnalysis {
            path: path.to_path_buf(),
            symbols,
            imports,
            exports,
            dependencies,
            dependents: Vec::new(),
            complexity,
            last_modified: Utc::now(),
        })
    }
}

// ============================================================================
// Declaration Scanning
// ============================================================================

fn parse_declaration(lang: Lang, line: &str, idx: usize) -> Option<Symbol> {
    let trimmed = line.trim_start();
    let (rest, is_exported) = strip_visibility(lang, trimmed);

    let (keyword_rest, kind) = match lang {
        Lang::TypeScript => strip_ts_keyword(rest)?,
        Lang::Python => strip_py_keyword(rest)?,
        Lang::Rust => strip_rs_keyword(rest)?,
        Lang::Go => strip_go_keyword(rest)?,
    };

    let name = identifier_prefix(keyword_rest)?;
    let is_exported = match lang {
        // Python has no export keyword; underscore prefix marks private.
        Lang::Python => !name.starts_with('_'),
        // Go exports by capitalization.
        Lang::Go => name.chars().next().is_some_and(char::is_uppercase),
        _ => is_exported,
    };

    let column = line.find(&name).unwrap_or(0);
    let signature: String = trimmed.trim_end_matches('{').trim_end().chars().take(200).collect();

    Some(Symbol {
        name,
        kind,
        line: u32::try_from(idx + 1).unwrap_or(u32::MAX),
        column: u32::try_from(column).unwrap_or(0),
        signature: Some(signature),
        documentation: None,
        is_exported,
        dependencies: Vec::new(),
    })
}

fn strip_visibility(lang: Lang, line: &str) -> (&str, bool) {
    match lang {
        Lang::TypeScript => {
            if let Some(rest) = line.strip_prefix("export default ") {
                (rest, true)
            } else if let Some(rest) = line.strip_prefix("export ") {
                (rest, true)
            } else {
                (line, false)
            }
        }
        Lang::Rust => {
            if let Some(rest) = line.strip_prefix("pub(crate) ") {
                (rest, false)
            } else if let Some(rest) = line.strip_prefix("pub ") {
                (rest, true)
            } else {
                (line, false)
            }
        }
        Lang::Python | Lang::Go => (line, false),
    }
}

fn strip_ts_keyword(line: &str) -> Option<(&str, SymbolKind)> {
    if let Some(rest) = line.strip_prefix("async function ") {
        return Some((rest, SymbolKind::Function));
    }
    if let Some(rest) = line.strip_prefix("function ") {
        return Some((rest, SymbolKind::Function));
    }
    if let Some(rest) = line.strip_prefix("class ") {
        return Some((rest, SymbolKind::Class));
    }
    if let Some(rest) = line.strip_prefix("interface ") {
        return Some((rest, SymbolKind::Interface));
    }
    if let Some(rest) = line.strip_prefix("type ") {
        if line.contains('=') {
            return Some((rest, SymbolKind::Type));
        }
        return None;
    }
    if let Some(rest) = line.strip_prefix("const ") {
        // Arrow-function consts are functions for ranking purposes.
        let kind = if line.contains("=>") {
            SymbolKind::Function
        } else {
            SymbolKind::Constant
        };
        return Some((rest, kind));
    }
    if let Some(rest) = line.strip_prefix("let ") {
        return Some((rest, SymbolKind::Variable));
    }
    if let Some(rest) = line.strip_prefix("var ") {
        return Some((rest, SymbolKind::Variable));
    }
    None
}

fn strip_py_keyword(line: &str) -> Option<(&str, SymbolKind)> {
    if let Some(rest) = line.strip_prefix("async def ") {
        return Some((rest, SymbolKind::Function));
    }
    if let Some(rest) = line.strip_prefix("def ") {
        return Some((rest, SymbolKind::Function));
    }
    if let Some(rest) = line.strip_prefix("class ") {
        return Some((rest, SymbolKind::Class));
    }
    None
}

fn strip_rs_keyword(line: &str) -> Option<(&str, SymbolKind)> {
    if let Some(rest) = line.strip_prefix("async fn ") {
        return Some((rest, SymbolKind::Function));
    }
    if let Some(rest) = line.strip_prefix("fn ") {
        return Some((rest, SymbolKind::Function));
    }
    if let Some(rest) = line.strip_prefix("struct ") {
        return Some((rest, SymbolKind::Class));
    }
    if let Some(rest) = line.strip_prefix("enum ") {
        return Some((rest, SymbolKind::Type));
    }
    if let Some(rest) = line.strip_prefix("trait ") {
        return Some((rest, SymbolKind::Interface));
    }
    if let Some(rest) = line.strip_prefix("type ") {
        return Some((rest, SymbolKind::Type));
    }
    if let Some(rest) = line.strip_prefix("const ") {
        return Some((rest, SymbolKind::Constant));
    }
    if let Some(rest) = line.strip_prefix("static ") {
        return Some((rest, SymbolKind::Constant));
    }
    None
}

fn strip_go_keyword(line: &str) -> Option<(&str, SymbolKind)> {
    if let Some(rest) = line.strip_prefix("func (") {
        // Method with receiver: skip past the receiver.
        let after = rest.split_once(')')?.1.trim_start();
        return Some((after, SymbolKind::Method));
    }
    if let Some(rest) = line.strip_prefix("func ") {
        return Some((rest, SymbolKind::Function));
    }
    if let Some(rest) = line.strip_prefix("type ") {
        let kind = if line.contains("interface") {
            SymbolKind::Interface
        } else {
            SymbolKind::Class
        };
        return Some((rest, kind));
    }
    if let Some(rest) = line.strip_prefix("const ") {
        return Some((rest, SymbolKind::Constant));
    }
    if let Some(rest) = line.strip_prefix("var ") {
        return Some((rest, SymbolKind::Variable));
    }
    None
}

/// Leading identifier of a string slice, if it starts with one.
fn identifier_prefix(s: &str) -> Option<String> {
    let mut chars = s.chars();
    let first = chars.next()?;
    if !(first.is_alphabetic() || first == '_') {
        return None;
    }
    let name: String = std::iter::once(first)
        .chain(chars.take_while(|c| c.is_alphanumeric() || *c == '_'))
        .collect();
    Some(name)
}

fn doc_comment_above(lang: Lang, lines: &[&str], decl_idx: usize) -> Option<String> {
    let above = lines.get(decl_idx.checked_sub(1)?)?.trim();
    let marker_match = match lang {
        Lang::Python => above.starts_with('#'),
        Lang::Rust => above.starts_with("///") || above.starts_with("//"),
        Lang::TypeScript | Lang::Go => {
            above.starts_with("//") || above.starts_with('*') || above.starts_with("/*")
        }
    };
    if !marker_match {
        return None;
    }
    let text = above
        .trim_start_matches('/')
        .trim_start_matches('*')
        .trim_start_matches('#')
        .trim();
    (!text.is_empty()).then(|| text.to_string())
}

// ============================================================================
// Body Tokens, Imports, Complexity
// ============================================================================

const MAX_SYMBOL_DEPS: usize = 12;

const RESERVED_WORDS: &[&str] = &[
    "if", "else", "for", "while", "return", "let", "const", "var", "function", "class",
    "interface", "type", "import", "export", "from", "def", "async", "await", "match", "case",
    "switch", "break", "continue", "true", "false", "null", "None", "True", "False", "self",
    "this", "pub", "use", "impl", "struct", "enum", "trait", "mut", "static", "func", "new",
    "try", "catch", "except", "finally", "raise", "throw", "string", "number", "boolean", "void",
];

/// Identifier tokens appearing in a symbol's body, excluding the symbol's
/// own name and language keywords. Capped at [`MAX_SYMBOL_DEPS`].
fn body_identifiers(body: &[&str], own_name: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for line in body {
        for token in tokenize(line) {
            if token.len() <= 2
                || token == own_name
                || RESERVED_WORDS.contains(&token)
                || seen.iter().any(|s| s == token)
            {
                continue;
            }
            seen.push(token.to_string());
            if seen.len() >= MAX_SYMBOL_DEPS {
                return seen;
            }
        }
    }
    seen
}

fn tokenize(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty() && t.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_'))
}

fn extract_import(lang: Lang, line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    match lang {
        Lang::TypeScript => {
            if trimmed.starts_with("import ") || trimmed.contains("require(") {
                return quoted_specifier(trimmed);
            }
            None
        }
        Lang::Python => {
            if let Some(rest) = trimmed.strip_prefix("from ") {
                return rest.split_whitespace().next().map(String::from);
            }
            if let Some(rest) = trimmed.strip_prefix("import ") {
                return rest
                    .split_whitespace()
                    .next()
                    .map(|m| m.trim_end_matches(',').to_string());
            }
            None
        }
        Lang::Rust => trimmed
            .strip_prefix("use ")
            .map(|rest| rest.trim_end_matches(';').trim().to_string()),
        Lang::Go => {
            if trimmed.starts_with("import") || trimmed.starts_with('"') {
                return quoted_specifier(trimmed);
            }
            None
        }
    }
}

fn quoted_specifier(line: &str) -> Option<String> {
    for quote in ['"', '\''] {
        let mut parts = line.splitn(3, quote);
        parts.next()?;
        if let Some(spec) = parts.next() {
            if parts.next().is_some() {
                return Some(spec.to_string());
            }
        }
    }
    None
}

/// Resolve relative import specifiers (`./x`, `../x`) against the importing
/// file's directory. Bare specifiers (packages, absolute modules) are left
/// unresolved; the graph tolerates pending targets anyway.
fn resolve_relative_imports(path: &Path, imports: &[String]) -> Vec<PathBuf> {
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let own_ext = path.extension().and_then(|e| e.to_str());

    let mut resolved = Vec::new();
    for spec in imports {
        if !(spec.starts_with("./") || spec.starts_with("../")) {
            continue;
        }
        let mut components: Vec<&str> = base
            .to_str()
            .map(|s| s.split('/').filter(|c| !c.is_empty()).collect())
            .unwrap_or_default();
        for part in spec.split('/') {
            match part {
                "." | "" => {}
                ".." => {
                    components.pop();
                }
                other => components.push(other),
            }
        }
        let mut target = PathBuf::from(components.join("/"));
        if target.extension().is_none() {
            if let Some(ext) = own_ext {
                target.set_extension(ext);
            }
        }
        if !resolved.contains(&target) {
            resolved.push(target);
        }
    }
    resolved
}

const BRANCH_KEYWORDS: &[&str] = &[
    "if", "for", "while", "case", "catch", "match", "elif", "except", "switch",
];

/// Branch-count complexity estimate: one per branch keyword token plus one
/// per `&&`/`||` operator.
fn complexity_estimate(content: &str) -> u32 {
    let mut count: usize = 0;
    for line in content.lines() {
        count += tokenize(line)
            .filter(|t| BRANCH_KEYWORDS.contains(t))
            .count();
        count += line.matches("&&").count();
        count += line.matches("||").count();
    }
    u32::try_from(count).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    async fn parse(path: &str, content: &str) -> FileAnalysis {
        HeuristicParser::new()
            .parse(Path::new(path), content)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn unsupported_extension_fails_closed() {
        let analysis = parse("logo.png", "binary junk").await;
        assert!(analysis.symbols.is_empty());
        assert!(analysis.dependencies.is_empty());
        assert_eq!(analysis.path, PathBuf::from("logo.png"));
    }

    #[tokio::test]
    async fn typescript_exported_function_is_found() {
        let src = "import { helper } from './util';\n\
                   export function calculateTotal(items: Item[]): number {\n\
                   \x20 return items.reduce(sumPrices, 0);\n\
                   }\n";
        let analysis = parse("src/billing.ts", src).await;

        let symbol = analysis.symbol("calculateTotal").unwrap();
        assert_eq!(symbol.kind, SymbolKind::Function);
        assert!(symbol.is_exported);
        assert_eq!(symbol.line, 2);
        assert!(symbol.dependencies.iter().any(|d| d == "sumPrices"));

        assert_eq!(analysis.exports, vec!["calculateTotal"]);
        assert_eq!(analysis.imports, vec!["./util"]);
        assert_eq!(analysis.dependencies, vec![PathBuf::from("src/util.ts")]);
    }

    #[tokio::test]
    async fn relative_import_with_parent_traversal_resolves() {
        let src = "import { db } from '../db/client';\n";
        let analysis = parse("src/api/routes.ts", src).await;
        assert_eq!(
            analysis.dependencies,
            vec![PathBuf::from("src/db/client.ts")]
        );
    }

    #[tokio::test]
    async fn bare_package_imports_are_not_resolved() {
        let src = "import React from 'react';\nimport { x } from './local';\n";
        let analysis = parse("app.tsx", src).await;
        assert_eq!(analysis.imports.len(), 2);
        assert_eq!(analysis.dependencies, vec![PathBuf::from("local.tsx")]);
    }

    #[tokio::test]
    async fn python_underscore_prefix_is_private() {
        let src = "def handle_request(req):\n    pass\n\ndef _internal():\n    pass\n";
        let analysis = parse("server.py", src).await;

        assert!(analysis.symbol("handle_request").unwrap().is_exported);
        assert!(!analysis.symbol("_internal").unwrap().is_exported);
        assert_eq!(analysis.exports, vec!["handle_request"]);
    }

    #[tokio::test]
    async fn go_exports_by_capitalization() {
        let src = "func ParseConfig(path string) error {\n}\n\nfunc helper() {\n}\n";
        let analysis = parse("config.go", src).await;

        assert!(analysis.symbol("ParseConfig").unwrap().is_exported);
        assert!(!analysis.symbol("helper").unwrap().is_exported);
    }

    #[tokio::test]
    async fn rust_pub_marks_export() {
        let src = "pub fn run() {}\n\nfn private_helper() {}\n\npub struct Engine;\n";
        let analysis = parse("lib.rs", src).await;

        assert!(analysis.symbol("run").unwrap().is_exported);
        assert!(!analysis.symbol("private_helper").unwrap().is_exported);
        assert_eq!(analysis.symbol("Engine").unwrap().kind, SymbolKind::Class);
    }

    #[tokio::test]
    async fn complexity_counts_branches() {
        let src = "function f(x) {\n\
                   \x20 if (x > 0 && x < 10) {\n\
                   \x20   for (let i = 0; i < x; i++) {}\n\
                   \x20 } else {\n\
                   \x20   while (x) { x--; }\n\
                   \x20 }\n\
                   }\n";
        let analysis = parse("f.js", src).await;
        // if + && + for + while = 4
        assert_eq!(analysis.complexity, 4);
    }

    #[tokio::test]
    async fn doc_comment_is_attached() {
        let src = "// Adds two numbers.\nexport function add(a, b) { return a + b; }\n";
        let analysis = parse("math.js", src).await;
        assert_eq!(
            analysis.symbol("add").unwrap().documentation.as_deref(),
            Some("Adds two numbers.")
        );
    }

    #[rstest]
    #[case("a.ts", true)]
    #[case("a.tsx", true)]
    #[case("a.py", true)]
    #[case("a.rs", true)]
    #[case("a.go", true)]
    #[case("a.css", false)]
    #[case("Makefile", false)]
    fn language_detection(#[case] path: &str, #[case] supported: bool) {
        assert_eq!(Lang::detect(Path::new(path)).is_some(), supported);
    }

    #[test]
    fn identifier_prefix_stops_at_punctuation() {
        assert_eq!(identifier_prefix("calculateTotal(items)"), Some("calculateTotal".into()));
        assert_eq!(identifier_prefix("Name<T> {"), Some("Name".into()));
        assert_eq!(identifier_prefix("123abc"), None);
    }
}
