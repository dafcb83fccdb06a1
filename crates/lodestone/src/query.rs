//! Query analysis: intent classification and identifier extraction.
//!
//! Queries arrive as natural-language text ("why does calculateTotal return
//! NaN?"). Before ranking, the engine classifies the intent and pulls out
//! the tokens that look like program identifiers, because those anchor the
//! symbol-index stage of context assembly.

use serde::{Deserialize, Serialize};

/// What the user is trying to do with a query.
///
/// Drives suggestion wording and lets hosts bias their own behavior; the
/// ranking pipeline itself is intent-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    /// Restructure existing code
    Refactor,
    /// Understand existing code
    Explain,
    /// Find the cause of incorrect behavior
    Debug,
    /// Write or fix tests
    Test,
    /// Anything else
    General,
}

/// Classify a query by keyword.
///
/// First match wins in the order refactor, debug, test, explain; a query
/// matching nothing is `General`.
#[must_use]
pub fn analyze_intent(query: &str) -> QueryIntent {
    let lower = query.to_lowercase();

    const REFACTOR: &[&str] = &["refactor", "rename", "extract", "restructure", "clean up"];
    const DEBUG: &[&str] = &["bug", "error", "fix", "crash", "broken", "fails", "wrong", "nan"];
    const TEST: &[&str] = &["test", "spec", "coverage", "mock", "assert"];
    const EXPLAIN: &[&str] = &["explain", "what does", "how does", "why does", "understand"];

    if REFACTOR.iter().any(|k| lower.contains(k)) {
        QueryIntent::Refactor
    } else if DEBUG.iter().any(|k| lower.contains(k)) {
        QueryIntent::Debug
    } else if TEST.iter().any(|k| lower.contains(k)) {
        QueryIntent::Test
    } else if EXPLAIN.iter().any(|k| lower.contains(k)) {
        QueryIntent::Explain
    } else {
        QueryIntent::General
    }
}

/// Extract tokens that look like program identifiers.
///
/// A token qualifies if it is longer than two characters and is either
/// snake_case (contains `_`) or mixed-case (camelCase / PascalCase). Plain
/// lowercase words are treated as prose, not identifiers.
#[must_use]
pub fn extract_identifiers(query: &str) -> Vec<String> {
    let mut identifiers = Vec::new();
    for token in query.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        if token.len() <= 2 {
            continue;
        }
        if !token.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_') {
            continue;
        }
        let has_underscore = token.contains('_');
        let has_upper = token.chars().any(char::is_uppercase);
        let has_lower = token.chars().any(char::is_lowercase);
        let mixed_case = has_upper && has_lower;

        if (has_underscore || mixed_case) && !identifiers.iter().any(|i| i == token) {
            identifiers.push(token.to_string());
        }
    }
    identifiers
}

/// Extract lowercase keywords for the keyword-match ranking component.
///
/// Short tokens and common stopwords are dropped.
#[must_use]
pub fn extract_keywords(query: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "the", "and", "for", "are", "with", "this", "that", "from", "does", "how", "why",
        "what", "where", "when", "can", "could", "should", "would", "into", "about",
    ];

    let mut keywords = Vec::new();
    for token in query.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        if token.len() <= 2 {
            continue;
        }
        let lower = token.to_lowercase();
        if STOPWORDS.contains(&lower.as_str()) || keywords.contains(&lower) {
            continue;
        }
        keywords.push(lower);
    }
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("refactor the session manager", QueryIntent::Refactor)]
    #[case("why does calculateTotal return NaN?", QueryIntent::Debug)]
    #[case("add a test for the parser", QueryIntent::Test)]
    #[case("explain the cache eviction", QueryIntent::Explain)]
    #[case("add pagination to the list endpoint", QueryIntent::General)]
    fn intent_classification(#[case] query: &str, #[case] expected: QueryIntent) {
        assert_eq!(analyze_intent(query), expected);
    }

    #[test]
    fn camel_case_and_snake_case_are_identifiers() {
        let ids = extract_identifiers("why does calculateTotal call sum_prices twice");
        assert_eq!(ids, vec!["calculateTotal", "sum_prices"]);
    }

    #[test]
    fn prose_words_are_not_identifiers() {
        assert!(extract_identifiers("make the page load faster").is_empty());
    }

    #[test]
    fn short_tokens_are_skipped() {
        assert!(extract_identifiers("fix aB and x_").is_empty());
    }

    #[test]
    fn keywords_drop_stopwords_and_lowercase() {
        let kw = extract_keywords("Why does the Parser fail");
        assert_eq!(kw, vec!["parser", "fail"]);
    }
}
