//! Symbol-preserving chunking for token-budget enforcement.
//!
//! When a file overflows the context token budget, cutting it at an
//! arbitrary character boundary hands the model half a function. Instead,
//! this module extracts the complete source block of each relevant symbol:
//! the declaration line is located by keyword scan, and the block end by
//! brace balancing (or indentation, for brace-less languages). A definition
//! is either included whole or omitted; it is never cut mid-body.

/// Minimum useful chunk size. Shorter extractions are dropped entirely; a
/// fragment below this rarely helps the model and still costs budget.
pub const MIN_USEFUL_CHARS: usize = 500;

/// Marker appended to plainly truncated content.
pub const TRUNCATION_MARKER: &str = "\n\n[Context truncated due to token limit]";

/// Separator between extracted symbol blocks.
const BLOCK_SEPARATOR: &str = "\n\n";

/// Estimate the token cost of text. Tokens are approximated as chars/4;
/// budgets are soft bounds, so a rough estimate is fine.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Declaration keywords that can introduce a named symbol.
const DECLARATION_KEYWORDS: &[&str] = &[
    "function", "class", "interface", "type", "const", "let", "var", "def", "fn", "struct",
    "enum", "trait", "func", "static", "async",
];

/// Extract the complete source blocks of `symbols` from `content`, keeping
/// only whole blocks that fit within `max_chars` total.
///
/// Returns `None` when no block could be located or fitted; the caller
/// falls back to plain truncation.
#[must_use]
pub fn extract_symbol_blocks(
    content: &str,
    symbols: &[String],
    max_chars: usize,
) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    let mut output = String::new();

    for symbol in symbols {
        let Some(decl_idx) = find_declaration_line(&lines, symbol) else {
            continue;
        };
        let block = extract_block(&lines, decl_idx);

        let separator_cost = if output.is_empty() {
            0
        } else {
            BLOCK_SEPARATOR.chars().count()
        };
        if output.chars().count() + separator_cost + block.chars().count() > max_chars {
            // Whole blocks only: skip rather than cut.
            continue;
        }
        if !output.is_empty() {
            output.push_str(BLOCK_SEPARATOR);
        }
        output.push_str(&block);
    }

    if output.is_empty() {
        None
    } else {
        Some(output)
    }
}

/// Plain character truncation with an explicit marker.
///
/// Cuts at a char boundary at or below `max_chars` characters.
#[must_use]
pub fn truncate_plain(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let mut truncated: String = content.chars().take(max_chars).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

/// Find the line declaring `symbol`: the first line that contains the
/// symbol as a whole token alongside a declaration keyword.
fn find_declaration_line(lines: &[&str], symbol: &str) -> Option<usize> {
    lines.iter().position(|line| {
        let mut has_keyword = false;
        let mut has_symbol = false;
        for token in tokenize(line) {
            has_keyword |= DECLARATION_KEYWORDS.contains(&token);
            has_symbol |= token == symbol;
        }
        has_keyword && has_symbol
    })
}

fn tokenize(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
}

/// Extract the full block starting at `decl_idx`.
///
/// Brace-balanced when the declaration (or a line shortly after it) opens a
/// brace; indentation-delimited when the declaration ends with `:`
/// (Python); otherwise the declaration statement alone, through the line
/// that ends it.
fn extract_block(lines: &[&str], decl_idx: usize) -> String {
    let decl = lines[decl_idx];

    if let Some(end_idx) = brace_balanced_end(lines, decl_idx) {
        return lines[decl_idx..=end_idx].join("\n");
    }

    if decl.trim_end().ends_with(':') {
        return indentation_block(lines, decl_idx);
    }

    // Plain statement: take lines until one ends the statement.
    let mut end_idx = decl_idx;
    while end_idx < lines.len() {
        let trimmed = lines[end_idx].trim_end();
        if trimmed.ends_with(';') || !trimmed.ends_with(',') {
            break;
        }
        end_idx += 1;
    }
    lines[decl_idx..=end_idx.min(lines.len() - 1)].join("\n")
}

/// Scan forward for an opening brace (the declaration line or up to two
/// lines below it) and return the line index where its block closes.
fn brace_balanced_end(lines: &[&str], decl_idx: usize) -> Option<usize> {
    let scan_limit = (decl_idx + 3).min(lines.len());
    let mut depth: i32 = 0;
    let mut opened = false;

    for (idx, line) in lines.iter().enumerate().skip(decl_idx) {
        for c in line.chars() {
            match c {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return Some(idx);
        }
        if !opened && idx + 1 >= scan_limit {
            return None;
        }
    }
    // Unbalanced to EOF: the block runs to the end of the file.
    opened.then_some(lines.len() - 1)
}

/// Indentation-delimited block: the declaration plus every following line
/// that is blank or indented deeper than the declaration.
fn indentation_block(lines: &[&str], decl_idx: usize) -> String {
    let decl_indent = leading_whitespace(lines[decl_idx]);
    let mut end_idx = decl_idx;

    for (idx, line) in lines.iter().enumerate().skip(decl_idx + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if leading_whitespace(line) <= decl_indent {
            break;
        }
        end_idx = idx;
    }
    lines[decl_idx..=end_idx].join("\n")
}

fn leading_whitespace(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = "\
import { log } from './log';

export function keepMe(a, b) {
  if (a > b) {
    return a;
  }
  return b;
}

export function dropMe(x) {
  return x * 2;
}
";

    #[test]
    fn extracts_only_the_named_block() {
        let out =
            extract_symbol_blocks(SAMPLE, &["keepMe".to_string()], 10_000).unwrap();
        assert!(out.contains("function keepMe"));
        assert!(out.contains("return b;"));
        assert!(out.ends_with('}'));
        assert!(!out.contains("dropMe"));
        assert!(!out.contains("import"));
    }

    #[test]
    fn block_that_does_not_fit_is_skipped_not_cut() {
        let out = extract_symbol_blocks(
            SAMPLE,
            &["keepMe".to_string(), "dropMe".to_string()],
            // Enough for keepMe's block only.
            90,
        )
        .unwrap();
        assert!(out.contains("function keepMe"));
        assert!(!out.contains("dropMe"));
    }

    #[test]
    fn no_matching_symbol_yields_none() {
        assert!(extract_symbol_blocks(SAMPLE, &["ghost".to_string()], 10_000).is_none());
        assert!(extract_symbol_blocks(SAMPLE, &[], 10_000).is_none());
    }

    #[test]
    fn python_block_is_indentation_delimited() {
        let src = "\
def outer():
    x = 1
    if x:
        return x

def other():
    pass
";
        let out = extract_symbol_blocks(src, &["outer".to_string()], 10_000).unwrap();
        assert!(out.contains("def outer"));
        assert!(out.contains("return x"));
        assert!(!out.contains("def other"));
    }

    #[test]
    fn nested_braces_are_balanced() {
        let src = "\
function nested() {
  const inner = { a: { b: 1 } };
  return inner;
}
const after = 1;
";
        let out = extract_symbol_blocks(src, &["nested".to_string()], 10_000).unwrap();
        assert!(out.ends_with('}'));
        assert!(!out.contains("after"));
    }

    #[test]
    fn allman_style_brace_on_next_line() {
        let src = "\
func Compute(x int) int
{
    return x + 1
}
";
        let out = extract_symbol_blocks(src, &["Compute".to_string()], 10_000).unwrap();
        assert!(out.contains("return x + 1"));
        assert!(out.trim_end().ends_with('}'));
    }

    #[test]
    fn plain_truncation_appends_marker() {
        let content = "x".repeat(1_000);
        let out = truncate_plain(&content, 100);
        assert!(out.starts_with(&"x".repeat(100)));
        assert!(out.ends_with(TRUNCATION_MARKER));

        // Content within budget is untouched.
        assert_eq!(truncate_plain("short", 100), "short");
    }

    #[test]
    fn token_estimate_is_chars_over_four() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(&"x".repeat(4_000)), 1_000);
    }

    proptest! {
        /// A named block appears verbatim in the output or not at all.
        #[test]
        fn blocks_are_all_or_nothing(
            names in proptest::collection::vec("[a-z]{4,10}", 1..5),
            body_lines in 1usize..8,
            max_chars in 0usize..2_000,
        ) {
            let mut content = String::new();
            let mut blocks: Vec<(String, String)> = Vec::new();
            for (i, name) in names.iter().enumerate() {
                let mut block = format!("function {name}_{i}() {{\n");
                for line_no in 0..body_lines {
                    block.push_str(&format!("  work({line_no});\n"));
                }
                block.push('}');
                content.push_str(&block);
                content.push_str("\n\n");
                blocks.push((format!("{name}_{i}"), block));
            }

            let wanted: Vec<String> = blocks.iter().map(|(n, _)| n.clone()).collect();
            if let Some(out) = extract_symbol_blocks(&content, &wanted, max_chars) {
                prop_assert!(out.chars().count() <= max_chars);
                for (name, block) in &blocks {
                    let header_present = out.contains(&format!("function {name}("));
                    if header_present {
                        prop_assert!(
                            out.contains(block.as_str()),
                            "block for {} partially included",
                            name
                        );
                    }
                }
            }
        }
    }
}
