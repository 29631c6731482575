//! Table detection and prose rewriting — runs before sentence splitting.
//!
//! Pasted documents often contain pipe- or tab-delimited tables that read
//! terribly line by line.  [`preprocess`] finds them and asks a
//! [`TableRewriter`] to turn each into spoken prose.  Any failure leaves the
//! text untouched: preprocessing is an enhancement, never a gate.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::Result;

/// A run of consecutive table lines (0-based, inclusive line indices).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedTable {
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

/// Outcome of [`preprocess`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocessed {
    pub text: String,
    pub tables_converted: usize,
}

/// Turns tables into natural spoken prose, one output per input table.
#[async_trait]
pub trait TableRewriter: Send + Sync {
    async fn rewrite(&self, tables: Vec<String>) -> Result<Vec<String>>;
}

// ─── Detection ───────────────────────────────────────────────────────────────

/// Separator rows such as `|---|---|` or `+===+===+`.
static RE_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\s|+:-]+$|^[\s|+:=]+$").unwrap());

/// Minimum consecutive table lines for a block to count as a table.
const MIN_TABLE_LINES: usize = 2;

fn is_table_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.matches('|').count() >= 2 {
        return true;
    }
    if RE_SEPARATOR.is_match(trimmed) && (trimmed.contains("---") || trimmed.contains("===")) {
        return true;
    }
    // Tabs are inside the trimmed line, not the trimmed-off edges.
    line.matches('\t').count() >= 2
}

/// Find every table block in `text`.
pub fn detect_tables(text: &str) -> Vec<DetectedTable> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut tables = Vec::new();
    let mut start: Option<usize> = None;

    // One step past the end flushes a table that runs to the last line.
    for i in 0..=lines.len() {
        let is_table = i < lines.len() && is_table_line(lines[i]);
        match (is_table, start) {
            (true, None) => start = Some(i),
            (true, Some(_)) => {}
            (false, Some(s)) => {
                if i - s >= MIN_TABLE_LINES {
                    tables.push(DetectedTable {
                        start_line: s,
                        end_line: i - 1,
                        text: lines[s..i].join("\n"),
                    });
                }
                start = None;
            }
            (false, None) => {}
        }
    }
    tables
}

// ─── Rewrite ─────────────────────────────────────────────────────────────────

/// Replace `tables` in `text` with `conversions`, last table first so earlier
/// line offsets stay valid.
pub fn apply_conversions(text: &str, tables: &[DetectedTable], conversions: &[String]) -> String {
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    for (table, prose) in tables.iter().zip(conversions).rev() {
        if table.end_line >= lines.len() {
            continue;
        }
        lines.splice(table.start_line..=table.end_line, std::iter::once(prose.clone()));
    }
    lines.join("\n")
}

/// Detect tables and rewrite them with `rewriter`.
///
/// Returns the original text with `tables_converted == 0` when there is
/// nothing to do or the rewriter fails.
pub async fn preprocess(text: &str, rewriter: &dyn TableRewriter) -> Preprocessed {
    let unchanged = || Preprocessed { text: text.to_string(), tables_converted: 0 };

    let tables = detect_tables(text);
    if tables.is_empty() {
        return unchanged();
    }
    debug!(count = tables.len(), "rewriting tables");

    let inputs = tables.iter().map(|t| t.text.clone()).collect();
    match rewriter.rewrite(inputs).await {
        Ok(conversions) if conversions.len() == tables.len() => Preprocessed {
            text: apply_conversions(text, &tables, &conversions),
            tables_converted: tables.len(),
        },
        Ok(conversions) => {
            warn!(
                expected = tables.len(),
                got = conversions.len(),
                "table rewrite returned the wrong number of conversions"
            );
            unchanged()
        }
        Err(e) => {
            warn!("table rewrite failed: {e}");
            unchanged()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReaderError;

    const DOC: &str = "Intro line.\n| a | b |\n|---|---|\n| 1 | 2 |\nOutro line.";

    struct Fixed(Vec<String>);

    #[async_trait]
    impl TableRewriter for Fixed {
        async fn rewrite(&self, _tables: Vec<String>) -> Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl TableRewriter for Broken {
        async fn rewrite(&self, _tables: Vec<String>) -> Result<Vec<String>> {
            Err(ReaderError::Status { status: 502 })
        }
    }

    #[test]
    fn test_is_table_line() {
        assert!(is_table_line("| a | b |"));
        assert!(is_table_line("+---+---+"));
        assert!(is_table_line("a\tb\tc"));
        assert!(!is_table_line("plain prose | once"));
        assert!(!is_table_line("   "));
    }

    #[test]
    fn test_detect_pipe_table() {
        let tables = detect_tables(DOC);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].start_line, 1);
        assert_eq!(tables[0].end_line, 3);
        assert!(tables[0].text.starts_with("| a | b |"));
    }

    #[test]
    fn test_single_line_is_not_a_table() {
        assert!(detect_tables("x\n| a | b |\ny").is_empty());
    }

    #[test]
    fn test_table_at_end_of_text() {
        let tables = detect_tables("prose\na\tb\tc\nd\te\tf");
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].end_line, 2);
    }

    #[test]
    fn test_apply_conversions() {
        let tables = detect_tables(DOC);
        let out = apply_conversions(DOC, &tables, &["A is one, B is two.".to_string()]);
        assert_eq!(out, "Intro line.\nA is one, B is two.\nOutro line.");
    }

    #[tokio::test]
    async fn test_preprocess_rewrites() {
        let r = Fixed(vec!["Prose.".to_string()]);
        let out = preprocess(DOC, &r).await;
        assert_eq!(out.tables_converted, 1);
        assert!(out.text.contains("Prose."));
        assert!(!out.text.contains('|'));
    }

    #[tokio::test]
    async fn test_preprocess_failure_keeps_text() {
        let out = preprocess(DOC, &Broken).await;
        assert_eq!(out.tables_converted, 0);
        assert_eq!(out.text, DOC);
    }

    #[tokio::test]
    async fn test_preprocess_count_mismatch_keeps_text() {
        let out = preprocess(DOC, &Fixed(vec![])).await;
        assert_eq!(out.tables_converted, 0);
        assert_eq!(out.text, DOC);
    }
}
