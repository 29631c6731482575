//! Sentence segmentation and the reading-time helpers built on it.
//!
//! [`split_sentences`] is the pure oracle the rest of the crate relies on:
//! deterministic, side-effect-free, and the only way text becomes a list of
//! playable sentences.
//!
//! ## Boundary rules
//! | Boundary                                   | Example                  |
//! |--------------------------------------------|--------------------------|
//! | `.` `!` `?` `…` followed by whitespace      | `"Hi. There"` → 2        |
//! | Paragraph break (2+ newlines, collapsed)   | `"Hi\n\n\nThere"` → 2    |
//!
//! Every segment is trimmed and empty segments are dropped, so no sentence
//! ever spans a paragraph break.

use std::time::Duration;

use fancy_regex::Regex;
use once_cell::sync::Lazy;

/// Default speaking rate used for time estimates.
pub const DEFAULT_WORDS_PER_MINUTE: f64 = 160.0;

/// Titles longer than this are truncated.
pub const TITLE_MAX_CHARS: usize = 60;

const ELLIPSIS: &str = "...";

// ─────────────────────────────────────────────────────────────────────────────
// Compiled regexes (lazily initialised once)
// ─────────────────────────────────────────────────────────────────────────────

static RE_PARAGRAPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());

/// Zero-width split after terminal punctuation (consuming the whitespace) or
/// just before a paragraph break.
static RE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?<=[.!?\u{2026}])\s+|(?=\n\n)").unwrap());

// ─────────────────────────────────────────────────────────────────────────────
// Splitting
// ─────────────────────────────────────────────────────────────────────────────

/// Split `text` into the ordered list of sentences to be spoken.
///
/// Returns an empty list for empty or whitespace-only input.
pub fn split_sentences(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let normalized = RE_PARAGRAPH.replace_all(trimmed, "\n\n");

    let mut sentences = Vec::new();
    let mut last = 0;
    for m in RE_BOUNDARY.find_iter(&normalized) {
        // The pattern is infallible on valid UTF-8; a backtracking-limit
        // error ends the scan and the remainder becomes the last segment.
        let Ok(m) = m else { break };
        push_segment(&mut sentences, &normalized[last..m.start()]);
        last = m.end();
    }
    push_segment(&mut sentences, &normalized[last..]);
    sentences
}

fn push_segment(out: &mut Vec<String>, segment: &str) {
    let s = segment.trim();
    if !s.is_empty() {
        out.push(s.to_string());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Estimators
// ─────────────────────────────────────────────────────────────────────────────

/// Number of whitespace-separated tokens.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimated speaking time for `words` at `words_per_minute`, scaled by the
/// playback speed multiplier.
pub fn estimate_duration(words: usize, words_per_minute: f64, speed: f32) -> Duration {
    let rate = words_per_minute * f64::from(speed);
    if words == 0 || rate <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(words as f64 / rate * 60.0)
}

/// Estimated time to speak `sentences[from..]`, i.e. the un-spoken suffix
/// including the sentence currently in progress.
pub fn estimate_remaining(
    sentences: &[String],
    from: usize,
    words_per_minute: f64,
    speed: f32,
) -> Duration {
    let words = sentences
        .get(from..)
        .unwrap_or_default()
        .iter()
        .map(|s| word_count(s))
        .sum();
    estimate_duration(words, words_per_minute, speed)
}

// ─────────────────────────────────────────────────────────────────────────────
// Display helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Short title for a text: the whole text if it fits in
/// [`TITLE_MAX_CHARS`], otherwise cut back to a word boundary with `"..."`.
pub fn generate_title(text: &str) -> String {
    let clean = text.trim();
    if clean.chars().count() <= TITLE_MAX_CHARS {
        return clean.to_string();
    }
    let keep = TITLE_MAX_CHARS - ELLIPSIS.len();
    let truncated: String = clean.chars().take(keep).collect();
    match truncated.rfind(' ') {
        Some(pos) if pos > 0 => format!("{}{ELLIPSIS}", truncated[..pos].trim_end()),
        _ => format!("{truncated}{ELLIPSIS}"),
    }
}

/// `m:ss` clock string.
pub fn format_clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_example() {
        assert_eq!(
            split_sentences("Hello world. How are you?\n\nI am fine."),
            vec!["Hello world.", "How are you?", "I am fine."]
        );
    }

    #[test]
    fn test_split_empty_and_whitespace() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   \n\n\t ").is_empty());
    }

    #[test]
    fn test_split_paragraph_without_punctuation() {
        assert_eq!(
            split_sentences("Heading\n\n\n\nBody text here"),
            vec!["Heading", "Body text here"]
        );
    }

    #[test]
    fn test_split_ellipsis_and_exclamation() {
        assert_eq!(
            split_sentences("Wait\u{2026} What! Really?"),
            vec!["Wait\u{2026}", "What!", "Really?"]
        );
    }

    #[test]
    fn test_split_keeps_inline_punctuation() {
        // No whitespace after the dot: not a boundary.
        assert_eq!(split_sentences("Version 1.5 is out."), vec!["Version 1.5 is out."]);
    }

    #[test]
    fn test_split_single_newline_is_not_a_boundary() {
        assert_eq!(split_sentences("line one\nline two"), vec!["line one\nline two"]);
    }

    /// `sentences` glued back together with the separators they had in `text`.
    fn rejoin_with_original_separators(text: &str, sentences: &[String]) -> String {
        let mut out = String::new();
        let mut rest = text.trim();
        for (i, sentence) in sentences.iter().enumerate() {
            let at = rest.find(sentence.as_str()).expect("sentence comes from the input");
            if i > 0 {
                out.push_str(&rest[..at]);
            }
            out.push_str(sentence);
            rest = &rest[at + sentence.len()..];
        }
        out
    }

    #[test]
    fn test_split_is_idempotent_over_rejoin() {
        let texts = [
            "First one. Second one!\n\nThird?  Fourth\u{2026} fifth",
            "Heading\n\nBody",
            "Heading\n\n\n\nBody text. More\nof it.",
            "Trailing off\u{2026}\n\n  Next paragraph.  ",
        ];
        for text in texts {
            let once = split_sentences(text);
            let rejoined = rejoin_with_original_separators(text, &once);
            assert_eq!(split_sentences(&rejoined), once, "rejoined: {rejoined:?}");
        }

        let heading = split_sentences("Heading\n\nBody");
        assert_eq!(heading, vec!["Heading", "Body"]);
        assert_eq!(rejoin_with_original_separators("Heading\n\nBody", &heading), "Heading\n\nBody");
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  one two\tthree\nfour "), 4);
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn test_estimate_duration() {
        assert_eq!(estimate_duration(160, 160.0, 1.0), Duration::from_secs(60));
        assert_eq!(estimate_duration(160, 160.0, 2.0), Duration::from_secs(30));
        assert_eq!(estimate_duration(0, 160.0, 1.0), Duration::ZERO);
    }

    #[test]
    fn test_estimate_remaining_uses_suffix() {
        let s: Vec<String> = ["a b c d", "e f", "g h"].iter().map(|s| s.to_string()).collect();
        let all = estimate_remaining(&s, 0, 60.0, 1.0);
        let tail = estimate_remaining(&s, 1, 60.0, 1.0);
        assert_eq!(all, Duration::from_secs(8));
        assert_eq!(tail, Duration::from_secs(4));
        assert_eq!(estimate_remaining(&s, 9, 60.0, 1.0), Duration::ZERO);
    }

    #[test]
    fn test_generate_title_short() {
        assert_eq!(generate_title("  Short title  "), "Short title");
    }

    #[test]
    fn test_generate_title_truncates_at_word() {
        let text = "The quick brown fox jumps over the lazy dog and keeps running far away";
        let title = generate_title(text);
        assert!(title.ends_with("..."), "got: {title}");
        assert!(title.chars().count() <= TITLE_MAX_CHARS, "got: {title}");
        assert!(!title.contains("runni"), "cut mid-word: {title}");
    }

    #[test]
    fn test_generate_title_no_spaces() {
        let text = "x".repeat(80);
        let title = generate_title(&text);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS);
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(Duration::from_secs(0)), "0:00");
        assert_eq!(format_clock(Duration::from_secs(75)), "1:15");
        assert_eq!(format_clock(Duration::from_secs_f64(600.9)), "10:00");
    }
}
