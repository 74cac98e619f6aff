//! # Match Engine
//!
//! Finds a plain-text needle in the flattened view of a document. Searching
//! runs per segment (one per text block) on visible text, so a match may
//! start in one formatting run and end in another but never spans blocks.
//!
//! Two passes:
//!
//! 1. exact: the needle is escaped and matched literally
//! 2. fuzzy: only when pass 1 found nothing and the needle contains
//!    whitespace; each whitespace run in the needle matches one or more
//!    whitespace characters in the text. Case still matters.
//!
//! A match is admissible only when at least one of its bytes is untagged.
//! Text that exists only inside pending changes is never matched.

use crate::errors::{EditError, EditResult};
use regex::Regex;
use revisor_markup::Segment;
use serde::Serialize;

/// One occurrence of the needle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchSpan {
    pub block_id: String,
    /// Byte range within the block's visible text
    pub start: usize,
    pub end: usize,
    /// Byte range within the whole flattened document
    pub flat_start: usize,
    pub flat_end: usize,
    /// The matched text as it appears in the document
    pub text: String,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    pub fuzzy_whitespace: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            fuzzy_whitespace: true,
        }
    }
}

/// Find every admissible, non-overlapping occurrence of `needle`
pub fn find_all(segments: &[Segment], needle: &str, options: MatchOptions) -> EditResult<Vec<MatchSpan>> {
    if needle.is_empty() {
        return Err(EditError::EmptyInput("search text is empty".to_string()));
    }

    let exact = compile(&regex::escape(needle))?;
    let matches = search(segments, &exact);
    if !matches.is_empty() || !options.fuzzy_whitespace {
        return Ok(matches);
    }

    match fuzzy_pattern(needle) {
        Some(pattern) => Ok(search(segments, &compile(&pattern)?)),
        None => Ok(matches),
    }
}

/// Pattern for the fuzzy pass, or `None` when the needle has no whitespace
fn fuzzy_pattern(needle: &str) -> Option<String> {
    if !needle.chars().any(char::is_whitespace) {
        return None;
    }
    let mut pattern = String::new();
    let mut in_space = false;
    for ch in needle.chars() {
        if ch.is_whitespace() {
            if !in_space {
                pattern.push_str(r"\s+");
                in_space = true;
            }
        } else {
            in_space = false;
            pattern.push_str(&regex::escape(ch.encode_utf8(&mut [0u8; 4])));
        }
    }
    Some(pattern)
}

fn compile(pattern: &str) -> EditResult<Regex> {
    Regex::new(pattern).map_err(|e| EditError::InvalidOpShape(format!("search text cannot be matched: {}", e)))
}

fn search(segments: &[Segment], re: &Regex) -> Vec<MatchSpan> {
    let mut out = Vec::new();
    for segment in segments {
        for m in re.find_iter(&segment.text) {
            if m.start() == m.end() || segment.fully_tagged(m.range()) {
                continue;
            }
            out.push(MatchSpan {
                block_id: segment.block_id.clone(),
                start: m.start(),
                end: m.end(),
                flat_start: segment.start + m.start(),
                flat_end: segment.start + m.end(),
                text: m.as_str().to_string(),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use revisor_markup::{flatten, parse};

    fn find(source: &str, needle: &str) -> Vec<MatchSpan> {
        let doc = parse(source).unwrap();
        find_all(&flatten(&doc).segments, needle, MatchOptions::default()).unwrap()
    }

    #[test]
    fn test_exact_match_across_runs() {
        let matches = find("<p>Hello <b>wor</b>ld.</p>", "world");
        assert_eq!(matches.len(), 1);
        assert_eq!((matches[0].start, matches[0].end), (6, 11));
        assert_eq!(matches[0].text, "world");
    }

    #[test]
    fn test_regex_characters_are_literal() {
        assert_eq!(find("<p>cost (approx.) $5</p>", "(approx.) $5").len(), 1);
        assert!(find("<p>abc</p>", "a.c").is_empty());
    }

    #[test]
    fn test_fuzzy_whitespace_only_as_fallback() {
        let matches = find("<p>a b</p>", "a  b");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].text, "a b");

        // The exact pass wins when it finds something
        let matches = find("<p>a  b and a b</p>", "a  b");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].start, 0);
    }

    #[test]
    fn test_fuzzy_pass_is_case_sensitive() {
        assert!(find("<p>A b</p>", "a  b").is_empty());
    }

    #[test]
    fn test_fuzzy_pass_can_be_disabled() {
        let doc = parse("<p>a b</p>").unwrap();
        let options = MatchOptions {
            fuzzy_whitespace: false,
        };
        assert!(find_all(&flatten(&doc).segments, "a  b", options).unwrap().is_empty());
    }

    #[test]
    fn test_matches_stay_inside_blocks() {
        assert!(find("<p>end</p><p>start</p>", "end start").is_empty());
        assert_eq!(find("<p>x</p><p>x</p>", "x").len(), 2);
    }

    #[test]
    fn test_empty_needle_is_rejected() {
        let doc = parse("<p>a</p>").unwrap();
        let err = find_all(&flatten(&doc).segments, "", MatchOptions::default()).unwrap_err();
        assert!(matches!(err, EditError::EmptyInput(_)));
    }

    #[test]
    fn test_pending_text_is_not_matched() {
        let source = r#"<p>Hello <del change="c-1">world</del><ins change="c-1">earth</ins>.</p>"#;
        assert!(find(source, "earth").is_empty());
        assert!(find(source, "world").is_empty());
        // Partly untagged matches are admissible
        assert_eq!(find(source, "earth.").len(), 1);
    }
}
