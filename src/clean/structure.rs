//! Page furniture: page numbers, running headers, footnote markers.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::clean::{CleanError, CleanResult, Transform};

/// Lines repeated at least this often are treated as running headers.
pub const DEFAULT_HEADER_MIN_COUNT: usize = 10;

/// Running headers are short; longer lines are never counted.
const MAX_HEADER_CHARS: usize = 100;

static DECORATED_PAGE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*[—–-]\s*\d+\s*[—–-]\s*$").unwrap());
static BRACKETED_PAGE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\[\d+\]\s*$").unwrap());
static BRACKET_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\d+\]").unwrap());
static PAREN_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\d+\)").unwrap());
static SUPERSCRIPT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[⁰¹²³⁴⁵⁶⁷⁸⁹]+").unwrap());
static SYMBOL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[*†‡§‖¶]+(\s|$)").unwrap());
static FOOTNOTE_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\s+.+$").unwrap());

/// Transform deleting every match of `pattern`, compiled multi-line so `^`
/// and `$` anchor on lines.
pub fn remove_page_headers(pattern: &str) -> CleanResult<Transform> {
    let re = RegexBuilder::new(pattern)
        .multi_line(true)
        .build()
        .map_err(|e| CleanError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
    Ok(Transform::from_fn(
        format!("remove_page_headers({pattern})"),
        move |text| re.replace_all(text, "").into_owned(),
    ))
}

/// Remove decorated (`— 42 —`) and bracketed (`[42]`) page numbers. Bare
/// numbers on their own line are left alone; they may be years or section
/// numbers.
pub fn remove_page_numbers(text: &str) -> String {
    let text = DECORATED_PAGE_NUMBER.replace_all(text, "");
    BRACKETED_PAGE_NUMBER.replace_all(&text, "").into_owned()
}

/// Drop lines that repeat at least [`DEFAULT_HEADER_MIN_COUNT`] times.
pub fn remove_running_headers(text: &str) -> String {
    strip_repeated_lines(text, DEFAULT_HEADER_MIN_COUNT)
}

/// [`remove_running_headers`] with a custom repetition threshold.
pub fn running_headers(min_count: usize) -> Transform {
    Transform::from_fn(format!("remove_running_headers({min_count})"), move |text| {
        strip_repeated_lines(text, min_count)
    })
}

/// Lines are compared trimmed and uppercased.
fn strip_repeated_lines(text: &str, min_count: usize) -> String {
    let key = |line: &str| line.trim().to_uppercase();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for line in text.split('\n') {
        let normalized = key(line);
        if !normalized.is_empty() && normalized.chars().count() < MAX_HEADER_CHARS {
            *counts.entry(normalized).or_default() += 1;
        }
    }
    let headers: HashSet<String> = counts
        .into_iter()
        .filter(|(_, n)| *n >= min_count)
        .map(|(line, _)| line)
        .collect();
    if headers.is_empty() {
        return text.to_string();
    }
    tracing::trace!(headers = headers.len(), "removing running headers");

    text.split('\n')
        .filter(|line| !headers.contains(&key(line)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip `[1]`, `(1)`, superscript digits and symbol markers (`*`, `†`, ...)
/// that precede whitespace or end of text.
pub fn remove_footnote_markers(text: &str) -> String {
    let text = BRACKET_MARKER.replace_all(text, "");
    let text = PAREN_MARKER.replace_all(&text, "");
    let text = SUPERSCRIPT_MARKER.replace_all(&text, "");
    SYMBOL_MARKER.replace_all(&text, "${1}").into_owned()
}

/// Split numbered footnote lines (`1. ...`, plus indented continuations)
/// away from body text.
pub fn extract_footnotes(text: &str) -> (String, Vec<String>) {
    let mut body = Vec::new();
    let mut footnotes: Vec<String> = Vec::new();
    let mut in_footnote = false;

    for line in text.split('\n') {
        let stripped = line.trim();
        if FOOTNOTE_LINE.is_match(stripped) {
            in_footnote = true;
            footnotes.push(stripped.to_string());
            continue;
        }
        if in_footnote && line.starts_with(' ') {
            if let Some(last) = footnotes.last_mut() {
                last.push(' ');
                last.push_str(stripped);
            }
            continue;
        }
        in_footnote = false;
        body.push(line);
    }
    (body.join("\n"), footnotes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers() {
        let text = "para\n— 42 —\nmore\n  [17]  \n1776\n- 3 -";
        assert_eq!(remove_page_numbers(text), "para\n\nmore\n\n1776\n");
    }

    #[test]
    fn running_headers_by_frequency() {
        let mut text = String::new();
        for i in 0..10 {
            text.push_str("  The Federalist  \n");
            text.push_str(&format!("body line {i}\n"));
        }
        let out = remove_running_headers(&text);
        assert!(!out.contains("Federalist"));
        assert!(out.contains("body line 9"));

        let few = "HEADER\nx\nheader\ny";
        assert_eq!(remove_running_headers(few), few);
        assert_eq!(running_headers(2).apply(few), "x\ny");
    }

    #[test]
    fn footnote_markers() {
        assert_eq!(
            remove_footnote_markers("text[1] more(2) note\u{b9} star* end†"),
            "text more note star end"
        );
        assert_eq!(remove_footnote_markers("a*b"), "a*b");
    }

    #[test]
    fn page_header_pattern() {
        let strip = remove_page_headers(r"^\d+\s+PRINCIPLES OF PSYCHOLOGY\s*$").unwrap();
        assert_eq!(
            strip.apply("12 PRINCIPLES OF PSYCHOLOGY\nbody"),
            "\nbody"
        );
        assert!(matches!(
            remove_page_headers("(unclosed"),
            Err(CleanError::Pattern { .. })
        ));
    }

    #[test]
    fn footnotes_extracted() {
        let text = "Body one.\n1. A note\n   continued here\nBody two.";
        let (body, notes) = extract_footnotes(text);
        assert_eq!(body, "Body one.\nBody two.");
        assert_eq!(notes, vec!["1. A note continued here"]);
    }
}
