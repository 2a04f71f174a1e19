//! Line breaks, hyphenation and paragraph flow.

use std::num::NonZeroUsize;
use std::sync::LazyLock;

use regex::Regex;

use crate::clean::{CleanError, CleanResult, Transform};

static HYPHEN_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\w+)-\n\s*([a-z])").unwrap());
static HYPHEN_BREAK_LOOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)-\s*\n\s*([a-z])").unwrap());
static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" +").unwrap());
static TRAILING_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m) +$").unwrap());
static BLANK_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*$\n").unwrap());

/// Default line length below which [`unwrap_lines`] treats a line as the
/// end of a paragraph.
pub const DEFAULT_MIN_LINE_LENGTH: usize = 60;

/// Rejoin `prin-\nciples` into `principles`. Only a lowercase continuation
/// counts, so real hyphenated compounds at line ends survive.
pub fn dehyphenate(text: &str) -> String {
    HYPHEN_BREAK.replace_all(text, "${1}${2}").into_owned()
}

/// Like [`dehyphenate`], also tolerating spaces between hyphen and newline.
pub fn dehyphenate_aggressive(text: &str) -> String {
    HYPHEN_BREAK_LOOSE.replace_all(text, "${1}${2}").into_owned()
}

/// Collapse 3+ newlines to a paragraph break, then join the single newlines
/// inside paragraphs with a space.
pub fn normalize_paragraphs(text: &str) -> String {
    let text = EXCESS_NEWLINES.replace_all(text, "\n\n");
    join_single_newlines(&text)
}

fn join_single_newlines(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        let inner = c == '\n'
            && i > 0
            && chars[i - 1] != '\n'
            && chars.get(i + 1).is_some_and(|&n| n != '\n');
        out.push(if inner { ' ' } else { c });
    }
    out
}

/// Tabs to spaces, space runs to one, trailing spaces dropped.
pub fn normalize_whitespace(text: &str) -> String {
    let text = text.replace('\t', " ");
    let text = MULTI_SPACE.replace_all(&text, " ");
    TRAILING_SPACE.replace_all(&text, "").into_owned()
}

pub fn strip_blank_lines(text: &str) -> String {
    BLANK_LINE.replace_all(text, "").into_owned()
}

/// Transform that keeps at most `max_consecutive` newlines in a row.
pub fn collapse_blank_lines(max_consecutive: usize) -> CleanResult<Transform> {
    NonZeroUsize::new(max_consecutive)
        .map(collapse_blank_lines_to)
        .ok_or_else(|| CleanError::Argument {
            transform: "collapse_blank_lines".into(),
            message: format!("max_consecutive must be >= 1, got {max_consecutive}"),
        })
}

/// [`collapse_blank_lines`] for a limit known to be valid.
pub fn collapse_blank_lines_to(max_consecutive: NonZeroUsize) -> Transform {
    let max = max_consecutive.get();
    Transform::from_fn(format!("collapse_blank_lines({max})"), move |text| {
        collapse_newline_runs(text, max)
    })
}

/// A run starts at a newline and takes all whitespace after it. Runs with
/// more than `max` newlines become exactly `max` newlines.
fn collapse_newline_runs(text: &str, max: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('\n') {
        out.push_str(&rest[..start]);
        let run = &rest[start..];
        let len = run
            .char_indices()
            .find(|(_, c)| !c.is_whitespace())
            .map_or(run.len(), |(i, _)| i);
        let (ws, tail) = run.split_at(len);
        if ws.matches('\n').count() > max {
            out.extend(std::iter::repeat_n('\n', max));
        } else {
            out.push_str(ws);
        }
        rest = tail;
    }
    out.push_str(rest);
    out
}

pub fn trim(text: &str) -> String {
    text.trim().to_string()
}

/// Rebuild paragraphs from hard-wrapped lines. A blank line, or a line
/// shorter than `min_line_length` chars that does not end in a hyphen, closes
/// the paragraph. Paragraphs come out separated by a blank line.
pub fn unwrap_lines(text: &str, min_line_length: usize) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        let stripped = line.trim();
        if stripped.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else if stripped.chars().count() < min_line_length && !stripped.ends_with('-') {
            current.push(stripped);
            paragraphs.push(current.join(" "));
            current.clear();
        } else {
            current.push(stripped);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs.join("\n\n")
}

/// [`unwrap_lines`] with a fixed threshold, as a transform.
pub fn unwrap_lines_transform(min_line_length: usize) -> Transform {
    Transform::from_fn(format!("unwrap_lines({min_line_length})"), move |text| {
        unwrap_lines(text, min_line_length)
    })
}
