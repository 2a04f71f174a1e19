//! Long-book segmentation.
//!
//! The generic [`Segmenter`] prefers natural chapter boundaries and falls
//! back to paragraph-aligned token-budget chunking. Books with a known
//! structure get a [`SegmentationHandler`] from the [`HandlerRegistry`]
//! instead.
//!
//! Segments always tile their span of the text: each segment ends exactly
//! where the next one starts. Oversized pieces are re-split at paragraph
//! breaks, never inside a paragraph.

mod federalist;
mod handler;
mod psychology_james;

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use miette::Diagnostic;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::StrategyConfig;
use crate::schema::{SchemaError, Segment};
use crate::tokenizer::TokenCounter;

pub use federalist::FederalistHandler;
pub use handler::{HandlerRegistry, SegmentationHandler};
pub use psychology_james::PsychologyJamesHandler;

/// Errors from segmentation.
#[derive(Debug, Error, Diagnostic)]
pub enum SegmentError {
    #[error("no segments produced for \"{barcode}\"")]
    #[diagnostic(
        code(grokken::segment::empty),
        help("The text has no paragraphs, or a custom handler found none of its markers.")
    )]
    Empty { barcode: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaError),
}

pub type SegmentResult<T> = std::result::Result<T, SegmentError>;

/// Which strategy produced a segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentMethod {
    Chapter,
    TokenBudget,
    CustomHandler,
}

impl std::fmt::Display for SegmentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chapter => write!(f, "chapter"),
            Self::TokenBudget => write!(f, "token_budget"),
            Self::CustomHandler => write!(f, "custom_handler"),
        }
    }
}

/// Output of [`Segmenter::segment`].
#[derive(Debug, Clone)]
pub struct SegmentationResult {
    pub segments: Vec<Segment>,
    pub total_tokens: usize,
    pub method: SegmentMethod,
}

/// A detected chapter-like heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    /// The full heading line, trimmed.
    pub title: String,
    /// Start of the heading's line.
    pub start: usize,
    /// End of the heading's line.
    pub end: usize,
}

/// Fewer headings than this and the book is chunked by token budget.
pub const MIN_HEADINGS: usize = 3;

/// Headings closer than this to the previous accepted one are duplicates.
const HEADING_MIN_GAP: usize = 100;

static HEADING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?m)^(?:CHAPTER|Chapter)\s+([IVXLCDM]+|\d+)(?:\.|:|\s|$)",
        r"(?m)^(?:BOOK|Book)\s+([IVXLCDM]+|\d+)(?:\.|:|\s|$)",
        r"(?m)^(?:PART|Part)\s+([IVXLCDM]+|\d+)(?:\.|:|\s|$)",
        r"(?m)^(?:SECTION|Section)\s+([IVXLCDM]+|\d+)(?:\.|:|\s|$)",
        r"(?m)^([IVXLCDM]+|\d+)\.\s+[A-Z]",
        r"(?m)^([A-Z][A-Z\s]{10,50})$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Generic segmenter.
pub struct Segmenter {
    counter: Arc<dyn TokenCounter>,
    config: StrategyConfig,
}

impl Segmenter {
    pub fn new(counter: Arc<dyn TokenCounter>, config: StrategyConfig) -> Self {
        Self { counter, config }
    }

    /// Per-segment budget when no target count is given.
    pub fn default_budget(&self) -> usize {
        self.config.max_context_tokens / 4
    }

    /// Segment with the default budget.
    pub fn segment(&self, text: &str) -> SegmentResult<SegmentationResult> {
        let total_tokens = self.counter.count(text);
        self.segment_with_budget(text, total_tokens, self.default_budget())
    }

    /// Segment aiming for roughly `target` segments.
    pub fn segment_with_target(
        &self,
        text: &str,
        target: usize,
    ) -> SegmentResult<SegmentationResult> {
        let total_tokens = self.counter.count(text);
        let budget = total_tokens / target.max(1) + 1000;
        self.segment_with_budget(text, total_tokens, budget)
    }

    fn segment_with_budget(
        &self,
        text: &str,
        total_tokens: usize,
        budget: usize,
    ) -> SegmentResult<SegmentationResult> {
        let headings = detect_headings(text);
        let (segments, method) = if headings.len() >= MIN_HEADINGS {
            (
                self.segment_by_headings(text, &headings, budget)?,
                SegmentMethod::Chapter,
            )
        } else {
            (
                self.segment_by_token_budget(text, budget)?,
                SegmentMethod::TokenBudget,
            )
        };
        tracing::debug!(
            headings = headings.len(),
            segments = segments.len(),
            budget,
            %method,
            "segmented text"
        );
        Ok(SegmentationResult {
            segments,
            total_tokens,
            method,
        })
    }

    /// One segment per heading, from its line to the next heading's line.
    ///
    /// Chapters over `budget` tokens become "Title (Part N)" sub-segments.
    pub fn segment_by_headings(
        &self,
        text: &str,
        headings: &[Heading],
        budget: usize,
    ) -> SegmentResult<Vec<Segment>> {
        let mut segments = Vec::new();
        for (i, heading) in headings.iter().enumerate() {
            let end = headings.get(i + 1).map_or(text.len(), |h| h.start);
            let tokens = self.counter.count(&text[heading.start..end]);
            if tokens > budget {
                segments.extend(split_oversized(
                    text,
                    heading.start,
                    end,
                    &heading.title,
                    budget,
                    self.counter.as_ref(),
                    segments.len(),
                )?);
            } else {
                segments.push(Segment::new(
                    segments.len(),
                    heading.title.clone(),
                    heading.start,
                    end,
                    tokens,
                )?);
            }
        }
        Ok(segments)
    }

    /// Paragraph-aligned chunks of at most `budget` tokens, titled
    /// "Segment N". A single paragraph over budget stays whole.
    pub fn segment_by_token_budget(&self, text: &str, budget: usize) -> SegmentResult<Vec<Segment>> {
        pack_paragraphs(text, 0, text.len(), budget, self.counter.as_ref())
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                Segment::new(i, format!("Segment {}", i + 1), chunk.start, chunk.end, chunk.tokens)
                    .map_err(SegmentError::from)
            })
            .collect()
    }
}

/// Find chapter-like headings, sorted by position with near-duplicates
/// removed.
pub fn detect_headings(text: &str) -> Vec<Heading> {
    let mut seen = HashSet::new();
    let mut headings = Vec::new();

    for pattern in HEADING_PATTERNS.iter() {
        for m in pattern.find_iter(text) {
            if !seen.insert(m.start()) {
                continue;
            }
            let line_start = text[..m.start()].rfind('\n').map_or(0, |i| i + 1);
            let line_end = text[m.end()..]
                .find('\n')
                .map_or(text.len(), |i| m.end() + i);
            let title = text[line_start..line_end].trim();
            let len = title.chars().count();
            if !(3..=100).contains(&len) {
                continue;
            }
            headings.push(Heading {
                title: title.to_string(),
                start: line_start,
                end: line_end,
            });
        }
    }

    headings.sort_by_key(|h| h.start);

    let mut filtered: Vec<Heading> = Vec::with_capacity(headings.len());
    for heading in headings {
        match filtered.last() {
            Some(last) if heading.start - last.start <= HEADING_MIN_GAP => {}
            _ => filtered.push(heading),
        }
    }
    filtered
}

/// A paragraph: `text[start..end]`, plus its trimmed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph<'a> {
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
}

/// Split on blank lines. Whitespace-only paragraphs are dropped.
pub fn split_paragraphs(text: &str) -> Vec<Paragraph<'_>> {
    let mut paragraphs = Vec::new();
    let mut last_end = 0;
    for m in PARAGRAPH_BREAK.find_iter(text) {
        let body = text[last_end..m.start()].trim();
        if !body.is_empty() {
            paragraphs.push(Paragraph {
                start: last_end,
                end: m.start(),
                text: body,
            });
        }
        last_end = m.end();
    }
    let body = text[last_end..].trim();
    if !body.is_empty() {
        paragraphs.push(Paragraph {
            start: last_end,
            end: text.len(),
            text: body,
        });
    }
    paragraphs
}

/// A packed run of paragraphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Chunk {
    pub start: usize,
    pub end: usize,
    pub tokens: usize,
}

/// Greedily pack the paragraphs of `text[start..end]` into chunks of at
/// most `budget` tokens.
///
/// Chunk boundaries sit at the start of the paragraph that would have
/// overflowed, so the chunks tile `start..end` exactly. Empty when the span
/// has no paragraphs.
pub(crate) fn pack_paragraphs(
    text: &str,
    start: usize,
    end: usize,
    budget: usize,
    counter: &dyn TokenCounter,
) -> Vec<Chunk> {
    let mut groups: Vec<(usize, usize)> = Vec::new(); // (first paragraph start, tokens)
    let mut current: Option<(usize, usize)> = None;

    for para in split_paragraphs(&text[start..end]) {
        let para_tokens = counter.count(para.text);
        let para_start = start + para.start;
        current = match current {
            Some((first, tokens)) if tokens + para_tokens > budget => {
                groups.push((first, tokens));
                Some((para_start, para_tokens))
            }
            Some((first, tokens)) => Some((first, tokens + para_tokens)),
            None => Some((para_start, para_tokens)),
        };
    }
    groups.extend(current);

    let n = groups.len();
    (0..n)
        .map(|i| Chunk {
            start: if i == 0 { start } else { groups[i].0 },
            end: if i + 1 == n { end } else { groups[i + 1].0 },
            tokens: groups[i].1,
        })
        .collect()
}

/// Re-split an oversized span into "Title (Part N)" segments. A span that
/// packs into a single chunk keeps its plain title.
pub(crate) fn split_oversized(
    text: &str,
    start: usize,
    end: usize,
    title: &str,
    budget: usize,
    counter: &dyn TokenCounter,
    first_index: usize,
) -> SegmentResult<Vec<Segment>> {
    let chunks = pack_paragraphs(text, start, end, budget, counter);
    if chunks.len() <= 1 {
        let tokens = chunks
            .first()
            .map_or_else(|| counter.count(&text[start..end]), |c| c.tokens);
        return Ok(vec![Segment::new(first_index, title, start, end, tokens)?]);
    }
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            Segment::new(
                first_index + i,
                format!("{title} (Part {})", i + 1),
                c.start,
                c.end,
                c.tokens,
            )
            .map_err(SegmentError::from)
        })
        .collect()
}

/// Largest char boundary at or below `index`.
pub(crate) fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut i = index;
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}
