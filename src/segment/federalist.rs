//! *The Federalist*, vol. I (1864 reprint).
//!
//! A long editor's introduction on publication history and authorship,
//! then the essays. Essay headers appear either on one line
//! (`THE FEDERALIST. No. I.`) or split, with a newspaper attribution between
//! `THE` and `FEDERALIST.`.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::schema::Segment;
use crate::segment::{SegmentResult, SegmentationHandler, pack_paragraphs};
use crate::tokenizer::TokenCounter;

/// The introduction alone runs past 60k tokens; it is split into parts no
/// larger than this.
const MAX_INTRO_TOKENS: usize = 32_000;

static ESSAY_SAME_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^THE FEDERALIST\.\s+No\.\s+([IVXLC]+)").unwrap());
static ESSAY_SPLIT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^THE\n(?:.+\n)?FEDERALIST\.\s+No\.\s+([IVXLC]+)").unwrap());
static INTRODUCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^INTRODUCTION\.\s*$").unwrap());
static END_OF_VOLUME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"END OF VOL\.\s*I\.\s*\n").unwrap());

pub struct FederalistHandler;

impl FederalistHandler {
    /// `(roman numeral, offset)` of every essay header, in text order.
    fn essay_positions(content: &str) -> Vec<(String, usize)> {
        let mut positions: Vec<(String, usize)> = ESSAY_SAME_LINE
            .captures_iter(content)
            .chain(ESSAY_SPLIT_LINE.captures_iter(content))
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let roman = caps.get(1)?;
                Some((roman.as_str().to_string(), whole.start()))
            })
            .collect();
        positions.sort_by_key(|&(_, pos)| pos);
        positions.dedup_by_key(|&mut (_, pos)| pos);
        positions
    }
}

impl SegmentationHandler for FederalistHandler {
    fn barcode(&self) -> &'static str {
        "32044072043805"
    }

    fn title(&self) -> &'static str {
        "The Federalist"
    }

    fn get_content_start(&self, text: &str) -> usize {
        if text.starts_with("INTRODUCTION.") {
            return 0;
        }
        INTRODUCTION.find(text).map_or(0, |m| m.start())
    }

    fn get_content_end(&self, text: &str) -> usize {
        END_OF_VOLUME.find(text).map_or(text.len(), |m| m.end())
    }

    fn get_segments(&self, text: &str, counter: &dyn TokenCounter) -> SegmentResult<Vec<Segment>> {
        let start = self.get_content_start(text);
        let end = self.get_content_end(text).max(start);
        let essays = Self::essay_positions(&text[start..end]);

        let intro_end = essays.first().map_or(end, |&(_, pos)| start + pos);
        let intro_tokens = counter.count(&text[start..intro_end]);

        let mut segments = Vec::new();
        if intro_tokens > MAX_INTRO_TOKENS {
            let chunks = pack_paragraphs(text, start, intro_end, MAX_INTRO_TOKENS, counter);
            let n = chunks.len();
            for (i, chunk) in chunks.into_iter().enumerate() {
                segments.push(Segment::new(
                    segments.len(),
                    format!("Introduction (Part {}/{n})", i + 1),
                    chunk.start,
                    chunk.end,
                    chunk.tokens,
                )?);
            }
        } else if intro_end > start {
            segments.push(Segment::new(0, "Introduction", start, intro_end, intro_tokens)?);
        }

        for (i, (roman, pos)) in essays.iter().enumerate() {
            let seg_start = start + pos;
            let seg_end = essays.get(i + 1).map_or(end, |&(_, next)| start + next);
            segments.push(Segment::new(
                segments.len(),
                format!("Federalist No. {roman}"),
                seg_start,
                seg_end,
                counter.count(&text[seg_start..seg_end]),
            )?);
        }
        Ok(segments)
    }

    fn preprocess_for_generation<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let start = self.get_content_start(text);
        let end = self.get_content_end(text);
        if start < end {
            Cow::Borrowed(&text[start..end])
        } else {
            Cow::Borrowed(text)
        }
    }
}
