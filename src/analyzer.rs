//! Book analysis: token counting and strategy selection.

use std::sync::Arc;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::StrategyConfig;
use crate::schema::{BookMetadata, Strategy};
use crate::tokenizer::TokenCounter;

/// Texts shorter than this (after trimming) are treated as corrupt input.
pub const MIN_TEXT_CHARS: usize = 100;

/// Floor on tokens per estimated segment, so moderately long books are not
/// over-segmented.
pub const MIN_TOKENS_PER_SEGMENT: usize = 10_000;

/// Errors from book analysis.
#[derive(Debug, Error, Diagnostic)]
pub enum AnalysisError {
    #[error("book \"{barcode}\" has no text")]
    #[diagnostic(
        code(grokken::analysis::empty),
        help("The source row's `text` column is empty. Re-run the cleaning step for this book.")
    )]
    EmptyText { barcode: String },

    #[error("book \"{barcode}\" text is too short ({chars} chars, minimum {min})")]
    #[diagnostic(
        code(grokken::analysis::too_short),
        help("Very short texts are usually placeholders or failed OCR exports.")
    )]
    TooShort {
        barcode: String,
        chars: usize,
        min: usize,
    },
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

/// What the analyzer found out about one book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookAnalysis {
    pub barcode: String,
    pub title: String,
    pub author: String,
    pub date: String,
    pub token_count: usize,
    pub char_count: usize,
    pub strategy: Strategy,
    /// Advisory; the segmenter decides the real count.
    pub estimated_segments: usize,
}

impl BookAnalysis {
    pub fn needs_segmentation(&self) -> bool {
        self.strategy == Strategy::LongBook
    }
}

/// Classifies books as short or long and estimates segment counts.
pub struct Analyzer {
    counter: Arc<dyn TokenCounter>,
    config: StrategyConfig,
}

impl Analyzer {
    pub fn new(counter: Arc<dyn TokenCounter>, config: StrategyConfig) -> Self {
        Self { counter, config }
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    /// Analyze one book's text.
    pub fn analyze(&self, text: &str, meta: &BookMetadata) -> AnalysisResult<BookAnalysis> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(AnalysisError::EmptyText {
                barcode: meta.barcode.clone(),
            });
        }
        let trimmed_chars = trimmed.chars().count();
        if trimmed_chars < MIN_TEXT_CHARS {
            return Err(AnalysisError::TooShort {
                barcode: meta.barcode.clone(),
                chars: trimmed_chars,
                min: MIN_TEXT_CHARS,
            });
        }

        let token_count = self.count_tokens(text);
        let (strategy, estimated_segments) = if token_count < self.config.short_book_threshold {
            (Strategy::ShortBook, 1)
        } else {
            (Strategy::LongBook, self.estimate_segments(token_count))
        };

        tracing::debug!(
            barcode = %meta.barcode,
            tokens = token_count,
            %strategy,
            estimated_segments,
            "analyzed book"
        );

        Ok(BookAnalysis {
            barcode: meta.barcode.clone(),
            title: meta.title.clone(),
            author: meta.author.clone(),
            date: meta.date.clone(),
            token_count,
            char_count: text.chars().count(),
            strategy,
            estimated_segments,
        })
    }

    /// Most segments whose summaries still fit, with a quarter of the
    /// context window held back for prompt and output.
    pub fn max_segments(&self) -> usize {
        let available = self.config.max_context_tokens - self.config.max_context_tokens / 4;
        (available / self.config.segment_summary_tokens.max(1)).max(1)
    }

    /// Advisory segment count for a long book.
    pub fn estimate_segments(&self, token_count: usize) -> usize {
        let max_segments = self.max_segments();
        let tokens_per_segment = token_count / max_segments;
        let estimated = (token_count / tokens_per_segment.max(MIN_TOKENS_PER_SEGMENT)).max(1);
        estimated.min(max_segments)
    }
}
