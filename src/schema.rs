//! Records produced by the generation pipeline.
//!
//! These types are what gets checkpointed, written as per-book results, and
//! flattened into training data. Validation happens in constructors and in
//! [`BookSummaryRecord::validate`], which every checkpoint load runs.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::GenerationResult;

/// Errors from record construction and validation.
#[derive(Debug, Error, Diagnostic)]
pub enum SchemaError {
    #[error("invalid segment span {start}..{end} for segment {index}")]
    #[diagnostic(
        code(grokken::schema::segment_span),
        help("Segment offsets must satisfy start <= end.")
    )]
    SegmentSpan {
        index: usize,
        start: usize,
        end: usize,
    },

    #[error("cannot move status backwards from {from} to {to}")]
    #[diagnostic(
        code(grokken::schema::status),
        help("Status only moves forward: pending, segmenting, summarizing, qa_generation, complete.")
    )]
    BackwardsStatus {
        from: ProcessingStatus,
        to: ProcessingStatus,
    },

    #[error("inconsistent record for \"{barcode}\": {message}")]
    #[diagnostic(
        code(grokken::schema::inconsistent),
        help("The checkpoint was edited or written by an incompatible version. Delete it to start over.")
    )]
    Inconsistent { barcode: String, message: String },
}

pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

// ── Messages ────────────────────────────────────────────────────────────

/// Chat role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One role/content message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ── Book identity ───────────────────────────────────────────────────────

/// Bibliographic identity of a source document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub barcode: String,
    pub title: String,
    pub author: String,
    pub date: String,
}

/// How a book is summarized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Fits in one context window: one summarization call.
    ShortBook,
    /// Segmented and progressively summarized.
    LongBook,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShortBook => write!(f, "short_book"),
            Self::LongBook => write!(f, "long_book"),
        }
    }
}

// ── Segments ────────────────────────────────────────────────────────────

/// A contiguous span of a document's text.
///
/// Offsets are UTF-8 byte positions into the (preprocessed) source text and
/// always fall on character boundaries. Segments are immutable; the
/// orchestrator only indexes into them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    index: usize,
    title: String,
    start_char: usize,
    end_char: usize,
    token_count: usize,
}

impl Segment {
    pub fn new(
        index: usize,
        title: impl Into<String>,
        start_char: usize,
        end_char: usize,
        token_count: usize,
    ) -> SchemaResult<Self> {
        if start_char > end_char {
            return Err(SchemaError::SegmentSpan {
                index,
                start: start_char,
                end: end_char,
            });
        }
        Ok(Self {
            index,
            title: title.into(),
            start_char,
            end_char,
            token_count,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn start_char(&self) -> usize {
        self.start_char
    }

    pub fn end_char(&self) -> usize {
        self.end_char
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn char_count(&self) -> usize {
        self.end_char - self.start_char
    }

    /// The segment's span of `source`, or `None` if the span does not fit it.
    pub fn text<'a>(&self, source: &'a str) -> Option<&'a str> {
        source.get(self.start_char..self.end_char)
    }
}

/// The durable result of summarizing one segment.
///
/// Keeps the exact prompts so the (system, user, assistant) triple can be
/// replayed as a training conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub segment_index: usize,
    pub segment_title: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub summary: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}

impl SegmentSummary {
    pub fn new(
        segment: &Segment,
        system_prompt: String,
        user_prompt: String,
        result: &GenerationResult,
    ) -> Self {
        Self {
            segment_index: segment.index(),
            segment_title: segment.title().to_string(),
            system_prompt,
            user_prompt,
            summary: result.text.clone(),
            input_tokens: result.input_tokens,
            output_tokens: result.output_tokens,
            model: result.model.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Tokens spent on the summarization round-trip.
    pub fn round_trip_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn to_conversation(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(self.user_prompt.clone()),
            ChatMessage::assistant(self.summary.clone()),
        ]
    }
}

// ── Record ──────────────────────────────────────────────────────────────

/// Per-document processing status. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Segmenting,
    Summarizing,
    QaGeneration,
    Complete,
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Segmenting => "segmenting",
            Self::Summarizing => "summarizing",
            Self::QaGeneration => "qa_generation",
            Self::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// The aggregate for one document's processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSummaryRecord {
    pub barcode: String,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub date: String,
    pub strategy: Strategy,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub segment_summaries: Vec<SegmentSummary>,
    /// One conversation per summarized segment; empty when skipped.
    #[serde(default)]
    pub segment_qa_conversations: Vec<Vec<ChatMessage>>,
    /// Segments whose Q&A was cut short by an interrupt and must be redone.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_segment_qa: Vec<usize>,
    #[serde(default)]
    pub final_summary: String,
    #[serde(default)]
    pub qa_conversation: Vec<ChatMessage>,
    pub source_tokens: usize,
    /// Input tokens of the call that produced the final summary.
    #[serde(default)]
    pub final_context_tokens: u64,
    pub model: String,
    pub timestamp: DateTime<Utc>,
    status: ProcessingStatus,
    /// Next segment to summarize.
    #[serde(default)]
    pub current_segment: usize,
}

impl BookSummaryRecord {
    pub fn new(meta: &BookMetadata, strategy: Strategy, source_tokens: usize, model: &str) -> Self {
        Self {
            barcode: meta.barcode.clone(),
            title: meta.title.clone(),
            author: meta.author.clone(),
            date: meta.date.clone(),
            strategy,
            segments: Vec::new(),
            segment_summaries: Vec::new(),
            segment_qa_conversations: Vec::new(),
            pending_segment_qa: Vec::new(),
            final_summary: String::new(),
            qa_conversation: Vec::new(),
            source_tokens,
            final_context_tokens: 0,
            model: model.to_string(),
            timestamp: Utc::now(),
            status: ProcessingStatus::Pending,
            current_segment: 0,
        }
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    /// Move to `next`. Staying put is allowed; going backwards is not.
    pub fn advance(&mut self, next: ProcessingStatus) -> SchemaResult<()> {
        if next < self.status {
            return Err(SchemaError::BackwardsStatus {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.timestamp = Utc::now();
        Ok(())
    }

    /// Append a segment summary and move the resume cursor past it.
    pub fn push_segment_summary(&mut self, summary: SegmentSummary) {
        self.current_segment = summary.segment_index + 1;
        self.segment_summaries.push(summary);
        self.timestamp = Utc::now();
    }

    /// All segment summaries joined with a horizontal-rule separator.
    pub fn accumulated_summaries(&self) -> String {
        self.segment_summaries
            .iter()
            .map(|s| s.summary.as_str())
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }

    /// Source tokens per (approximate) summary token, rounded to 2 places.
    ///
    /// The summary side is `len / 4` rather than a real token count.
    pub fn compression_ratio(&self) -> f64 {
        let approx = self.final_summary.chars().count() / 4;
        if approx == 0 {
            return 0.0;
        }
        (self.source_tokens as f64 / approx as f64 * 100.0).round() / 100.0
    }

    /// Structural checks run on every checkpoint load.
    pub fn validate(&self) -> SchemaResult<()> {
        let fail = |message: String| SchemaError::Inconsistent {
            barcode: self.barcode.clone(),
            message,
        };

        for (i, seg) in self.segments.iter().enumerate() {
            if seg.index() != i {
                return Err(fail(format!("segment at position {i} has index {}", seg.index())));
            }
            if seg.start_char() > seg.end_char() {
                return Err(SchemaError::SegmentSpan {
                    index: i,
                    start: seg.start_char(),
                    end: seg.end_char(),
                });
            }
            if i > 0 && seg.start_char() < self.segments[i - 1].end_char() {
                return Err(fail(format!("segment {i} overlaps segment {}", i - 1)));
            }
        }
        if self.current_segment > self.segments.len() && self.strategy == Strategy::LongBook {
            return Err(fail(format!(
                "cursor {} is past {} segments",
                self.current_segment,
                self.segments.len()
            )));
        }
        if self.segment_summaries.len() != self.current_segment {
            return Err(fail(format!(
                "{} segment summaries but cursor at {}",
                self.segment_summaries.len(),
                self.current_segment
            )));
        }
        for (i, s) in self.segment_summaries.iter().enumerate() {
            if s.segment_index != i {
                return Err(fail(format!(
                    "summary at position {i} is for segment {}",
                    s.segment_index
                )));
            }
        }
        if self.segment_qa_conversations.len() > self.segment_summaries.len() {
            return Err(fail("more segment Q&A conversations than summaries".into()));
        }
        if let Some(&index) = self
            .pending_segment_qa
            .iter()
            .find(|&&i| i >= self.segment_qa_conversations.len())
        {
            return Err(fail(format!("pending Q&A for segment {index} has no conversation slot")));
        }
        Ok(())
    }

    /// Flatten into the JSONL training format.
    pub fn to_training_record(&self) -> TrainingRecord {
        TrainingRecord {
            barcode: self.barcode.clone(),
            title: self.title.clone(),
            author: self.author.clone(),
            date: self.date.clone(),
            strategy: self.strategy,
            source_tokens: self.source_tokens,
            final_context_tokens: self.final_context_tokens,
            compression_ratio: self.compression_ratio(),
            segment_conversations: self
                .segment_summaries
                .iter()
                .map(SegmentSummary::to_conversation)
                .collect(),
            segment_qa_conversations: self.segment_qa_conversations.clone(),
            summary: self.final_summary.clone(),
            qa_conversation: self.qa_conversation.clone(),
            model: self.model.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// One line of `training_data.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub barcode: String,
    pub title: String,
    pub author: String,
    pub date: String,
    pub strategy: Strategy,
    pub source_tokens: usize,
    pub final_context_tokens: u64,
    pub compression_ratio: f64,
    pub segment_conversations: Vec<Vec<ChatMessage>>,
    pub segment_qa_conversations: Vec<Vec<ChatMessage>>,
    pub summary: String,
    pub qa_conversation: Vec<ChatMessage>,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}

/// A point-in-time snapshot of a record, written after each unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub config_name: String,
    pub barcode: String,
    pub record: BookSummaryRecord,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    pub fn from_record(config_name: &str, record: &BookSummaryRecord) -> Self {
        Self {
            config_name: config_name.to_string(),
            barcode: record.barcode.clone(),
            record: record.clone(),
            timestamp: Utc::now(),
        }
    }
}
