//! Generation orchestrator.
//!
//! Drives each book through `pending → segmenting → summarizing →
//! qa_generation → complete`. Short books take one summarization call; long
//! books are segmented and summarized progressively, each segment prompt
//! carrying every earlier summary, with a checkpoint after every
//! `checkpoint_every` segments so an interrupted run resumes where it left
//! off.
//!
//! Processing is strictly sequential: segment N's prompt depends on the
//! summaries of 0..N, and each Q&A turn on the conversation before it.

mod checkpoint;
mod error;
pub mod output;

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::analyzer::{Analyzer, BookAnalysis};
use crate::clean::BookCatalog;
use crate::config::GenerationConfig;
use crate::prompts::{self, Prompt, SegmentPromptInput};
use crate::provider::{GenerationParams, GenerationResult, LlmProvider, TokenUsage};
use crate::reader::{SimulatedReader, SummaryInput};
use crate::schema::{
    BookMetadata, BookSummaryRecord, ChatMessage, ProcessingStatus, Segment, SegmentSummary,
    Strategy,
};
use crate::segment::{HandlerRegistry, SegmentMethod, Segmenter};
use crate::source::SourceTable;
use crate::tokenizer::TokenCounter;

pub use checkpoint::{CheckpointStore, verify_resume, verify_segments};
pub use error::{CheckpointError, CheckpointResult, GeneratorError, GeneratorResult};
pub use output::FailedBook;

/// Progress sink: `(message, current, total)`.
pub type ProgressFn = Box<dyn FnMut(&str, usize, usize)>;

/// Outcome of a run across one or more books.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineResult {
    pub records: Vec<BookSummaryRecord>,
    pub failures: Vec<FailedBook>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost: f64,
    /// Provider calls made, successful or not for the book.
    pub total_calls: usize,
    /// The run stopped early on an interrupt.
    pub interrupted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_data_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures_path: Option<PathBuf>,
}

impl PipelineResult {
    pub fn success_count(&self) -> usize {
        self.records.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    fn add_usage(&mut self, usage: &TokenUsage) {
        self.total_calls += usage.calls;
        self.total_input_tokens += usage.input_tokens;
        self.total_output_tokens += usage.output_tokens;
        self.total_cost += usage.cost;
    }
}

/// The generation pipeline for one run configuration.
pub struct Generator {
    config: GenerationConfig,
    provider: Box<dyn LlmProvider>,
    counter: Arc<dyn TokenCounter>,
    analyzer: Analyzer,
    segmenter: Segmenter,
    handlers: Arc<HandlerRegistry>,
    catalog: Arc<BookCatalog>,
    checkpoints: CheckpointStore,
    rng: StdRng,
    usage: TokenUsage,
    interrupt: Arc<AtomicBool>,
    progress: Option<ProgressFn>,
}

impl Generator {
    pub fn new(
        config: GenerationConfig,
        provider: Box<dyn LlmProvider>,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            analyzer: Analyzer::new(Arc::clone(&counter), config.strategy.clone()),
            segmenter: Segmenter::new(Arc::clone(&counter), config.strategy.clone()),
            checkpoints: CheckpointStore::new(config.output_dir.clone()),
            handlers: Arc::new(HandlerRegistry::builtin()),
            catalog: Arc::new(BookCatalog::builtin()),
            rng,
            usage: TokenUsage::default(),
            interrupt: Arc::new(AtomicBool::new(false)),
            progress: None,
            config,
            provider,
            counter,
        }
    }

    /// Replace the per-book segmentation handlers.
    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Arc::new(handlers);
        self
    }

    /// Replace the catalog used to resolve collection names.
    pub fn with_catalog(mut self, catalog: BookCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    /// Stop cleanly once `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    fn report(&mut self, message: &str, current: usize, total: usize) {
        tracing::info!(current, total, "{message}");
        if let Some(progress) = self.progress.as_mut() {
            progress(message, current, total);
        }
    }

    fn check_interrupt(&self) -> GeneratorResult<()> {
        if self.interrupt.load(Ordering::SeqCst) {
            return Err(GeneratorError::Interrupted);
        }
        Ok(())
    }

    /// Barcodes this run covers.
    fn targets(&self) -> GeneratorResult<Vec<String>> {
        if let Some(barcode) = &self.config.barcode {
            return Ok(vec![barcode.clone()]);
        }
        let name = self.config.collection.as_deref().unwrap_or_default();
        self.catalog
            .collection_barcodes(name)
            .map(|barcodes| barcodes.into_iter().map(str::to_string).collect())
            .ok_or_else(|| GeneratorError::UnknownCollection {
                name: name.to_string(),
            })
    }

    /// Process every targeted book, then write the combined outputs.
    ///
    /// Per-book failures are recorded and the run moves on; only setup
    /// problems (unknown collection, unwritable output) fail the run.
    pub fn run(&mut self, source: &SourceTable) -> GeneratorResult<PipelineResult> {
        let barcodes = self.targets()?;
        let mut result = PipelineResult::default();
        self.usage = TokenUsage::default();

        if let Some(collection) = &self.config.collection {
            tracing::info!(collection = %collection, books = barcodes.len(), "processing collection");
        }

        let total = barcodes.len();
        for (i, barcode) in barcodes.iter().enumerate() {
            if total > 1 {
                self.report(&format!("Book {}/{total}: {barcode}", i + 1), i + 1, total);
            }
            match self.process_book(barcode, source) {
                Ok(record) => result.records.push(record),
                Err(GeneratorError::Interrupted) => {
                    tracing::warn!(barcode = %barcode, "interrupted, last checkpoint kept");
                    result.failures.push(FailedBook {
                        barcode: barcode.clone(),
                        error: GeneratorError::Interrupted.to_string(),
                    });
                    result.interrupted = true;
                    let remaining = &barcodes[i + 1..];
                    if !remaining.is_empty() {
                        tracing::warn!(
                            remaining = remaining.len(),
                            barcodes = ?remaining,
                            "books not attempted before the interrupt"
                        );
                    }
                    result.failures.extend(remaining.iter().map(|barcode| FailedBook {
                        barcode: barcode.clone(),
                        error: GeneratorError::NotAttempted.to_string(),
                    }));
                    break;
                }
                Err(e) => {
                    tracing::error!(barcode = %barcode, error = %e, "book failed");
                    result.failures.push(FailedBook {
                        barcode: barcode.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        result.add_usage(&self.usage);
        let dir = self.config.output_dir.clone();
        if !result.records.is_empty() {
            let path = output::write_training_data(&dir, &result.records)?;
            tracing::info!(path = %path.display(), records = result.records.len(), "saved training data");
            result.training_data_path = Some(path);
        }
        if !result.failures.is_empty() {
            let path = output::write_failures(&dir, &result.failures)?;
            tracing::warn!(
                failed = result.failure_count(),
                path = %path.display(),
                "some books failed to process"
            );
            result.failures_path = Some(path);
        }

        tracing::info!(
            succeeded = result.success_count(),
            failed = result.failure_count(),
            input_tokens = result.total_input_tokens,
            output_tokens = result.total_output_tokens,
            cost = result.total_cost,
            "generation complete"
        );
        Ok(result)
    }

    /// Run one book to completion and save its result file.
    pub fn process_book(
        &mut self,
        barcode: &str,
        source: &SourceTable,
    ) -> GeneratorResult<BookSummaryRecord> {
        self.check_interrupt()?;
        let row = source.get(barcode)?;
        let meta = row.metadata();

        let handlers = Arc::clone(&self.handlers);
        let handler = handlers.get(barcode);
        let text: Cow<'_, str> = match handler {
            Some(h) => h.preprocess_for_generation(&row.text),
            None => Cow::Borrowed(row.text.as_str()),
        };

        let analysis = self.analyzer.analyze(&text, &meta)?;
        self.report(
            &format!(
                "Book analysis: {} tokens, strategy={}",
                prompts::format_thousands(analysis.token_count),
                analysis.strategy
            ),
            0,
            0,
        );

        let resume = self.resume_record(barcode, &analysis)?;
        let record = match analysis.strategy {
            Strategy::ShortBook => self.process_short_book(&meta, &text, &analysis)?,
            Strategy::LongBook => self.process_long_book(&meta, &text, &analysis, resume)?,
        };

        let path = output::write_record(&self.config.output_dir, &record)?;
        self.checkpoints.remove(barcode)?;
        tracing::info!(barcode, path = %path.display(), "saved result");
        Ok(record)
    }

    /// The checkpointed record to resume `barcode` from, if any.
    fn resume_record(
        &self,
        barcode: &str,
        analysis: &BookAnalysis,
    ) -> GeneratorResult<Option<BookSummaryRecord>> {
        let mut checkpoint = None;
        if let Some(path) = &self.config.resume_from {
            let loaded = CheckpointStore::load_file(path)?;
            if loaded.barcode == barcode || self.config.collection.is_none() {
                tracing::info!(barcode, path = %path.display(), "resuming from checkpoint");
                checkpoint = Some(loaded);
            }
        }
        if checkpoint.is_none() && self.config.auto_resume {
            checkpoint = self.checkpoints.load(barcode)?;
            if checkpoint.is_some() {
                tracing::info!(barcode, "found checkpoint in output directory");
            }
        }
        let Some(checkpoint) = checkpoint else {
            return Ok(None);
        };

        verify_resume(&checkpoint, barcode, analysis.strategy)?;
        if analysis.strategy == Strategy::ShortBook {
            tracing::warn!(
                barcode,
                "ignoring checkpoint for short book, short books are processed in a single pass"
            );
            return Ok(None);
        }
        Ok(Some(checkpoint.record))
    }

    fn process_short_book(
        &mut self,
        meta: &BookMetadata,
        text: &str,
        analysis: &BookAnalysis,
    ) -> GeneratorResult<BookSummaryRecord> {
        self.report(&format!("Processing short book: {}", meta.title), 0, 1);
        let mut record = BookSummaryRecord::new(
            meta,
            Strategy::ShortBook,
            analysis.token_count,
            self.provider.model_name(),
        );
        record.advance(ProcessingStatus::Summarizing)?;

        self.check_interrupt()?;
        let prompt = prompts::format_short_book_prompt(
            &meta.title,
            &meta.author,
            &meta.date,
            text,
            analysis.token_count,
            self.config.strategy.final_summary_tokens,
        );
        let result = self.summarize(&prompt, &meta.barcode, "summary")?;
        record.final_summary = result.text;
        record.final_context_tokens = result.input_tokens;
        self.report("Summary generated", 1, 1);

        record.advance(ProcessingStatus::QaGeneration)?;
        self.check_interrupt()?;
        let summaries = [SummaryInput {
            title: &record.title,
            summary: &record.final_summary,
        }];
        let conversation = self.converse(meta, &summaries, self.config.strategy.qa_turns.max(1));
        self.check_interrupt()?;
        self.report(&qa_message(&conversation), 1, 1);
        record.qa_conversation = conversation;

        record.advance(ProcessingStatus::Complete)?;
        Ok(record)
    }

    fn process_long_book(
        &mut self,
        meta: &BookMetadata,
        text: &str,
        analysis: &BookAnalysis,
        resume: Option<BookSummaryRecord>,
    ) -> GeneratorResult<BookSummaryRecord> {
        self.report(&format!("Processing long book: {}", meta.title), 0, 0);
        let mut record = match resume {
            Some(record) => {
                self.report(
                    &format!("Resuming from segment {}", record.current_segment),
                    record.current_segment,
                    record.segments.len(),
                );
                record
            }
            None => {
                let mut record = BookSummaryRecord::new(
                    meta,
                    Strategy::LongBook,
                    analysis.token_count,
                    self.provider.model_name(),
                );
                record.advance(ProcessingStatus::Segmenting)?;
                record
            }
        };

        if record.segments.is_empty() {
            self.check_interrupt()?;
            let (segments, method) = self.segment_book(&meta.barcode, text)?;
            self.report(
                &format!("Created {} segments using {method} method", segments.len()),
                0,
                segments.len(),
            );
            record.segments = segments;
        }
        verify_segments(&record, text.len())?;
        record.advance(record.status().max(ProcessingStatus::Summarizing))?;

        self.complete_pending_segment_qa(meta, &mut record)?;

        let total = record.segments.len();
        for i in record.current_segment..total {
            self.check_interrupt()?;
            let segment = record.segments[i].clone();
            self.report(
                &format!("Summarizing segment {}/{total}: {}", i + 1, segment.title()),
                i + 1,
                total,
            );

            let segment_text = segment.text(text).ok_or_else(|| CheckpointError::StaleSegments {
                barcode: meta.barcode.clone(),
                index: i,
                end: segment.end_char(),
                text_len: text.len(),
            })?;
            let accumulated = record.accumulated_summaries();
            let prompt = prompts::format_segment_prompt(&SegmentPromptInput {
                title: &meta.title,
                author: &meta.author,
                segment_index: i,
                total_segments: total,
                segment_title: segment.title(),
                segment_text,
                accumulated_summaries: Some(accumulated.as_str()).filter(|s| !s.is_empty()),
                target_tokens: self.config.strategy.segment_summary_tokens,
            });
            let result = self.summarize(&prompt, &meta.barcode, &format!("segment {} summary", i + 1))?;
            let summary = SegmentSummary::new(&segment, prompt.system, prompt.user, &result);
            self.report(&format!("Segment {} summarized", i + 1), i + 1, total);

            let conversation = self.segment_qa(meta, &segment, &summary);
            record.push_segment_summary(summary);
            match conversation {
                Some(conversation) => record.segment_qa_conversations.push(conversation),
                None => {
                    record.segment_qa_conversations.push(Vec::new());
                    record.pending_segment_qa.push(i);
                }
            }

            if self.interrupt.load(Ordering::SeqCst) {
                self.checkpoints.save(&self.config.name, &record)?;
                return Err(GeneratorError::Interrupted);
            }
            if (i + 1) % self.config.checkpoint_every == 0 {
                self.checkpoints.save(&self.config.name, &record)?;
            }
        }
        self.checkpoints.save(&self.config.name, &record)?;

        if record.final_summary.is_empty() {
            self.check_interrupt()?;
            self.report("Generating final summary", total, total);
            let prompt = prompts::format_final_summary_prompt(
                &meta.title,
                &meta.author,
                &meta.date,
                &record.accumulated_summaries(),
                total,
                self.config.strategy.final_summary_tokens,
            );
            let result = self.summarize(&prompt, &meta.barcode, "final summary")?;
            record.final_summary = result.text;
            record.final_context_tokens = result.input_tokens;
            self.checkpoints.save(&self.config.name, &record)?;
        } else {
            tracing::info!(barcode = %meta.barcode, "final summary already present, skipping");
        }

        record.advance(ProcessingStatus::QaGeneration)?;
        if record.qa_conversation.is_empty() {
            self.check_interrupt()?;
            let summaries: Vec<SummaryInput<'_>> = record
                .segment_summaries
                .iter()
                .map(|s| SummaryInput {
                    title: &s.segment_title,
                    summary: &s.summary,
                })
                .collect();
            let turns = (self.config.strategy.qa_turns / summaries.len().max(1)).max(1);
            let conversation = self.converse(meta, &summaries, turns);
            self.check_interrupt()?;
            self.report(&qa_message(&conversation), total, total);
            record.qa_conversation = conversation;
            self.checkpoints.save(&self.config.name, &record)?;
        }

        record.advance(ProcessingStatus::Complete)?;
        Ok(record)
    }

    /// Segments for `barcode`, from its custom handler when one is
    /// registered.
    fn segment_book(
        &self,
        barcode: &str,
        text: &str,
    ) -> GeneratorResult<(Vec<Segment>, SegmentMethod)> {
        match self.handlers.get(barcode) {
            Some(handler) => {
                tracing::info!(barcode, handler = handler.title(), "using custom segmentation handler");
                let segments = handler.get_segments(text, self.counter.as_ref())?;
                Ok((segments, SegmentMethod::CustomHandler))
            }
            None => {
                let result = self.segmenter.segment(text)?;
                Ok((result.segments, result.method))
            }
        }
    }

    /// One summarization call. Truncated or empty output fails the book.
    fn summarize(
        &mut self,
        prompt: &Prompt,
        barcode: &str,
        what: &str,
    ) -> GeneratorResult<GenerationResult> {
        let params = GenerationParams::new()
            .temperature(self.config.provider.temperature)
            .max_tokens(self.config.provider.max_tokens);
        let result = self
            .provider
            .generate(&prompt.user, Some(&prompt.system), &params)?;
        self.usage.record(&*self.provider, &result);
        tracing::debug!(
            barcode,
            what,
            input_tokens = result.input_tokens,
            output_tokens = result.output_tokens,
            "summarization call finished"
        );

        if result.is_truncated() {
            return Err(GeneratorError::TruncatedOutput {
                barcode: barcode.to_string(),
                what: what.to_string(),
                finish_reason: result.finish_reason.to_string(),
            });
        }
        if result.text.trim().is_empty() {
            return Err(GeneratorError::EmptyOutput {
                barcode: barcode.to_string(),
                what: what.to_string(),
            });
        }
        Ok(result)
    }

    /// Redo per-segment Q&A that an interrupt cut short in an earlier run.
    fn complete_pending_segment_qa(
        &mut self,
        meta: &BookMetadata,
        record: &mut BookSummaryRecord,
    ) -> GeneratorResult<()> {
        while let Some(&index) = record.pending_segment_qa.first() {
            self.check_interrupt()?;
            let segment = record.segments[index].clone();
            let summary = record.segment_summaries[index].clone();
            tracing::info!(barcode = %meta.barcode, segment = index, "regenerating interrupted segment Q&A");
            let Some(conversation) = self.segment_qa(meta, &segment, &summary) else {
                self.checkpoints.save(&self.config.name, record)?;
                return Err(GeneratorError::Interrupted);
            };
            record.segment_qa_conversations[index] = conversation;
            record.pending_segment_qa.remove(0);
            self.checkpoints.save(&self.config.name, record)?;
        }
        Ok(())
    }

    /// Per-segment Q&A, unless disabled or the summarization round-trip is
    /// already near the training sequence length.
    ///
    /// `None` when an interrupt stopped the conversation part way.
    fn segment_qa(
        &mut self,
        meta: &BookMetadata,
        segment: &Segment,
        summary: &SegmentSummary,
    ) -> Option<Vec<ChatMessage>> {
        if !self.config.qa.segment_qa {
            return Some(Vec::new());
        }
        let round_trip = summary.round_trip_tokens();
        let threshold = self.config.qa.segment_qa_token_threshold;
        if round_trip >= threshold {
            tracing::warn!(
                barcode = %meta.barcode,
                segment = segment.index(),
                tokens = round_trip,
                threshold,
                "skipping per-segment Q&A, summarization round-trip too large"
            );
            return Some(Vec::new());
        }
        let summaries = [SummaryInput {
            title: segment.title(),
            summary: &summary.summary,
        }];
        let conversation = self.converse(meta, &summaries, self.config.qa.segment_qa_turns);
        if self.interrupt.load(Ordering::SeqCst) {
            tracing::warn!(
                barcode = %meta.barcode,
                segment = segment.index(),
                "segment Q&A interrupted, will be regenerated on resume"
            );
            return None;
        }
        tracing::info!(
            segment = segment.index(),
            turns = count_answers(&conversation),
            tokens = round_trip,
            "segment Q&A generated"
        );
        Some(conversation)
    }

    /// Run the simulated reader over `summaries`, folding its usage into
    /// the run totals.
    fn converse(
        &mut self,
        meta: &BookMetadata,
        summaries: &[SummaryInput<'_>],
        turns_per_segment: usize,
    ) -> Vec<ChatMessage> {
        let Self {
            config,
            provider,
            rng,
            usage,
            interrupt,
            progress,
            ..
        } = self;
        let mut reader = SimulatedReader::new(&**provider, config.qa.clone(), &mut *rng)
            .with_interrupt(Arc::clone(interrupt));
        let temperature = config.provider.temperature;
        let conversation = match progress.as_mut() {
            Some(progress) => reader.generate_multiturn_qa_with_progress(
                &meta.title,
                &meta.author,
                summaries,
                turns_per_segment,
                temperature,
                &mut **progress,
            ),
            None => reader.generate_multiturn_qa(
                &meta.title,
                &meta.author,
                summaries,
                turns_per_segment,
                temperature,
            ),
        };
        usage.add(&reader.usage());
        conversation
    }
}

fn count_answers(conversation: &[ChatMessage]) -> usize {
    conversation
        .iter()
        .filter(|m| m.role == crate::schema::Role::Assistant)
        .count()
}

fn qa_message(conversation: &[ChatMessage]) -> String {
    format!(
        "Generated multi-turn Q&A: {} messages ({} turns)",
        conversation.len(),
        count_answers(conversation)
    )
}
