//! End-to-end generation runs against a scripted provider.
//!
//! These cover the short and long paths, checkpoint/resume, the per-segment
//! Q&A pressure valve, custom handlers, progress reporting, and per-book
//! failure isolation in collection runs.

mod common;

use std::borrow::Cow;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use grokken::clean::{BookCatalog, BookProcessor};
use grokken::generator::output::{self, FAILURES_FILE, TRAINING_DATA_FILE};
use grokken::generator::{CheckpointStore, Generator, GeneratorError};
use grokken::schema::{BookSummaryRecord, ChatMessage, ProcessingStatus, Role, Segment, Strategy};
use grokken::segment::{HandlerRegistry, SegmentResult, SegmentationHandler};
use grokken::source::BookRow;
use grokken::tokenizer::{ApproximateTokenCounter, TokenCounter};

use common::{SENTENCE, ScriptedProvider, chaptered_book, config, prompts, short_book, table};

fn generator(config: grokken::config::GenerationConfig, provider: ScriptedProvider) -> Generator {
    Generator::new(config, Box::new(provider), Arc::new(ApproximateTokenCounter))
}

#[test]
fn short_book_single_pass() {
    let dir = tempfile::TempDir::new().unwrap();
    let (provider, script) = ScriptedProvider::new();
    let source = table(vec![short_book("s1")]);

    let result = generator(config(dir.path(), "s1"), provider)
        .run(&source)
        .unwrap();

    assert_eq!(result.success_count(), 1);
    assert_eq!(result.failure_count(), 0);
    let record = &result.records[0];
    assert_eq!(record.strategy, Strategy::ShortBook);
    assert_eq!(record.status(), ProcessingStatus::Complete);
    assert!(record.segments.is_empty());
    assert!(record.final_summary.starts_with("Scripted reply 1"));
    assert_eq!(record.final_context_tokens, 1_000);
    assert_eq!(record.qa_conversation[0].role, Role::System);
    assert!(record.qa_conversation.iter().any(|m| m.role == Role::Assistant));

    // Every call is counted, reader calls included.
    let calls = script.lock().unwrap().calls.len();
    assert_eq!(result.total_calls, calls);
    assert_eq!(result.total_input_tokens, calls as u64 * 1_000);
    assert!(result.total_cost > 0.0);

    assert!(output::result_path(dir.path(), "s1").exists());
    let training = std::fs::read_to_string(dir.path().join(TRAINING_DATA_FILE)).unwrap();
    assert_eq!(training.lines().count(), 1);
    assert!(!dir.path().join(FAILURES_FILE).exists());
}

#[test]
fn long_book_carries_context_forward() {
    let dir = tempfile::TempDir::new().unwrap();
    let (provider, script) = ScriptedProvider::new();
    let source = table(vec![chaptered_book("l1", 5, None)]);

    let mut generator = generator(config(dir.path(), "l1"), provider);
    let result = generator.run(&source).unwrap();

    assert_eq!(result.success_count(), 1);
    let record = &result.records[0];
    assert_eq!(record.strategy, Strategy::LongBook);
    assert_eq!(record.segments.len(), 5);
    assert_eq!(record.segment_summaries.len(), 5);
    assert_eq!(record.segment_qa_conversations.len(), 5);
    assert_eq!(record.current_segment, 5);
    assert_eq!(record.segments[2].title(), "CHAPTER III.");
    assert!(!record.final_summary.is_empty());
    assert!(!record.qa_conversation.is_empty());

    let sent = prompts(&script);
    assert!(sent[0].contains("This is segment 1 of 5"));
    assert!(sent[1].contains("This is segment 2 of 5"));
    // Segment 2 sees segment 1's summary; segment 1 had nothing to see.
    let first = &record.segment_summaries[0].summary;
    assert!(sent[1].contains(first.as_str()));
    assert!(!sent[0].contains("Scripted reply"));
    // The final summary is built from every segment summary.
    for summary in &record.segment_summaries {
        assert!(sent[5].contains(summary.summary.as_str()));
    }

    // Finished books leave no checkpoint behind.
    assert!(!generator.checkpoints().path_for("l1").exists());
    let saved = output::read_record(&output::result_path(dir.path(), "l1")).unwrap();
    assert_eq!(saved.segment_summaries.len(), 5);
}

#[test]
fn interrupted_run_resumes_without_repeating_segments() {
    let dir = tempfile::TempDir::new().unwrap();
    let source = table(vec![chaptered_book("l2", 5, None)]);

    let interrupt = Arc::new(AtomicBool::new(false));
    let (provider, script) = ScriptedProvider::new();
    script.lock().unwrap().interrupt_after = Some((2, Arc::clone(&interrupt)));
    let mut first = generator(config(dir.path(), "l2"), provider).with_interrupt(interrupt);
    let result = first.run(&source).unwrap();

    assert!(result.interrupted);
    assert_eq!(result.success_count(), 0);
    assert_eq!(result.failures[0].error, GeneratorError::Interrupted.to_string());
    assert_eq!(script.lock().unwrap().calls.len(), 2);
    let checkpoint = first.checkpoints().load("l2").unwrap().unwrap();
    assert_eq!(checkpoint.record.current_segment, 2);
    assert_eq!(checkpoint.config_name, "pipeline-test");

    let mut resumed_config = config(dir.path(), "l2");
    resumed_config.auto_resume = true;
    let (provider, script) = ScriptedProvider::new();
    script.lock().unwrap().label = "resumed ".into();
    let mut second = generator(resumed_config, provider);
    let result = second.run(&source).unwrap();

    assert_eq!(result.success_count(), 1);
    let sent = prompts(&script);
    assert!(sent[0].contains("This is segment 3 of 5"));
    assert!(!sent.iter().any(|p| p.contains("This is segment 1 of 5")));
    assert!(!sent.iter().any(|p| p.contains("This is segment 2 of 5")));

    let record = &result.records[0];
    assert_eq!(record.segment_summaries.len(), 5);
    assert_eq!(
        record.segment_summaries[0].summary,
        checkpoint.record.segment_summaries[0].summary
    );
    assert!(!record.segment_summaries[1].summary.starts_with("resumed"));
    assert!(record.segment_summaries[2].summary.starts_with("resumed"));
    assert!(!second.checkpoints().path_for("l2").exists());
}

#[test]
fn segment_qa_runs_under_the_threshold() {
    let dir = tempfile::TempDir::new().unwrap();
    let (provider, _script) = ScriptedProvider::new();
    let mut config = config(dir.path(), "l3");
    config.qa.segment_qa = true;
    let source = table(vec![chaptered_book("l3", 4, None)]);

    let result = generator(config, provider).run(&source).unwrap();

    let record = &result.records[0];
    assert_eq!(record.segment_qa_conversations.len(), 4);
    for conversation in &record.segment_qa_conversations {
        assert_eq!(conversation[0].role, Role::System);
        assert!(conversation.iter().any(|m| m.role == Role::Assistant));
    }
    let training = record.to_training_record();
    assert_eq!(training.segment_qa_conversations.len(), 4);
}

#[test]
fn segment_qa_skipped_when_round_trip_too_large() {
    let dir = tempfile::TempDir::new().unwrap();
    let (provider, script) = ScriptedProvider::new();
    script.lock().unwrap().input_tokens = 110_000;
    let mut config = config(dir.path(), "l4");
    config.qa.segment_qa = true;
    let source = table(vec![chaptered_book("l4", 4, None)]);

    let result = generator(config, provider).run(&source).unwrap();

    let record = &result.records[0];
    assert_eq!(record.segment_summaries.len(), 4);
    // One slot per segment, all empty.
    assert_eq!(record.segment_qa_conversations.len(), 4);
    assert!(record.segment_qa_conversations.iter().all(Vec::is_empty));
    assert!(!record.qa_conversation.is_empty());
}

#[test]
fn truncated_segment_fails_the_book_and_keeps_progress() {
    let dir = tempfile::TempDir::new().unwrap();
    let (provider, script) = ScriptedProvider::new();
    script.lock().unwrap().truncate_marker = Some("TRUNCATE-ME".into());
    let source = table(vec![chaptered_book("l5", 4, Some("TRUNCATE-ME"))]);

    let mut generator = generator(config(dir.path(), "l5"), provider);
    let result = generator.run(&source).unwrap();

    assert_eq!(result.success_count(), 0);
    assert_eq!(result.failure_count(), 1);
    assert!(result.failures[0].error.contains("truncated"));
    assert!(!result.interrupted);

    let checkpoint = generator.checkpoints().load("l5").unwrap().unwrap();
    assert_eq!(checkpoint.record.current_segment, 3);
    assert!(dir.path().join(FAILURES_FILE).exists());
    assert!(!dir.path().join(TRAINING_DATA_FILE).exists());
}

#[test]
fn collection_run_isolates_failures() {
    let dir = tempfile::TempDir::new().unwrap();
    let (provider, script) = ScriptedProvider::new();
    script.lock().unwrap().fail_marker = Some("FAIL-ME".into());

    let mut bad = short_book("bad");
    bad.text.push_str("FAIL-ME");
    let source = table(vec![short_book("good"), bad, short_book("also-good")]);

    let mut catalog = BookCatalog::empty();
    for barcode in ["good", "bad", "also-good"] {
        catalog.register(BookProcessor::new(barcode, "Test").collection("testset"));
    }
    let mut config = config(dir.path(), "unused");
    config.barcode = None;
    config.collection = Some("testset".into());

    let result = generator(config, provider)
        .with_catalog(catalog)
        .run(&source)
        .unwrap();

    assert_eq!(result.success_count(), 2);
    assert_eq!(result.failure_count(), 1);
    assert_eq!(result.failures[0].barcode, "bad");

    let training = std::fs::read_to_string(dir.path().join(TRAINING_DATA_FILE)).unwrap();
    assert_eq!(training.lines().count(), 2);
    let failures = std::fs::read_to_string(dir.path().join(FAILURES_FILE)).unwrap();
    assert!(failures.contains("\"bad\""));
}

#[test]
fn missing_barcode_is_a_book_failure() {
    let dir = tempfile::TempDir::new().unwrap();
    let (provider, script) = ScriptedProvider::new();
    let source = table(vec![short_book("present")]);

    let result = generator(config(dir.path(), "absent"), provider)
        .run(&source)
        .unwrap();

    assert_eq!(result.failure_count(), 1);
    assert!(result.failures[0].error.contains("absent"));
    assert!(script.lock().unwrap().calls.is_empty());
}

#[test]
fn unknown_collection_fails_the_run() {
    let dir = tempfile::TempDir::new().unwrap();
    let (provider, _script) = ScriptedProvider::new();
    let mut config = config(dir.path(), "unused");
    config.barcode = None;
    config.collection = Some("nope".into());

    let err = generator(config, provider)
        .run(&table(Vec::new()))
        .unwrap_err();
    assert!(matches!(err, GeneratorError::UnknownCollection { .. }));
}

fn answers_per_segment(conversations: &[Vec<ChatMessage>]) -> Vec<usize> {
    conversations
        .iter()
        .map(|c| c.iter().filter(|m| m.role == Role::Assistant).count())
        .collect()
}

#[test]
fn interrupt_during_segment_qa_is_redone_on_resume() {
    let qa_config = |dir: &std::path::Path| {
        let mut config = config(dir, "q1");
        config.qa.segment_qa = true;
        config.qa.segment_qa_turns = 2;
        config
    };
    let source = table(vec![chaptered_book("q1", 3, None)]);

    let baseline_dir = tempfile::TempDir::new().unwrap();
    let (provider, _script) = ScriptedProvider::new();
    let baseline = generator(qa_config(baseline_dir.path()), provider)
        .run(&source)
        .unwrap();
    let expected = answers_per_segment(&baseline.records[0].segment_qa_conversations);
    assert_eq!(expected, vec![2, 2, 2]);

    // Call 1 summarizes segment 1, calls 2-3 are its first Q&A turn.
    let dir = tempfile::TempDir::new().unwrap();
    let interrupt = Arc::new(AtomicBool::new(false));
    let (provider, script) = ScriptedProvider::new();
    script.lock().unwrap().interrupt_after = Some((3, Arc::clone(&interrupt)));
    let mut first = generator(qa_config(dir.path()), provider).with_interrupt(interrupt);
    let result = first.run(&source).unwrap();
    assert!(result.interrupted);

    let checkpoint = first.checkpoints().load("q1").unwrap().unwrap();
    assert_eq!(checkpoint.record.current_segment, 1);
    assert_eq!(checkpoint.record.pending_segment_qa, vec![0]);
    assert!(checkpoint.record.segment_qa_conversations[0].is_empty());

    let mut resumed_config = qa_config(dir.path());
    resumed_config.auto_resume = true;
    let (provider, _script) = ScriptedProvider::new();
    let result = generator(resumed_config, provider).run(&source).unwrap();

    assert_eq!(result.success_count(), 1);
    let record = &result.records[0];
    assert!(record.pending_segment_qa.is_empty());
    assert_eq!(answers_per_segment(&record.segment_qa_conversations), expected);
    assert_eq!(
        record.segment_summaries[0].summary,
        checkpoint.record.segment_summaries[0].summary
    );
}

#[test]
fn interrupted_collection_lists_unreached_books() {
    let dir = tempfile::TempDir::new().unwrap();
    let interrupt = Arc::new(AtomicBool::new(false));
    let (provider, script) = ScriptedProvider::new();
    script.lock().unwrap().interrupt_after = Some((1, Arc::clone(&interrupt)));
    let source = table(vec![short_book("c1"), short_book("c2"), short_book("c3")]);

    let mut catalog = BookCatalog::empty();
    for barcode in ["c1", "c2", "c3"] {
        catalog.register(BookProcessor::new(barcode, "Test").collection("batch"));
    }
    let mut config = config(dir.path(), "unused");
    config.barcode = None;
    config.collection = Some("batch".into());

    let result = generator(config, provider)
        .with_catalog(catalog)
        .with_interrupt(interrupt)
        .run(&source)
        .unwrap();

    assert!(result.interrupted);
    assert_eq!(script.lock().unwrap().calls.len(), 1);
    let failed: Vec<_> = result
        .failures
        .iter()
        .map(|f| (f.barcode.as_str(), f.error.clone()))
        .collect();
    assert_eq!(
        failed,
        vec![
            ("c1", GeneratorError::Interrupted.to_string()),
            ("c2", GeneratorError::NotAttempted.to_string()),
            ("c3", GeneratorError::NotAttempted.to_string()),
        ]
    );
    let report = std::fs::read_to_string(dir.path().join(FAILURES_FILE)).unwrap();
    assert!(report.contains("\"c3\""));
}

/// Drops everything before "PART ONE" and splits at "PART TWO".
struct TwoPartHandler;

impl SegmentationHandler for TwoPartHandler {
    fn barcode(&self) -> &'static str {
        "h1"
    }

    fn title(&self) -> &'static str {
        "Two-part test book"
    }

    fn get_segments(&self, text: &str, counter: &dyn TokenCounter) -> SegmentResult<Vec<Segment>> {
        let mid = text.find("PART TWO").unwrap_or(text.len());
        Ok(vec![
            Segment::new(0, "Part One", 0, mid, counter.count(&text[..mid]))?,
            Segment::new(1, "Part Two", mid, text.len(), counter.count(&text[mid..]))?,
        ])
    }

    fn preprocess_for_generation<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let start = text.find("PART ONE").unwrap_or(0);
        Cow::Borrowed(&text[start..])
    }
}

#[test]
fn custom_handler_preprocesses_and_segments() {
    let dir = tempfile::TempDir::new().unwrap();
    let (provider, script) = ScriptedProvider::new();
    let front = "LIBRARY FRONT MATTER, NOT PART OF THE BOOK\n\n";
    let body = format!(
        "PART ONE\n\n{}\n\nPART TWO\n\n{}",
        SENTENCE.repeat(8),
        SENTENCE.repeat(8)
    );
    let source = table(vec![BookRow {
        barcode: "h1".into(),
        text: format!("{front}{body}"),
        title: "Handled Book".into(),
        author: "Tester, C.".into(),
        date: "1900".into(),
    }]);

    let mut handlers = HandlerRegistry::empty();
    handlers.register(Box::new(TwoPartHandler));
    let result = generator(config(dir.path(), "h1"), provider)
        .with_handlers(handlers)
        .run(&source)
        .unwrap();

    let record = &result.records[0];
    assert_eq!(record.strategy, Strategy::LongBook);
    let titles: Vec<_> = record.segments.iter().map(Segment::title).collect();
    assert_eq!(titles, vec!["Part One", "Part Two"]);
    // Offsets point into the preprocessed text, not the raw row.
    assert_eq!(record.segments[0].start_char(), 0);
    assert_eq!(record.segments[1].end_char(), body.len());

    let sent = prompts(&script);
    assert!(sent[0].contains("This is segment 1 of 2"));
    assert!(sent[1].contains("This is segment 2 of 2"));
    assert!(!sent.iter().any(|p| p.contains("LIBRARY FRONT MATTER")));
}

#[test]
fn progress_reports_each_milestone() {
    let dir = tempfile::TempDir::new().unwrap();
    let (provider, _script) = ScriptedProvider::new();
    let source = table(vec![chaptered_book("p1", 3, None)]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    generator(config(dir.path(), "p1"), provider)
        .with_progress(Box::new(move |message: &str, current, total| {
            sink.lock().unwrap().push((message.to_string(), current, total));
        }))
        .run(&source)
        .unwrap();

    let seen = seen.lock().unwrap();
    let position = |wanted: (&str, usize, usize)| {
        seen.iter()
            .position(|(m, c, t)| (m.as_str(), *c, *t) == wanted)
            .unwrap_or_else(|| panic!("missing progress event {wanted:?}"))
    };
    let created = position(("Created 3 segments using chapter method", 0, 3));
    let first = position(("Summarizing segment 1/3: CHAPTER I.", 1, 3));
    let first_done = position(("Segment 1 summarized", 1, 3));
    let last_done = position(("Segment 3 summarized", 3, 3));
    let final_summary = position(("Generating final summary", 3, 3));
    assert!(created < first && first < first_done);
    assert!(first_done < last_done && last_done < final_summary);
    assert!(
        seen[final_summary..]
            .iter()
            .any(|(m, _, _)| m.starts_with("Generated multi-turn Q&A"))
    );
}

#[test]
fn resume_from_another_books_checkpoint_fails_the_book() {
    let dir = tempfile::TempDir::new().unwrap();
    let source = table(vec![chaptered_book("r1", 3, None), chaptered_book("r2", 3, None)]);

    let interrupt = Arc::new(AtomicBool::new(false));
    let (provider, script) = ScriptedProvider::new();
    script.lock().unwrap().interrupt_after = Some((1, Arc::clone(&interrupt)));
    let mut first = generator(config(dir.path(), "r1"), provider).with_interrupt(interrupt);
    assert!(first.run(&source).unwrap().interrupted);
    let path = first.checkpoints().path_for("r1");

    let mut other = config(dir.path(), "r2");
    other.resume_from = Some(path);
    let (provider, script) = ScriptedProvider::new();
    let result = generator(other, provider).run(&source).unwrap();

    assert_eq!(result.success_count(), 0);
    assert!(result.failures[0].error.contains("does not match requested barcode"));
    assert!(script.lock().unwrap().calls.is_empty());
}

#[test]
fn resume_under_changed_strategy_fails_the_book() {
    let dir = tempfile::TempDir::new().unwrap();
    let source = table(vec![chaptered_book("r3", 3, None)]);

    let interrupt = Arc::new(AtomicBool::new(false));
    let (provider, script) = ScriptedProvider::new();
    script.lock().unwrap().interrupt_after = Some((1, Arc::clone(&interrupt)));
    let mut first = generator(config(dir.path(), "r3"), provider).with_interrupt(interrupt);
    assert!(first.run(&source).unwrap().interrupted);

    // A threshold this high now classifies the book as short.
    let mut changed = config(dir.path(), "r3");
    changed.strategy.short_book_threshold = 1_000_000;
    changed.resume_from = Some(first.checkpoints().path_for("r3"));
    let (provider, script) = ScriptedProvider::new();
    let result = generator(changed, provider).run(&source).unwrap();

    assert_eq!(result.failure_count(), 1);
    assert!(result.failures[0].error.contains("does not match analyzed strategy"));
    assert!(script.lock().unwrap().calls.is_empty());
    assert!(first.checkpoints().path_for("r3").exists());
}

#[test]
fn short_book_checkpoint_is_ignored() {
    let dir = tempfile::TempDir::new().unwrap();
    let row = short_book("s2");
    let store = CheckpointStore::new(dir.path());
    let mut stale = BookSummaryRecord::new(&row.metadata(), Strategy::ShortBook, 125, "old-model");
    stale.final_summary = "stale summary from an earlier run".into();
    store.save("pipeline-test", &stale).unwrap();

    let mut config = config(dir.path(), "s2");
    config.auto_resume = true;
    let (provider, _script) = ScriptedProvider::new();
    let result = generator(config, provider).run(&table(vec![row])).unwrap();

    assert_eq!(result.success_count(), 1);
    let record = &result.records[0];
    assert!(record.final_summary.starts_with("Scripted reply 1"));
    assert_eq!(record.model, "scripted-model");
    assert!(!store.path_for("s2").exists());
}
