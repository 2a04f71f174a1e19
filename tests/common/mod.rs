//! Shared fixtures for the pipeline tests: a scripted provider and
//! synthetic books.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use grokken::config::{GenerationConfig, QaConfig, StrategyConfig};
use grokken::provider::{
    FinishReason, GenerationParams, GenerationResult, LlmProvider, ProviderError, ProviderResult,
};
use grokken::schema::ChatMessage;
use grokken::source::{BookRow, SourceTable};
use grokken::tokenizer::TokenizerKind;

/// Knobs and call log shared between a [`ScriptedProvider`] and the test.
#[derive(Default)]
pub struct Script {
    pub calls: Vec<Vec<ChatMessage>>,
    /// Prompts containing this fail with a non-retryable error.
    pub fail_marker: Option<String>,
    /// Prompts containing this come back cut off at the token limit.
    pub truncate_marker: Option<String>,
    /// Reported input tokens per call.
    pub input_tokens: u64,
    /// Raise the flag once this many calls have been served.
    pub interrupt_after: Option<(usize, Arc<AtomicBool>)>,
    /// Prefix for every reply, to tell providers apart.
    pub label: String,
}

/// Deterministic provider: every reply is numbered and long enough to pass
/// the reader's length checks.
pub struct ScriptedProvider {
    script: Arc<Mutex<Script>>,
}

impl ScriptedProvider {
    pub fn new() -> (Self, Arc<Mutex<Script>>) {
        let script = Arc::new(Mutex::new(Script {
            input_tokens: 1_000,
            ..Script::default()
        }));
        (
            Self {
                script: Arc::clone(&script),
            },
            script,
        )
    }
}

impl LlmProvider for ScriptedProvider {
    fn model_name(&self) -> &str {
        "scripted-model"
    }

    fn generate_chat(
        &self,
        messages: &[ChatMessage],
        _params: &GenerationParams,
    ) -> ProviderResult<GenerationResult> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(messages.to_vec());
        let n = script.calls.len();
        if let Some((after, flag)) = &script.interrupt_after {
            if n >= *after {
                flag.store(true, Ordering::SeqCst);
            }
        }

        let prompt: String = messages.iter().map(|m| m.content.as_str()).collect();
        if let Some(marker) = &script.fail_marker {
            if prompt.contains(marker.as_str()) {
                return Err(ProviderError::InvalidResponse {
                    message: "scripted failure".into(),
                });
            }
        }
        let finish_reason = match &script.truncate_marker {
            Some(marker) if prompt.contains(marker.as_str()) => FinishReason::Length,
            _ => FinishReason::Stop,
        };
        Ok(GenerationResult {
            text: format!("{}Scripted reply {n}: what does the author argue about this passage?", script.label),
            input_tokens: script.input_tokens,
            output_tokens: 50,
            model: "scripted-model".into(),
            finish_reason,
        })
    }

    fn count_tokens(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }

    fn estimate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * 2.0 + output_tokens as f64 * 8.0) / 1_000_000.0
    }
}

/// Every user-visible prompt text sent so far, one string per call.
pub fn prompts(script: &Arc<Mutex<Script>>) -> Vec<String> {
    script
        .lock()
        .unwrap()
        .calls
        .iter()
        .map(|call| call.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n"))
        .collect()
}

pub const SENTENCE: &str = "the mind is a theatre of simultaneous possibilities, and attention \
                        selects among them the ones that shall become real to us. ";

/// A short book, under the test config's short-book threshold.
pub fn short_book(barcode: &str) -> BookRow {
    BookRow {
        barcode: barcode.into(),
        text: SENTENCE.repeat(4),
        title: format!("Short Book {barcode}"),
        author: "Tester, A.".into(),
        date: "1890".into(),
    }
}

/// A book with `chapters` CHAPTER headings, each a few paragraphs long.
pub fn chaptered_book(barcode: &str, chapters: usize, marker: Option<&str>) -> BookRow {
    const NUMERALS: [&str; 8] = ["I", "II", "III", "IV", "V", "VI", "VII", "VIII"];
    let mut text = String::new();
    for (i, numeral) in NUMERALS.iter().take(chapters).enumerate() {
        text.push_str(&format!("CHAPTER {numeral}.\n\n"));
        for _ in 0..3 {
            text.push_str(&SENTENCE.repeat(4));
            text.push_str("\n\n");
        }
        if i == chapters - 1 {
            if let Some(marker) = marker {
                text.push_str(marker);
                text.push_str("\n\n");
            }
        }
    }
    BookRow {
        barcode: barcode.into(),
        text,
        title: format!("Long Book {barcode}"),
        author: "Tester, B.".into(),
        date: "1864".into(),
    }
}

pub fn table(rows: Vec<BookRow>) -> SourceTable {
    SourceTable::from_rows(rows)
}

/// Single-book config with approximate token counting and a tiny
/// short-book threshold, so chaptered books take the long path.
pub fn config(output_dir: &Path, barcode: &str) -> GenerationConfig {
    GenerationConfig {
        name: "pipeline-test".into(),
        barcode: Some(barcode.into()),
        output_dir: output_dir.to_path_buf(),
        seed: Some(42),
        tokenizer: TokenizerKind::Approximate,
        strategy: StrategyConfig {
            short_book_threshold: 200,
            qa_turns: 4,
            ..StrategyConfig::default()
        },
        qa: QaConfig {
            segment_qa: false,
            segment_qa_turns: 1,
            ..QaConfig::default()
        },
        ..GenerationConfig::default()
    }
}
