//! Simulated reader: multi-turn Q&A conversations over summaries.
//!
//! A persona ("Alex") asks questions chapter by chapter and a study-partner
//! model answers with the whole conversation in view. Failures are soft: a
//! question that cannot be generated skips its turn, and an unanswered
//! question is rolled back so user and assistant turns always alternate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::QaConfig;
use crate::prompts::{
    self, CROSS_REFERENCE_BUILD_ON, CROSS_REFERENCE_EARLIER, SIMULATED_USER_SYSTEM,
};
use crate::provider::{GenerationParams, LlmProvider, ProviderResult, TokenUsage};
use crate::schema::{ChatMessage, Role};

/// Output cap for question calls.
pub const QUESTION_MAX_TOKENS: u32 = 4096;
/// Output cap for answer calls.
pub const ANSWER_MAX_TOKENS: u32 = 16384;
pub const MIN_QUESTION_CHARS: usize = 10;
pub const MIN_ANSWER_CHARS: usize = 20;
/// Messages of history shown to the question generator.
const HISTORY_MESSAGES: usize = 10;
/// Per-message cap in that history.
const HISTORY_MESSAGE_CHARS: usize = 500;

/// Kind of question the reader asks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStyle {
    Comprehension,
    Analysis,
    Synthesis,
    Evaluation,
    Application,
    Clarification,
}

impl QuestionStyle {
    pub const ALL: [QuestionStyle; 6] = [
        Self::Comprehension,
        Self::Analysis,
        Self::Synthesis,
        Self::Evaluation,
        Self::Application,
        Self::Clarification,
    ];

    /// One-line instruction embedded in the question prompt.
    pub fn instruction(self) -> &'static str {
        match self {
            Self::Comprehension => "Test basic understanding of main ideas or concepts",
            Self::Analysis => "Probe deeper into reasoning, evidence, or logical structure",
            Self::Synthesis => "Connect ideas across different parts or chapters",
            Self::Evaluation => "Critically assess arguments or compare perspectives",
            Self::Application => "Apply concepts to new contexts or examples",
            Self::Clarification => "Seek explanation of complex or ambiguous points",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Comprehension => "comprehension",
            Self::Analysis => "analysis",
            Self::Synthesis => "synthesis",
            Self::Evaluation => "evaluation",
            Self::Application => "application",
            Self::Clarification => "clarification",
        }
    }
}

impl std::fmt::Display for QuestionStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One titled summary the conversation walks through.
#[derive(Debug, Clone, Copy)]
pub struct SummaryInput<'a> {
    pub title: &'a str,
    pub summary: &'a str,
}

/// Keep a conversation under `max_chars` of content.
///
/// The leading system message always stays. Oldest user+assistant pairs go
/// first; a lone trailing question is never dropped.
pub fn trim_conversation(conversation: &[ChatMessage], max_chars: usize) -> Vec<ChatMessage> {
    let chars = |msgs: &[ChatMessage]| -> usize { msgs.iter().map(|m| m.content.chars().count()).sum() };
    if chars(conversation) <= max_chars {
        return conversation.to_vec();
    }

    let (system, mut rest) = match conversation.split_first() {
        Some((first, rest)) if first.role == Role::System => (Some(first), rest),
        _ => (None, conversation),
    };
    let system_chars = system.map_or(0, |m| m.content.chars().count());

    while rest.len() >= 2 && chars(rest) + system_chars > max_chars {
        let drop = if rest[0].role == Role::User && rest[1].role == Role::Assistant {
            2
        } else {
            1
        };
        rest = &rest[drop..];
    }

    system.into_iter().chain(rest.iter()).cloned().collect()
}

/// Render the recent conversation for the question prompt.
fn format_history(conversation: &[ChatMessage]) -> String {
    let history: Vec<&ChatMessage> = conversation
        .iter()
        .filter(|m| m.role != Role::System)
        .collect();
    if history.is_empty() {
        return "(This is the start of the conversation)".to_string();
    }
    let recent = &history[history.len().saturating_sub(HISTORY_MESSAGES)..];
    recent
        .iter()
        .map(|m| {
            let speaker = if m.role == Role::User { "Reader" } else { "Assistant" };
            if m.content.chars().count() > HISTORY_MESSAGE_CHARS {
                let head: String = m.content.chars().take(HISTORY_MESSAGE_CHARS).collect();
                format!("{speaker}: {head}...")
            } else {
                format!("{speaker}: {}", m.content)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Drives question and answer generation against one provider.
pub struct SimulatedReader<'p, R: Rng = StdRng> {
    provider: &'p dyn LlmProvider,
    config: QaConfig,
    rng: R,
    usage: TokenUsage,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<'p> SimulatedReader<'p, StdRng> {
    /// Seeded for reproducible style selection, or from entropy.
    pub fn seeded(provider: &'p dyn LlmProvider, config: QaConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(provider, config, rng)
    }
}

impl<'p, R: Rng> SimulatedReader<'p, R> {
    pub fn new(provider: &'p dyn LlmProvider, config: QaConfig, rng: R) -> Self {
        Self {
            provider,
            config,
            rng,
            usage: TokenUsage::default(),
            interrupt: None,
        }
    }

    /// Stop between turns once `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Tokens and cost spent so far.
    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    /// Hand back accumulated usage and reset the counter.
    pub fn take_usage(&mut self) -> TokenUsage {
        std::mem::take(&mut self.usage)
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// One conversation over `summaries`, `turns_per_segment` questions per
    /// summary plus a closing synthesis question when there is more than one.
    pub fn generate_multiturn_qa(
        &mut self,
        title: &str,
        author: &str,
        summaries: &[SummaryInput<'_>],
        turns_per_segment: usize,
        temperature: f32,
    ) -> Vec<ChatMessage> {
        self.generate_multiturn_qa_with_progress(
            title,
            author,
            summaries,
            turns_per_segment,
            temperature,
            &mut |_, _, _| {},
        )
    }

    /// As [`generate_multiturn_qa`](Self::generate_multiturn_qa), reporting
    /// `(message, turn, total_turns)` after every answered turn.
    pub fn generate_multiturn_qa_with_progress(
        &mut self,
        title: &str,
        author: &str,
        summaries: &[SummaryInput<'_>],
        turns_per_segment: usize,
        temperature: f32,
        progress: &mut dyn FnMut(&str, usize, usize),
    ) -> Vec<ChatMessage> {
        if summaries.is_empty() {
            tracing::warn!(title, "no summaries provided for multi-turn Q&A");
            return Vec::new();
        }

        let num_segments = summaries.len();
        let with_synthesis = num_segments > 1;
        let total_turns = num_segments * turns_per_segment + usize::from(with_synthesis);
        let answer_temperature = (temperature - 0.1).max(0.0);

        let mut conversation = vec![ChatMessage::system(prompts::multiturn_qa_system(
            title, author,
        ))];
        let mut attempted = 0;
        let mut answered = 0;

        'segments: for (seg_idx, segment) in summaries.iter().enumerate() {
            if segment.summary.is_empty() {
                tracing::warn!(segment = seg_idx, "empty summary, skipping segment");
                continue;
            }

            for turn in 0..turns_per_segment {
                if self.interrupted() {
                    break 'segments;
                }
                attempted += 1;

                let first_turn = turn == 0;
                let style = if first_turn && seg_idx == 0 {
                    QuestionStyle::Comprehension
                } else if first_turn && seg_idx > 0 && self.rng.r#gen::<f64>() < self.config.synthesis_probability {
                    QuestionStyle::Synthesis
                } else {
                    QuestionStyle::ALL[self.rng.gen_range(0..QuestionStyle::ALL.len())]
                };
                let cross_reference = first_turn
                    && seg_idx > 0
                    && self.rng.r#gen::<f64>() < self.config.cross_reference_probability;

                let new_segment_context = if first_turn {
                    format!(
                        "NEW CHAPTER SUMMARY - \"{}\":\n\n{}\n\nThis is chapter {} of {num_segments}.",
                        segment.title,
                        segment.summary,
                        seg_idx + 1
                    )
                } else {
                    "(Continue discussing the current chapter)".to_string()
                };
                let cross_reference_instruction = if cross_reference {
                    CROSS_REFERENCE_EARLIER
                } else {
                    CROSS_REFERENCE_BUILD_ON
                };

                let prompt = prompts::multiturn_question_prompt(
                    title,
                    author,
                    &format_history(&conversation),
                    &new_segment_context,
                    style.instruction(),
                    cross_reference_instruction,
                );
                let Some(question) = self.ask(&prompt, temperature) else {
                    tracing::warn!(segment = seg_idx, turn, %style, "question generation failed, skipping turn");
                    continue;
                };

                let user_content = if first_turn {
                    format!(
                        "Here's a summary of {}:\n\n{}\n\n{question}",
                        segment.title, segment.summary
                    )
                } else {
                    question
                };
                conversation.push(ChatMessage::user(user_content));

                match self.answer(&conversation, answer_temperature) {
                    Some(answer) => {
                        conversation.push(ChatMessage::assistant(answer));
                        answered += 1;
                        progress(
                            &format!("Q&A turn {answered} ({}, segment {})", style, seg_idx + 1),
                            answered,
                            total_turns,
                        );
                    }
                    None => {
                        tracing::warn!(segment = seg_idx, turn, "answer generation failed, dropping question");
                        conversation.pop();
                    }
                }
            }
        }

        if with_synthesis && !self.interrupted() {
            let prompt = prompts::synthesis_question_prompt(title, author);
            if let Some(question) = self.ask(&prompt, temperature) {
                conversation.push(ChatMessage::user(question));
                match self.answer(&conversation, answer_temperature) {
                    Some(answer) => {
                        conversation.push(ChatMessage::assistant(answer));
                        answered += 1;
                        progress("Q&A synthesis turn", answered, total_turns);
                    }
                    None => {
                        tracing::warn!("synthesis answer failed, dropping question");
                        conversation.pop();
                    }
                }
            } else {
                tracing::warn!("synthesis question generation failed");
            }
        }

        tracing::info!(
            messages = conversation.len(),
            attempted,
            answered,
            segments = num_segments,
            "generated multi-turn Q&A"
        );

        if answered == 0 {
            return Vec::new();
        }
        conversation
    }

    /// Generate one question as the reader persona.
    fn ask(&mut self, prompt: &str, temperature: f32) -> Option<String> {
        let params = GenerationParams::new()
            .temperature(temperature)
            .max_tokens(QUESTION_MAX_TOKENS);
        let result = match self.provider.generate(prompt, Some(SIMULATED_USER_SYSTEM), &params) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "question call failed");
                return None;
            }
        };
        self.usage.record(self.provider, &result);
        if result.is_truncated() {
            tracing::warn!(finish_reason = %result.finish_reason, "question truncated");
            return None;
        }
        let question = result.text.trim().trim_matches(|c| c == '"' || c == '\'');
        (question.chars().count() >= MIN_QUESTION_CHARS).then(|| question.to_string())
    }

    /// Answer the last user turn with the (trimmed) conversation as context.
    fn answer(&mut self, conversation: &[ChatMessage], temperature: f32) -> Option<String> {
        let trimmed = trim_conversation(conversation, self.config.max_conversation_chars);
        let params = GenerationParams::new()
            .temperature(temperature)
            .max_tokens(ANSWER_MAX_TOKENS);
        let result = match self.provider.generate_chat(&trimmed, &params) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "answer call failed");
                return None;
            }
        };
        self.usage.record(self.provider, &result);
        if result.is_truncated() {
            tracing::warn!(finish_reason = %result.finish_reason, "answer truncated");
            return None;
        }
        let answer = result.text.trim();
        (answer.chars().count() >= MIN_ANSWER_CHARS).then(|| answer.to_string())
    }

    /// Ask for `num_questions` question/answer pairs about one summary in a
    /// single call. Truncated or unparsable output yields an empty list.
    pub fn generate_standalone_qa(
        &mut self,
        title: &str,
        author: &str,
        summary: &str,
        num_questions: usize,
        temperature: f32,
    ) -> ProviderResult<Vec<(String, String)>> {
        let prompt = prompts::format_qa_prompt(title, author, summary, num_questions);
        let params = GenerationParams::new().temperature(temperature);
        let result = self.provider.generate(&prompt.user, Some(&prompt.system), &params)?;
        self.usage.record(self.provider, &result);
        if result.is_truncated() {
            tracing::warn!(title, "standalone Q&A truncated, discarding");
            return Ok(Vec::new());
        }
        let pairs = prompts::parse_qa_response(&result.text);
        if pairs.is_empty() {
            tracing::warn!(title, "no Q&A pairs parsed from response");
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;
    use crate::provider::{FinishReason, GenerationResult, ProviderError};

    /// Replies from a queue; records every message list it was sent.
    struct Scripted {
        replies: RefCell<VecDeque<ProviderResult<GenerationResult>>>,
        seen: RefCell<Vec<Vec<ChatMessage>>>,
    }

    impl Scripted {
        fn new(replies: Vec<ProviderResult<GenerationResult>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    fn ok(text: &str) -> ProviderResult<GenerationResult> {
        Ok(GenerationResult {
            text: text.into(),
            input_tokens: 100,
            output_tokens: 10,
            model: "scripted".into(),
            finish_reason: FinishReason::Stop,
        })
    }

    fn truncated(text: &str) -> ProviderResult<GenerationResult> {
        Ok(GenerationResult {
            finish_reason: FinishReason::Length,
            ..ok(text).unwrap()
        })
    }

    impl LlmProvider for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }
        fn generate_chat(
            &self,
            messages: &[ChatMessage],
            _params: &GenerationParams,
        ) -> ProviderResult<GenerationResult> {
            self.seen.borrow_mut().push(messages.to_vec());
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| ok("A fallback answer long enough to be accepted."))
        }
        fn count_tokens(&self, text: &str) -> usize {
            text.len() / 4
        }
        fn estimate_cost(&self, input: u64, output: u64) -> f64 {
            (input + output) as f64 * 1e-6
        }
    }

    const Q: &str = "What does the author mean by habit?";
    const A: &str = "Habit is a groove worn into the plastic nervous system.";

    fn summaries() -> Vec<SummaryInput<'static>> {
        vec![
            SummaryInput {
                title: "Chapter I",
                summary: "Habit and plasticity.",
            },
            SummaryInput {
                title: "Chapter II",
                summary: "The stream of thought.",
            },
        ]
    }

    fn assert_alternates(conv: &[ChatMessage]) {
        assert_eq!(conv[0].role, Role::System);
        for pair in conv[1..].windows(2) {
            assert_ne!(pair[0].role, pair[1].role, "consecutive {:?}", pair[0].role);
        }
        assert_eq!(conv.last().unwrap().role, Role::Assistant);
    }

    #[test]
    fn full_conversation_shape() {
        // 2 segments x 1 turn + synthesis, all succeed
        let provider = Scripted::new(vec![ok(Q), ok(A), ok(Q), ok(A), ok(Q), ok(A)]);
        let mut reader = SimulatedReader::seeded(&provider, QaConfig::default(), Some(1));
        let conv = reader.generate_multiturn_qa("Psychology", "James", &summaries(), 1, 0.8);
        assert_eq!(conv.len(), 7);
        assert_alternates(&conv);
        assert!(conv[1].content.starts_with("Here's a summary of Chapter I:\n\nHabit and plasticity."));
        assert!(conv[1].content.ends_with(Q));
        assert_eq!(reader.usage().calls, 6);
        assert_eq!(reader.usage().input_tokens, 600);
    }

    #[test]
    fn failed_answer_rolls_back_question() {
        let provider = Scripted::new(vec![
            ok(Q),
            truncated(A), // answer 1 truncated
            ok(Q),
            ok("too short"), // answer 2 under the floor
            ok(Q),
            ok(A),
        ]);
        let mut reader = SimulatedReader::seeded(&provider, QaConfig::default(), Some(2));
        let conv = reader.generate_multiturn_qa("T", "A", &summaries(), 1, 0.8);
        // Only the synthesis turn survives.
        assert_eq!(conv.len(), 3);
        assert_alternates(&conv);
    }

    #[test]
    fn failed_question_skips_turn() {
        let provider = Scripted::new(vec![
            Err(ProviderError::transient("boom")),
            ok("\"short\""),
            ok(Q),
            ok(A),
        ]);
        let mut reader = SimulatedReader::seeded(&provider, QaConfig::default(), Some(3));
        let conv = reader.generate_multiturn_qa(
            "T",
            "A",
            &summaries()[..1],
            3,
            0.8,
        );
        assert_eq!(conv.len(), 3);
        assert_alternates(&conv);
    }

    #[test]
    fn nothing_answered_is_empty() {
        let provider = Scripted::new(vec![ok("no"), ok("no"), ok("no")]);
        let mut reader = SimulatedReader::seeded(&provider, QaConfig::default(), Some(4));
        let conv = reader.generate_multiturn_qa("T", "A", &summaries()[..1], 3, 0.8);
        assert!(conv.is_empty());
        assert!(reader.generate_multiturn_qa("T", "A", &[], 3, 0.8).is_empty());
    }

    #[test]
    fn progress_reports_each_answered_turn() {
        let provider = Scripted::new(vec![ok(Q), ok(A), ok(Q), ok(A)]);
        let mut reader = SimulatedReader::seeded(&provider, QaConfig::default(), Some(5));
        let mut seen = Vec::new();
        reader.generate_multiturn_qa_with_progress(
            "T",
            "A",
            &summaries()[..1],
            2,
            0.8,
            &mut |_, cur, total| seen.push((cur, total)),
        );
        assert_eq!(seen, vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn interrupt_stops_between_turns() {
        let provider = Scripted::new(vec![ok(Q), ok(A)]);
        let flag = Arc::new(AtomicBool::new(true));
        let mut reader =
            SimulatedReader::seeded(&provider, QaConfig::default(), Some(6)).with_interrupt(flag);
        let conv = reader.generate_multiturn_qa("T", "A", &summaries(), 2, 0.8);
        assert!(conv.is_empty());
        assert_eq!(reader.usage().calls, 0);
    }

    #[test]
    fn trim_keeps_system_and_latest_question() {
        let big = "x".repeat(100);
        let conv = vec![
            ChatMessage::system("sys"),
            ChatMessage::user(big.clone()),
            ChatMessage::assistant(big.clone()),
            ChatMessage::user(big.clone()),
            ChatMessage::assistant(big.clone()),
            ChatMessage::user("latest?"),
        ];
        let trimmed = trim_conversation(&conv, 250);
        assert_eq!(trimmed.len(), 4);
        assert_eq!(trimmed[0].content, "sys");
        assert_eq!(trimmed[1].role, Role::User);
        assert_eq!(trimmed.last().unwrap().content, "latest?");

        let tiny = trim_conversation(&conv, 10);
        assert_eq!(tiny.len(), 2);
        assert_eq!(tiny[1].content, "latest?");

        assert_eq!(trim_conversation(&conv, 10_000), conv);
    }

    #[test]
    fn history_is_windowed_and_truncated() {
        assert_eq!(
            format_history(&[ChatMessage::system("s")]),
            "(This is the start of the conversation)"
        );
        let mut conv = vec![ChatMessage::system("s")];
        for i in 0..12 {
            conv.push(ChatMessage::user(format!("q{i}")));
            conv.push(ChatMessage::assistant("y".repeat(600)));
        }
        let history = format_history(&conv);
        assert!(history.starts_with("Reader: q7"));
        assert!(!history.contains("q6"));
        assert!(history.contains(&format!("Assistant: {}...", "y".repeat(500))));
    }

    #[test]
    fn standalone_qa_parses_pairs() {
        let provider = Scripted::new(vec![ok(
            "1. **Question:** Why habit?\n**Answer:** Plasticity.\n2. **Question:** Why stream?\n**Answer:** Continuity.",
        )]);
        let mut reader = SimulatedReader::seeded(&provider, QaConfig::default(), None);
        let pairs = reader
            .generate_standalone_qa("T", "A", "summary", 2, 0.7)
            .unwrap();
        assert_eq!(pairs.len(), 2);
        let seen = provider.seen.borrow();
        assert_eq!(seen[0][0].role, Role::System);
        assert!(seen[0][1].content.contains("Generate 2 insightful questions"));
    }
}
