//! Prompt templates for summarization and Q&A generation.
//!
//! Everything here is a pure function from structured inputs to the exact
//! text sent to the provider. The text is part of the training data, so the
//! wording is deliberate; change it only together with the data format.

mod conversation;
mod parse;

pub use conversation::{
    CROSS_REFERENCE_BUILD_ON, CROSS_REFERENCE_EARLIER, SIMULATED_USER_SYSTEM, STYLE_CONSTRAINTS,
    multiturn_qa_system, multiturn_question_prompt, synthesis_question_prompt,
};
pub use parse::parse_qa_response;

use serde::{Deserialize, Serialize};

/// A system instruction plus a user prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// System prompt for every summarization call.
pub const SUMMARIZATION_SYSTEM: &str = "You are an expert at summarizing historical and academic texts. \
Your summaries are:
- Comprehensive: capturing main arguments, key concepts, and important details
- Structured: preserving the logical organization of the original
- Precise: using accurate terminology from the original text
- Useful: enabling readers to understand and answer questions about the content

You maintain scholarly objectivity and avoid editorializing.";

/// System prompt for standalone Q&A generation.
pub const QA_SYSTEM: &str = "You are an expert at creating educational questions that test \
deep understanding of texts. Your questions are insightful, varied in difficulty, \
and your answers are thorough and accurate.";

/// Render an integer with comma thousands separators: `131000` → `131,000`.
pub fn format_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Summarize a whole book in one call.
pub fn format_short_book_prompt(
    title: &str,
    author: &str,
    date: &str,
    text: &str,
    token_count: usize,
    target_tokens: usize,
) -> Prompt {
    let token_count = format_thousands(token_count);
    let target_tokens = format_thousands(target_tokens);
    let user = format!(
        r#"You are summarizing "{title}" by {author} ({date}).

This is a historical text of approximately {token_count} tokens.

Create a comprehensive summary that:
1. Captures the main thesis and central arguments
2. Preserves important names, concepts, and terminology
3. Maintains the logical structure and flow of the work
4. Includes key examples and evidence used by the author
5. Notes any significant historical or intellectual context

Your summary should enable someone to:
- Understand the book's core contribution and arguments
- Answer detailed questions about its content
- Identify its place in intellectual history

TARGET LENGTH: Approximately {target_tokens} tokens (be thorough but concise).

---

FULL TEXT:

{text}

---

Provide your comprehensive summary:"#
    );
    Prompt {
        system: SUMMARIZATION_SYSTEM.to_string(),
        user,
    }
}

/// Inputs for one segment's summarization prompt.
#[derive(Debug, Clone, Copy)]
pub struct SegmentPromptInput<'a> {
    pub title: &'a str,
    pub author: &'a str,
    /// Zero-based; rendered one-based.
    pub segment_index: usize,
    pub total_segments: usize,
    pub segment_title: &'a str,
    pub segment_text: &'a str,
    /// Summaries of segments `0..segment_index`, already joined.
    pub accumulated_summaries: Option<&'a str>,
    pub target_tokens: usize,
}

/// Summarize one segment, carrying forward everything summarized so far.
pub fn format_segment_prompt(input: &SegmentPromptInput<'_>) -> Prompt {
    let SegmentPromptInput {
        title,
        author,
        segment_index,
        total_segments,
        segment_title,
        segment_text,
        accumulated_summaries,
        target_tokens,
    } = *input;

    let context_section = match accumulated_summaries.filter(|s| !s.is_empty()) {
        Some(acc) => format!("PREVIOUS CONTEXT (summaries of segments 1-{segment_index}):\n\n{acc}"),
        None => "(This is the first segment - no previous context)".to_string(),
    };
    let display_index = segment_index + 1;
    let target_tokens = format_thousands(target_tokens);

    let user = format!(
        r#"You are progressively summarizing "{title}" by {author}.

This is segment {display_index} of {total_segments}: "{segment_title}"

{context_section}

---

CURRENT SEGMENT TEXT:

{segment_text}

---

Summarize this segment, building on any previous context. Your summary should:
1. Capture the key ideas, arguments, and examples in this segment
2. Connect them to earlier material where relevant
3. Note important terminology, names, and concepts introduced
4. Preserve the logical flow and structure

TARGET LENGTH: Approximately {target_tokens} tokens.

Provide your summary of this segment:"#
    );
    Prompt {
        system: SUMMARIZATION_SYSTEM.to_string(),
        user,
    }
}

/// Synthesize the final summary from all segment summaries.
pub fn format_final_summary_prompt(
    title: &str,
    author: &str,
    date: &str,
    accumulated_summaries: &str,
    num_segments: usize,
    target_tokens: usize,
) -> Prompt {
    let target_tokens = format_thousands(target_tokens);
    let user = format!(
        r#"You are creating the final summary of "{title}" by {author} ({date}).

You have progressively summarized {num_segments} segments of this work. Below are all segment summaries.

---

ACCUMULATED SEGMENT SUMMARIES:

{accumulated_summaries}

---

Create a unified, comprehensive summary of the entire work that:
1. Synthesizes the segment summaries into a coherent whole
2. Identifies the book's central thesis and main arguments
3. Traces the development of key ideas across the work
4. Preserves important terminology, names, and concepts
5. Captures the overall structure and organization
6. Enables detailed Q&A about the book's content

TARGET LENGTH: Approximately {target_tokens} tokens.

Provide your comprehensive summary:"#
    );
    Prompt {
        system: SUMMARIZATION_SYSTEM.to_string(),
        user,
    }
}

/// Ask for `num_questions` numbered question/answer pairs about a summary.
pub fn format_qa_prompt(title: &str, author: &str, summary: &str, num_questions: usize) -> Prompt {
    let user = format!(
        r#"Based on this summary of "{title}" by {author}:

---

{summary}

---

Generate {num_questions} insightful questions that test understanding of this work.
Questions should cover:
- Main arguments and central thesis
- Key concepts and terminology
- Important details and examples
- Relationships between ideas
- Historical or intellectual significance

For each question, provide a thorough answer based ONLY on the information in the summary above.

Format your response as a numbered list with questions and answers:

1. **Question:** [Your question]
   **Answer:** [Your detailed answer]

2. **Question:** [Your question]
   **Answer:** [Your detailed answer]

(Continue for all {num_questions} questions)"#
    );
    Prompt {
        system: QA_SYSTEM.to_string(),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1000), "1,000");
        assert_eq!(format_thousands(131_000), "131,000");
        assert_eq!(format_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn short_book_prompt_fields() {
        let p = format_short_book_prompt("Walden", "Thoreau", "1854", "BODY", 2000, 16000);
        assert_eq!(p.system, SUMMARIZATION_SYSTEM);
        assert!(p.user.starts_with(r#"You are summarizing "Walden" by Thoreau (1854)."#));
        assert!(p.user.contains("approximately 2,000 tokens"));
        assert!(p.user.contains("Approximately 16,000 tokens"));
        assert!(p.user.contains("FULL TEXT:\n\nBODY\n\n---"));
    }

    #[test]
    fn first_segment_has_no_context() {
        let p = format_segment_prompt(&SegmentPromptInput {
            title: "T",
            author: "A",
            segment_index: 0,
            total_segments: 3,
            segment_title: "CHAPTER I.",
            segment_text: "text",
            accumulated_summaries: None,
            target_tokens: 8000,
        });
        assert!(p.user.contains("This is segment 1 of 3: \"CHAPTER I.\""));
        assert!(p.user.contains("(This is the first segment - no previous context)"));
    }

    #[test]
    fn later_segment_carries_context() {
        let p = format_segment_prompt(&SegmentPromptInput {
            title: "T",
            author: "A",
            segment_index: 2,
            total_segments: 3,
            segment_title: "CHAPTER III.",
            segment_text: "text",
            accumulated_summaries: Some("one\n\n---\n\ntwo"),
            target_tokens: 8000,
        });
        assert!(p.user.contains("This is segment 3 of 3"));
        assert!(p.user.contains("PREVIOUS CONTEXT (summaries of segments 1-2):\n\none\n\n---\n\ntwo"));
        assert!(!p.user.contains("first segment"));
    }

    #[test]
    fn final_and_qa_prompts() {
        let p = format_final_summary_prompt("T", "A", "1900", "S1\n\n---\n\nS2", 2, 16000);
        assert!(p.user.contains("progressively summarized 2 segments"));
        assert!(p.user.contains("ACCUMULATED SEGMENT SUMMARIES:\n\nS1"));

        let q = format_qa_prompt("T", "A", "summary", 4);
        assert_eq!(q.system, QA_SYSTEM);
        assert!(q.user.contains("Generate 4 insightful questions"));
        assert!(q.user.ends_with("(Continue for all 4 questions)"));
    }
}
