//! Extract question/answer pairs from free-form model output.

use std::sync::LazyLock;

use regex::Regex;

static MARKDOWN_QUESTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\s*\*\*Question:\*\*").unwrap());
static MARKDOWN_ANSWER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*Answer:\*\*").unwrap());
static PREFIX_QUESTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:Q:|Question:)").unwrap());
static PREFIX_ANSWER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(?:A:|Answer:)").unwrap());
static NUMBERED_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+[.)]\s*").unwrap());
static QUESTION_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Question:?\s*").unwrap());

/// Parse `(question, answer)` pairs, trying in order:
///
/// 1. `1. **Question:** ... **Answer:** ...`
/// 2. `Q: ... A: ...` / `Question: ... Answer: ...`
/// 3. numbered or "Question"-prefixed lines, with the following lines as
///    the answer
///
/// Never fails; an empty vector means nothing matched.
pub fn parse_qa_response(response: &str) -> Vec<(String, String)> {
    if response.trim().is_empty() {
        tracing::warn!("empty response passed to the Q&A parser");
        return Vec::new();
    }

    let pairs = split_blocks(response, &MARKDOWN_QUESTION, &MARKDOWN_ANSWER);
    if !pairs.is_empty() {
        tracing::debug!(pairs = pairs.len(), "parsed Q&A with markdown pattern");
        return pairs;
    }

    let pairs = split_blocks(response, &PREFIX_QUESTION, &PREFIX_ANSWER);
    if !pairs.is_empty() {
        tracing::debug!(pairs = pairs.len(), "parsed Q&A with Q:/A: pattern");
        return pairs;
    }

    let pairs = parse_lines(response);
    if pairs.is_empty() {
        let preview: String = response.chars().take(100).collect();
        tracing::warn!(
            chars = response.len(),
            preview = %preview,
            "failed to parse any Q&A pairs"
        );
    } else {
        tracing::debug!(pairs = pairs.len(), "parsed Q&A with line fallback");
    }
    pairs
}

/// Each question marker opens a block running to the next marker; the block
/// is split at its first answer marker that follows some question text.
fn split_blocks(text: &str, question: &Regex, answer: &Regex) -> Vec<(String, String)> {
    let markers: Vec<(usize, usize)> = question.find_iter(text).map(|m| (m.start(), m.end())).collect();
    let mut pairs = Vec::new();
    for (i, &(_, body_start)) in markers.iter().enumerate() {
        let block_end = markers.get(i + 1).map_or(text.len(), |&(next, _)| next);
        let block = &text[body_start..block_end];
        let split = answer
            .find_iter(block)
            .find(|m| !block[..m.start()].trim().is_empty());
        if let Some(m) = split {
            let q = block[..m.start()].trim();
            let a = block[m.end()..].trim();
            if !a.is_empty() {
                pairs.push((q.to_string(), a.to_string()));
            }
        }
    }
    pairs
}

fn parse_lines(text: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut current_q: Option<String> = None;
    let mut current_a: Vec<&str> = Vec::new();

    for line in text.trim().lines().map(str::trim).filter(|l| !l.is_empty()) {
        if NUMBERED_LINE.is_match(line) || line.to_lowercase().starts_with("question") {
            flush(&mut pairs, current_q.take(), &current_a);
            let stripped = NUMBERED_LINE.replace(line, "");
            current_q = Some(QUESTION_LABEL.replace(&stripped, "").into_owned());
            current_a.clear();
        } else if current_q.is_some() {
            current_a.push(line);
        }
    }
    flush(&mut pairs, current_q, &current_a);
    pairs
}

fn flush(pairs: &mut Vec<(String, String)>, question: Option<String>, answer: &[&str]) {
    match question {
        Some(q) if !q.is_empty() && !answer.is_empty() => pairs.push((q, answer.join(" "))),
        _ => {}
    }
}
