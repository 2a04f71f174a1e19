//! William James, *The Principles of Psychology*, vol. II (1890).
//!
//! Twelve chapters, XVII through XXVIII. Table-of-contents entries repeat the
//! chapter markers, so a heading only counts when the chapter's known title
//! (or a recognizable stand-in) follows it. Header formats vary: most read
//! `CHAPTER XVII.`, some carry a footnote star, one has no period.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::schema::Segment;
use crate::segment::{SegmentError, SegmentResult, SegmentationHandler, floor_char_boundary};
use crate::tokenizer::TokenCounter;

const CHAPTERS: [(&str, &str); 12] = [
    ("XVII", "SENSATION"),
    ("XVIII", "IMAGINATION"),
    ("XIX", "THE PERCEPTION OF THINGS"),
    ("XX", "THE PERCEPTION OF SPACE"),
    ("XXI", "THE PERCEPTION OF REALITY"),
    ("XXII", "REASONING"),
    ("XXIII", "THE PRODUCTION OF MOVEMENT"),
    ("XXIV", "INSTINCT"),
    ("XXV", "THE EMOTIONS"),
    ("XXVI", "WILL"),
    ("XXVII", "HYPNOTISM"),
    ("XXVIII", "NECESSARY TRUTHS AND THE EFFECTS OF EXPERIENCE"),
];

/// How far past a heading to look for its title.
const TITLE_WINDOW: usize = 300;

static CHAPTER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    CHAPTERS
        .iter()
        .map(|(roman, _)| Regex::new(&format!(r"(?m)^CHAPTER\s+{roman}\.?\*?\s*$")).unwrap())
        .collect()
});

static FIRST_CHAPTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CHAPTER XVII\.\s*\n\s*SENSATION").unwrap());
static THE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"THE END\.\s*\n").unwrap());
static INDEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^INDEX\.?\s*$").unwrap());

/// Cleaned text normally starts at the first chapter; raw scans carry
/// roughly this much front matter, which contains a stray "CHAPTER XVII".
const FRONT_MATTER_SKIP: usize = 5000;

pub struct PsychologyJamesHandler;

impl PsychologyJamesHandler {
    fn title_follows(roman: &str, title: &str, after: &str) -> bool {
        let first_word = title.split_whitespace().next().unwrap_or(title);
        if after.contains(title) || after.contains(first_word) {
            return true;
        }
        // The title line is sometimes removed with the running headers.
        let lower = after.to_lowercase();
        match roman {
            "XVII" => lower.contains("perception"),
            "XXVIII" => lower.contains("final chapter"),
            _ => false,
        }
    }
}

impl SegmentationHandler for PsychologyJamesHandler {
    fn barcode(&self) -> &'static str {
        "32044010149714"
    }

    fn title(&self) -> &'static str {
        "The Principles of Psychology"
    }

    fn get_content_start(&self, text: &str) -> usize {
        if text.starts_with("CHAPTER XVII") {
            return 0;
        }
        let marker = "PSYCHOLOGY.\nCHAPTER XVII.";
        if let Some(pos) = text.find(marker).filter(|&p| p > 0) {
            return pos + "PSYCHOLOGY.\n".len();
        }
        let skip = floor_char_boundary(text, FRONT_MATTER_SKIP);
        FIRST_CHAPTER
            .find(&text[skip..])
            .map_or(0, |m| skip + m.start())
    }

    fn get_content_end(&self, text: &str) -> usize {
        if let Some(m) = THE_END.find(text) {
            return m.end();
        }
        INDEX.find(text).map_or(text.len(), |m| m.start())
    }

    fn get_segments(&self, text: &str, counter: &dyn TokenCounter) -> SegmentResult<Vec<Segment>> {
        let start = self.get_content_start(text);
        let end = self.get_content_end(text).max(start);
        let content = &text[start..end];

        let mut found: Vec<(&str, &str, usize)> = Vec::new();
        for ((roman, title), pattern) in CHAPTERS.iter().zip(CHAPTER_PATTERNS.iter()) {
            let hit = pattern.find_iter(content).find(|m| {
                let window_end = floor_char_boundary(content, m.end() + TITLE_WINDOW);
                Self::title_follows(roman, title, &content[m.end()..window_end])
            });
            match hit {
                Some(m) => found.push((roman, title, m.start())),
                None => tracing::warn!(chapter = roman, "chapter heading not found"),
            }
        }
        found.sort_by_key(|&(_, _, pos)| pos);

        if found.is_empty() {
            return Err(SegmentError::Empty {
                barcode: self.barcode().to_string(),
            });
        }

        let mut segments = Vec::with_capacity(found.len());
        for (i, &(roman, title, pos)) in found.iter().enumerate() {
            let seg_start = start + pos;
            let seg_end = found.get(i + 1).map_or(end, |&(_, _, next)| start + next);
            segments.push(Segment::new(
                i,
                format!("Chapter {roman}: {title}"),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::ApproximateTokenCounter;

    fn body(words: &str) -> String {
        format!("{}\n\n", words.repeat(20))
    }

    fn book() -> String {
        let mut text = String::new();
        text.push_str("HARVARD COLLEGE LIBRARY\n\nCONTENTS\nCHAPTER XVIII\n\n");
        text.push_str("PSYCHOLOGY.\n");
        text.push_str("CHAPTER XVII.\nSENSATION.\n\n");
        text.push_str(&body("Sensations are the first things in the way of consciousness. "));
        text.push_str("CHAPTER XVIII.*\nIMAGINATION.\n\n");
        text.push_str(&body("Sensations once experienced modify the nervous organism. "));
        text.push_str("CHAPTER XXIII\nTHE PRODUCTION OF MOVEMENT.\n\n");
        text.push_str(&body("The remaining chapters concern the efferent side. "));
        text.push_str("THE END.\n\nINDEX.\nAbstraction, 12.\n");
        text
    }

    #[test]
    fn finds_chapters_and_skips_toc() {
        let text = book();
        let h = PsychologyJamesHandler;
        let segments = h.get_segments(&text, &ApproximateTokenCounter).unwrap();
        let titles: Vec<&str> = segments.iter().map(|s| s.title()).collect();
        assert_eq!(
            titles,
            vec![
                "Chapter XVII: SENSATION",
                "Chapter XVIII: IMAGINATION",
                "Chapter XXIII: THE PRODUCTION OF MOVEMENT",
            ]
        );
        // The table-of-contents "CHAPTER XVIII" sits before the content start.
        assert!(segments[1].start_char() > text.find("PSYCHOLOGY.").unwrap());
        assert_eq!(segments[0].start_char(), text.find("CHAPTER XVII.").unwrap());
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end_char(), pair[1].start_char());
        }
        let last = segments.last().unwrap().text(&text).unwrap();
        assert!(last.ends_with("THE END.\n\n"));
        assert!(!last.contains("INDEX"));
    }

    #[test]
    fn preprocess_strips_front_and_back_matter() {
        let text = book();
        let h = PsychologyJamesHandler;
        let content = h.preprocess_for_generation(&text);
        assert!(content.starts_with("CHAPTER XVII."));
        assert!(!content.contains("INDEX"));

        // Segmenting the preprocessed text yields the same chapters.
        let segments = h.get_segments(&content, &ApproximateTokenCounter).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].start_char(), 0);
        assert_eq!(segments[2].end_char(), content.len());
    }

    #[test]
    fn content_end_falls_back_to_index() {
        let text = "CHAPTER XVII.\nSENSATION\n\nbody text\n\nINDEX\nentries";
        let end = PsychologyJamesHandler.get_content_end(text);
        assert_eq!(&text[end..end + 5], "INDEX");
    }

    #[test]
    fn no_chapters_is_an_error() {
        let err = PsychologyJamesHandler
            .get_segments("nothing to see here", &ApproximateTokenCounter)
            .unwrap_err();
        assert!(matches!(err, SegmentError::Empty { .. }));
    }
}
