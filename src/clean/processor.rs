//! Per-book cleaning pipeline.

use serde::Serialize;

use crate::clean::{CleanError, CleanResult, Transform};
use crate::schema::BookMetadata;

/// Book-specific cleanup run after the generic transforms.
pub type PostProcess = fn(&str) -> String;

/// Ordered transforms plus an optional post-process for one book.
#[derive(Debug)]
pub struct BookProcessor {
    pub barcode: &'static str,
    pub title: &'static str,
    pub author: &'static str,
    pub date: &'static str,
    pub collection: &'static str,
    /// Free-form notes on the scan's quirks.
    pub notes: &'static str,
    transforms: Vec<Transform>,
    post_process: Option<PostProcess>,
}

/// Before/after sizes of one cleaning run, in characters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanStats {
    pub barcode: String,
    pub title: String,
    pub raw_chars: usize,
    pub processed_chars: usize,
    /// Percentage removed, rounded to two decimals.
    pub reduction_pct: f64,
    pub transforms_applied: usize,
}

impl BookProcessor {
    pub fn new(barcode: &'static str, title: &'static str) -> Self {
        Self {
            barcode,
            title,
            author: "",
            date: "",
            collection: "default",
            notes: "",
            transforms: Vec::new(),
            post_process: None,
        }
    }

    pub fn author(mut self, author: &'static str) -> Self {
        self.author = author;
        self
    }

    pub fn date(mut self, date: &'static str) -> Self {
        self.date = date;
        self
    }

    pub fn collection(mut self, collection: &'static str) -> Self {
        self.collection = collection;
        self
    }

    pub fn notes(mut self, notes: &'static str) -> Self {
        self.notes = notes;
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn transforms(mut self, transforms: impl IntoIterator<Item = Transform>) -> Self {
        self.transforms.extend(transforms);
        self
    }

    pub fn post_process(mut self, f: PostProcess) -> Self {
        self.post_process = Some(f);
        self
    }

    pub fn transform_names(&self) -> Vec<&str> {
        self.transforms.iter().map(Transform::name).collect()
    }

    pub fn has_post_process(&self) -> bool {
        self.post_process.is_some()
    }

    pub fn metadata(&self) -> BookMetadata {
        BookMetadata {
            barcode: self.barcode.to_string(),
            title: self.title.to_string(),
            author: self.author.to_string(),
            date: self.date.to_string(),
        }
    }

    /// Apply every transform in order, then the post-process.
    pub fn process(&self, raw: &str) -> CleanResult<String> {
        if raw.is_empty() {
            return Err(CleanError::EmptyText {
                barcode: self.barcode.to_string(),
            });
        }
        let mut text = raw.to_string();
        for transform in &self.transforms {
            text = transform.apply(&text);
            tracing::trace!(barcode = self.barcode, transform = transform.name(), chars = text.len(), "applied transform");
        }
        if let Some(post) = self.post_process {
            text = post(&text);
        }
        Ok(text)
    }

    /// [`process`](Self::process), also reporting how much text was removed.
    pub fn process_with_stats(&self, raw: &str) -> CleanResult<(String, CleanStats)> {
        let text = self.process(raw)?;
        let stats = self.stats(raw, &text);
        tracing::debug!(
            barcode = self.barcode,
            raw_chars = stats.raw_chars,
            processed_chars = stats.processed_chars,
            reduction_pct = stats.reduction_pct,
            "cleaned book"
        );
        Ok((text, stats))
    }

    pub fn stats(&self, raw: &str, processed: &str) -> CleanStats {
        let raw_chars = raw.chars().count();
        let processed_chars = processed.chars().count();
        let reduction_pct = if raw_chars == 0 {
            0.0
        } else {
            let pct = (1.0 - processed_chars as f64 / raw_chars as f64) * 100.0;
            (pct * 100.0).round() / 100.0
        };
        CleanStats {
            barcode: self.barcode.to_string(),
            title: self.title.to_string(),
            raw_chars,
            processed_chars,
            reduction_pct,
            transforms_applied: self.transforms.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::{typography, whitespace};

    fn shout(text: &str) -> String {
        format!("{}!", text.trim_end())
    }

    #[test]
    fn applies_transforms_then_post_process() {
        let processor = BookProcessor::new("b1", "Test")
            .author("Anon")
            .transform(Transform::new("fix_ligatures", typography::fix_ligatures))
            .transform(Transform::new("trim", whitespace::trim))
            .post_process(shout);

        assert_eq!(processor.transform_names(), vec!["fix_ligatures", "trim"]);
        assert!(processor.has_post_process());
        assert_eq!(processor.process("  \u{fb01}ne  ").unwrap(), "fine!");
        assert_eq!(processor.metadata().author, "Anon");
    }

    #[test]
    fn empty_text_is_an_error() {
        let processor = BookProcessor::new("b1", "Test");
        assert!(matches!(
            processor.process(""),
            Err(CleanError::EmptyText { .. })
        ));
    }

    #[test]
    fn stats_report_reduction() {
        let processor =
            BookProcessor::new("b1", "Test").transform(Transform::new("trim", whitespace::trim));
        let raw = format!("{}abc", " ".repeat(3));
        let (text, stats) = processor.process_with_stats(&raw).unwrap();
        assert_eq!(text, "abc");
        assert_eq!(stats.raw_chars, 6);
        assert_eq!(stats.processed_chars, 3);
        assert_eq!(stats.reduction_pct, 50.0);
        assert_eq!(stats.transforms_applied, 1);

        let none = processor.stats("", "");
        assert_eq!(none.reduction_pct, 0.0);
    }
}
