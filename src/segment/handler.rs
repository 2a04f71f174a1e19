//! Per-book segmentation overrides.
//!
//! Handlers are registered in a static table keyed by barcode. The
//! orchestrator only asks "is there a handler for this barcode?" and then
//! calls it through the trait.

use std::borrow::Cow;

use crate::schema::Segment;
use crate::segment::{FederalistHandler, PsychologyJamesHandler, SegmentResult};
use crate::tokenizer::TokenCounter;

/// Book-specific segmentation strategy.
pub trait SegmentationHandler: Send + Sync {
    /// Barcode this handler is registered under.
    fn barcode(&self) -> &'static str;

    /// Human-readable title, for listings.
    fn title(&self) -> &'static str;

    /// Segments for `text`, with offsets into `text`.
    fn get_segments(&self, text: &str, counter: &dyn TokenCounter) -> SegmentResult<Vec<Segment>>;

    /// Where the body starts (front matter ends).
    fn get_content_start(&self, _text: &str) -> usize {
        0
    }

    /// Where the body ends (back matter starts).
    fn get_content_end(&self, text: &str) -> usize {
        text.len()
    }

    /// Text handed to analysis and segmentation. Identity by default.
    fn preprocess_for_generation<'a>(&self, text: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(text)
    }
}

/// Barcode-keyed handler table.
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn SegmentationHandler>>,
}

impl HandlerRegistry {
    /// A registry with no handlers; every book uses the generic segmenter.
    pub fn empty() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// The handlers shipped with grokken.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(PsychologyJamesHandler));
        registry.register(Box::new(FederalistHandler));
        registry
    }

    /// Add a handler, replacing any previous one for the same barcode.
    pub fn register(&mut self, handler: Box<dyn SegmentationHandler>) {
        self.handlers.retain(|h| h.barcode() != handler.barcode());
        self.handlers.push(handler);
    }

    pub fn get(&self, barcode: &str) -> Option<&dyn SegmentationHandler> {
        self.handlers
            .iter()
            .find(|h| h.barcode() == barcode)
            .map(|h| h.as_ref())
    }

    pub fn contains(&self, barcode: &str) -> bool {
        self.get(barcode).is_some()
    }

    pub fn barcodes(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.barcode()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn SegmentationHandler> {
        self.handlers.iter().map(|h| h.as_ref())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("barcodes", &self.barcodes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Whole;

    impl SegmentationHandler for Whole {
        fn barcode(&self) -> &'static str {
            "32044010149714"
        }
        fn title(&self) -> &'static str {
            "Whole book"
        }
        fn get_segments(
            &self,
            text: &str,
            counter: &dyn TokenCounter,
        ) -> SegmentResult<Vec<Segment>> {
            Ok(vec![Segment::new(0, "All", 0, text.len(), counter.count(text))?])
        }
    }

    #[test]
    fn builtin_registers_both_books() {
        let r = HandlerRegistry::builtin();
        assert_eq!(r.len(), 2);
        assert!(r.contains("32044010149714"));
        assert!(r.contains("32044072043805"));
        assert!(!r.contains("nope"));
        assert_eq!(r.get("32044072043805").unwrap().title(), "The Federalist");
    }

    #[test]
    fn register_replaces_same_barcode() {
        let mut r = HandlerRegistry::builtin();
        r.register(Box::new(Whole));
        assert_eq!(r.len(), 2);
        assert_eq!(r.get("32044010149714").unwrap().title(), "Whole book");
    }

    #[test]
    fn default_preprocess_is_identity() {
        let text = "front\nbody\nback";
        assert_eq!(Whole.preprocess_for_generation(text), text);
        assert_eq!(Whole.get_content_start(text), 0);
        assert_eq!(Whole.get_content_end(text), text.len());
    }
}
