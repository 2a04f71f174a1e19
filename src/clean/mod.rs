//! OCR text cleaning.
//!
//! Generic transforms are grouped by concern (encoding, typography, OCR
//! misreads, whitespace, page structure). A [`BookProcessor`] applies an
//! ordered list of them plus an optional book-specific post-process, and the
//! [`BookCatalog`] holds the processors for the books grokken knows about.

pub mod catalog;
pub mod encoding;
pub mod ocr;
mod principia;
pub mod processor;
pub mod structure;
pub mod typography;
pub mod whitespace;

use miette::Diagnostic;
use thiserror::Error;

pub use catalog::BookCatalog;
pub use processor::{BookProcessor, CleanStats};

/// Errors from text cleaning.
#[derive(Debug, Error, Diagnostic)]
pub enum CleanError {
    #[error("no text to process for \"{barcode}\"")]
    #[diagnostic(
        code(grokken::clean::empty),
        help("The source row's `text` column is empty.")
    )]
    EmptyText { barcode: String },

    #[error("no processor registered for barcode \"{barcode}\"")]
    #[diagnostic(
        code(grokken::clean::unknown_book),
        help("Run `grokken books` to list the registered books.")
    )]
    UnknownBook { barcode: String },

    #[error("unknown collection \"{name}\"")]
    #[diagnostic(
        code(grokken::clean::unknown_collection),
        help("Run `grokken books` to list the registered collections.")
    )]
    UnknownCollection { name: String },

    #[error("invalid pattern `{pattern}`: {message}")]
    #[diagnostic(code(grokken::clean::pattern))]
    Pattern { pattern: String, message: String },

    #[error("invalid argument to `{transform}`: {message}")]
    #[diagnostic(code(grokken::clean::argument))]
    Argument { transform: String, message: String },
}

pub type CleanResult<T> = std::result::Result<T, CleanError>;

type TransformFn = dyn Fn(&str) -> String + Send + Sync;

/// A named text-to-text cleaning step.
pub struct Transform {
    name: String,
    apply: Box<TransformFn>,
}

impl Transform {
    /// Wrap a plain transform function.
    pub fn new(name: &str, f: fn(&str) -> String) -> Self {
        Self::from_fn(name, f)
    }

    /// Wrap a configured closure (the factory transforms).
    pub fn from_fn(name: impl Into<String>, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            apply: Box::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, text: &str) -> String {
        (self.apply)(text)
    }
}

impl std::fmt::Debug for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Transform").field(&self.name).finish()
    }
}

/// Replace every literal `from` with `to`, in order.
fn replace_all_literal(text: &str, pairs: &[(&str, &str)]) -> String {
    let mut out = text.to_string();
    for (from, to) in pairs {
        if out.contains(from) {
            out = out.replace(from, to);
        }
    }
    out
}

/// Apply each `(regex, replacement)` in order.
fn replace_all_patterns(text: &str, rules: &[(regex::Regex, &str)]) -> String {
    let mut out = text.to_string();
    for (re, replacement) in rules {
        if let std::borrow::Cow::Owned(replaced) = re.replace_all(&out, *replacement) {
            out = replaced;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_wraps_fn_and_closure() {
        let upper = Transform::new("upper", |s| s.to_uppercase());
        assert_eq!(upper.name(), "upper");
        assert_eq!(upper.apply("abc"), "ABC");

        let suffix = String::from("!");
        let shout = Transform::from_fn("shout", move |s| format!("{s}{suffix}"));
        assert_eq!(shout.apply("hi"), "hi!");
        assert_eq!(format!("{shout:?}"), "Transform(\"shout\")");
    }
}
