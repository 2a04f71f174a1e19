//! Token counting against the target model's vocabulary.
//!
//! Every component that budgets text (analyzer, segmenter, handlers, the
//! OpenAI provider) shares one [`TokenCounter`] behind an `Arc`, so a book is
//! measured the same way everywhere. Loading the BPE tables is expensive;
//! build the counter once per process with [`build_counter`].

use std::path::PathBuf;
use std::sync::Arc;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from tokenizer construction.
#[derive(Debug, Error, Diagnostic)]
pub enum TokenizerError {
    #[error("failed to load {encoding} tokenizer: {message}")]
    #[diagnostic(
        code(grokken::tokenizer::load),
        help("The BPE tables are embedded in the binary; this usually means a corrupt build.")
    )]
    Load { encoding: String, message: String },

    #[error("tokenizer file not readable: {path}: {message}")]
    #[diagnostic(
        code(grokken::tokenizer::file),
        help("Point `tokenizer.path` at a HuggingFace `tokenizer.json` file.")
    )]
    File { path: String, message: String },

    #[error("tokenizer backend \"{backend}\" is not compiled in")]
    #[diagnostic(
        code(grokken::tokenizer::disabled),
        help("Rebuild with `--features {feature}` or pick another tokenizer kind.")
    )]
    Disabled { backend: String, feature: String },
}

pub type TokenizerResult<T> = std::result::Result<T, TokenizerError>;

/// Counts tokens in arbitrary text.
pub trait TokenCounter: Send + Sync {
    /// Number of tokens `text` occupies.
    fn count(&self, text: &str) -> usize;

    /// Short name for diagnostics.
    fn name(&self) -> &str;
}

/// Which token counter to build, as written in the generation config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenizerKind {
    /// OpenAI o200k_base BPE (GPT-4o / GPT-5 family).
    #[default]
    O200k,
    /// Four characters per token, rounded up.
    Approximate,
    /// A HuggingFace `tokenizer.json` on disk.
    Huggingface { path: PathBuf },
}

/// Build the configured counter.
pub fn build_counter(kind: &TokenizerKind) -> TokenizerResult<Arc<dyn TokenCounter>> {
    match kind {
        TokenizerKind::O200k => Ok(Arc::new(BpeTokenCounter::o200k()?)),
        TokenizerKind::Approximate => Ok(Arc::new(ApproximateTokenCounter)),
        TokenizerKind::Huggingface { path } => build_hf(path),
    }
}

#[cfg(feature = "hf-tokenizer")]
fn build_hf(path: &std::path::Path) -> TokenizerResult<Arc<dyn TokenCounter>> {
    Ok(Arc::new(HfTokenCounter::from_file(path)?))
}

#[cfg(not(feature = "hf-tokenizer"))]
fn build_hf(_path: &std::path::Path) -> TokenizerResult<Arc<dyn TokenCounter>> {
    Err(TokenizerError::Disabled {
        backend: "huggingface".into(),
        feature: "hf-tokenizer".into(),
    })
}

// ── BPE ─────────────────────────────────────────────────────────────────

/// Exact counts using tiktoken's BPE tables.
///
/// Book text routinely contains strings like `<|endoftext|>` in OCR noise;
/// ordinary encoding counts those as plain text instead of rejecting them.
pub struct BpeTokenCounter {
    bpe: tiktoken_rs::CoreBPE,
    name: &'static str,
}

impl BpeTokenCounter {
    /// The o200k_base encoding.
    pub fn o200k() -> TokenizerResult<Self> {
        let bpe = tiktoken_rs::o200k_base().map_err(|e| TokenizerError::Load {
            encoding: "o200k_base".into(),
            message: e.to_string(),
        })?;
        Ok(Self {
            bpe,
            name: "o200k_base",
        })
    }
}

impl TokenCounter for BpeTokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn name(&self) -> &str {
        self.name
    }
}

impl std::fmt::Debug for BpeTokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BpeTokenCounter")
            .field("name", &self.name)
            .finish()
    }
}

// ── Approximate ─────────────────────────────────────────────────────────

/// `ceil(chars / 4)`. Good enough for Anthropic models, whose tokenizer is
/// not public, and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproximateTokenCounter;

impl TokenCounter for ApproximateTokenCounter {
    fn count(&self, text: &str) -> usize {
        approximate_tokens(text)
    }

    fn name(&self) -> &str {
        "approximate"
    }
}

/// Four characters per token, rounded up.
pub fn approximate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

// ── HuggingFace ─────────────────────────────────────────────────────────

#[cfg(feature = "hf-tokenizer")]
pub struct HfTokenCounter {
    tokenizer: tokenizers::Tokenizer,
}

#[cfg(feature = "hf-tokenizer")]
impl HfTokenCounter {
    pub fn from_file(path: &std::path::Path) -> TokenizerResult<Self> {
        let tokenizer =
            tokenizers::Tokenizer::from_file(path).map_err(|e| TokenizerError::File {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { tokenizer })
    }
}

#[cfg(feature = "hf-tokenizer")]
impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                tracing::warn!(error = %e, "HF tokenizer failed, using approximate count");
                approximate_tokens(text)
            }
        }
    }

    fn name(&self) -> &str {
        "huggingface"
    }
}
