//! Rich diagnostic error types for grokken.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so operators know exactly which document
//! failed and what to do about it. This module ties them together.

use miette::Diagnostic;
use thiserror::Error;

use crate::analyzer::AnalysisError;
use crate::clean::CleanError;
use crate::config::ConfigError;
use crate::generator::{CheckpointError, GeneratorError};
use crate::provider::ProviderError;
use crate::schema::SchemaError;
use crate::segment::SegmentError;
use crate::source::SourceError;
use crate::tokenizer::TokenizerError;

/// Top-level error type for grokken.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, sources) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum GrokkenError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Tokenizer(#[from] TokenizerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Segment(#[from] SegmentError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Clean(#[from] CleanError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Generator(#[from] GeneratorError),
}

/// Convenience alias used by the binary and integration code.
pub type GrokkenResult<T> = std::result::Result<T, GrokkenError>;
