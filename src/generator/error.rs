//! Generator and checkpoint error types.

use miette::Diagnostic;
use thiserror::Error;

use crate::analyzer::AnalysisError;
use crate::provider::ProviderError;
use crate::schema::{SchemaError, Strategy};
use crate::segment::SegmentError;
use crate::source::SourceError;

/// Errors from checkpoint persistence and resume validation.
#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointError {
    #[error("checkpoint I/O failed: {path}")]
    #[diagnostic(
        code(grokken::checkpoint::io),
        help("Check that the output directory exists and is writable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize checkpoint for \"{barcode}\": {message}")]
    #[diagnostic(code(grokken::checkpoint::serialize))]
    Serialize { barcode: String, message: String },

    #[error("failed to parse checkpoint {path}: {message}")]
    #[diagnostic(
        code(grokken::checkpoint::parse),
        help("The checkpoint is not valid JSON for this version. Delete it to start the book over.")
    )]
    Parse { path: String, message: String },

    #[error(
        "checkpoint strategy '{checkpoint}' does not match analyzed strategy '{analyzed}' for \"{barcode}\""
    )]
    #[diagnostic(
        code(grokken::checkpoint::strategy_mismatch),
        help("The strategy thresholds changed since the checkpoint was written. Restore the old config or delete the checkpoint.")
    )]
    StrategyMismatch {
        barcode: String,
        checkpoint: Strategy,
        analyzed: Strategy,
    },

    #[error("checkpoint barcode \"{found}\" does not match requested barcode \"{expected}\"")]
    #[diagnostic(
        code(grokken::checkpoint::barcode_mismatch),
        help("Pass the checkpoint that belongs to this book, or drop `resume_from`.")
    )]
    BarcodeMismatch { expected: String, found: String },

    #[error("checkpoint for \"{barcode}\" has segment {index} ending at {end}, past the text length {text_len}")]
    #[diagnostic(
        code(grokken::checkpoint::stale_segments),
        help("The source text changed since the checkpoint was written. Delete the checkpoint to resegment.")
    )]
    StaleSegments {
        barcode: String,
        index: usize,
        end: usize,
        text_len: usize,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Inconsistent(#[from] SchemaError),
}

pub type CheckpointResult<T> = std::result::Result<T, CheckpointError>;

/// Errors from a generation run.
#[derive(Debug, Error, Diagnostic)]
pub enum GeneratorError {
    #[error("{what} for \"{barcode}\" was truncated (finish reason: {finish_reason})")]
    #[diagnostic(
        code(grokken::generator::truncated),
        help("Raise `provider.max_tokens` or lower the summary token targets.")
    )]
    TruncatedOutput {
        barcode: String,
        what: String,
        finish_reason: String,
    },

    #[error("{what} for \"{barcode}\" came back empty")]
    #[diagnostic(
        code(grokken::generator::empty_output),
        help("The model returned no text. Rerun the book; a checkpoint keeps completed segments.")
    )]
    EmptyOutput { barcode: String, what: String },

    #[error("run interrupted")]
    #[diagnostic(
        code(grokken::generator::interrupted),
        help("Rerun with `auto_resume = true` or `--resume` to continue from the last checkpoint.")
    )]
    Interrupted,

    #[error("not attempted, run interrupted")]
    #[diagnostic(
        code(grokken::generator::not_attempted),
        help("Rerun the collection to process the books it did not reach.")
    )]
    NotAttempted,

    #[error("unknown collection \"{name}\"")]
    #[diagnostic(
        code(grokken::generator::unknown_collection),
        help("Run `grokken books` to list the collections in the built-in catalog.")
    )]
    UnknownCollection { name: String },

    #[error("failed to write output: {path}")]
    #[diagnostic(
        code(grokken::generator::output),
        help("Ensure you have write permissions to the output directory.")
    )]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {what}: {message}")]
    #[diagnostic(code(grokken::generator::serialize))]
    Serialize { what: String, message: String },

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
}

pub type GeneratorResult<T> = std::result::Result<T, GeneratorError>;
