//! Provider failure taxonomy.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use crate::tokenizer::TokenizerError;

/// Errors from a language-model backend.
///
/// Backend-specific failures are mapped onto these variants before they
/// leave the provider, so callers only ever match on this enum.
#[derive(Debug, Error, Diagnostic)]
pub enum ProviderError {
    #[error("rate limited by provider: {message}")]
    #[diagnostic(
        code(grokken::provider::rate_limited),
        help("Retried with backoff until `provider.max_retries` ran out. Lower concurrency or raise the limit.")
    )]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("provider rejected credentials: {message}")]
    #[diagnostic(
        code(grokken::provider::authentication),
        help("Check the API key environment variable for the configured provider.")
    )]
    Authentication { message: String },

    #[error("API key not found in ${env_var}")]
    #[diagnostic(
        code(grokken::provider::missing_api_key),
        help("Export {env_var}, or point `provider.api_key_env` at the variable holding the key.")
    )]
    MissingApiKey { env_var: String },

    #[error("input exceeds the model's context window: {message}")]
    #[diagnostic(
        code(grokken::provider::context_length),
        help("Reduce `strategy.max_context_tokens` so segments and accumulated summaries fit.")
    )]
    ContextLength { message: String },

    #[error("provider request failed: {message}")]
    #[diagnostic(
        code(grokken::provider::request),
        help("Transient failures are retried; anything else needs a config or network fix.")
    )]
    Request {
        status: Option<u16>,
        message: String,
        transient: bool,
    },

    #[error("unexpected provider response: {message}")]
    #[diagnostic(
        code(grokken::provider::invalid_response),
        help("The backend answered, but not in the shape the adapter expects.")
    )]
    InvalidResponse { message: String },

    #[error("provider \"{provider}\" is not available in this build")]
    #[diagnostic(
        code(grokken::provider::unsupported),
        help("Rebuild with `--features {feature}` or choose another `provider.name`.")
    )]
    Unsupported { provider: String, feature: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Tokenizer(#[from] TokenizerError),
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    /// Rate limits and transient request failures are retried; everything
    /// else surfaces immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Request { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Server-suggested wait before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::MissingApiKey { .. })
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Request {
            status: None,
            message: message.into(),
            transient: true,
        }
    }
}
