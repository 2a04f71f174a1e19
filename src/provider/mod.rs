//! Language-model provider adapters.
//!
//! [`LlmProvider`] is the only surface the rest of the crate sees: send a
//! conversation, get back text plus token counts and a finish reason. Each
//! backend maps its own failures onto [`ProviderError`] and retries through
//! a shared [`RetryPolicy`].

#[cfg(feature = "anthropic")]
pub mod anthropic;
mod error;
pub mod http;
pub mod openai;
pub mod pricing;
mod retry;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ProviderConfig, ProviderKind};
use crate::schema::ChatMessage;
use crate::tokenizer::TokenCounter;

pub use error::{ProviderError, ProviderResult};
pub use retry::{MAX_BACKOFF, RetryPolicy, Sleeper};

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of the response.
    Stop,
    /// Cut off by the output token limit.
    Length,
    ContentFilter,
    Other(String),
    /// The backend did not say.
    Unknown,
}

impl FinishReason {
    /// Normalize a backend's stop reason.
    pub fn from_api(raw: Option<&str>) -> Self {
        match raw {
            None => Self::Unknown,
            Some("stop" | "end_turn" | "stop_sequence") => Self::Stop,
            Some("length" | "max_tokens") => Self::Length,
            Some("content_filter" | "refusal") => Self::ContentFilter,
            Some(other) => Self::Other(other.to_string()),
        }
    }

    /// The output hit the length limit and must not be used.
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Length)
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Length => write!(f, "length"),
            Self::ContentFilter => write!(f, "content_filter"),
            Self::Other(s) => write!(f, "{s}"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Output of one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Model identifier reported by the backend.
    pub model: String,
    pub finish_reason: FinishReason,
}

impl GenerationResult {
    pub fn is_truncated(&self) -> bool {
        self.finish_reason.is_truncated()
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Running token and cost totals over many calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub calls: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

impl TokenUsage {
    /// Count one call, priced by `provider`.
    pub fn record(&mut self, provider: &dyn LlmProvider, result: &GenerationResult) {
        self.calls += 1;
        self.input_tokens += result.input_tokens;
        self.output_tokens += result.output_tokens;
        self.cost += provider.estimate_cost(result.input_tokens, result.output_tokens);
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.calls += other.calls;
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cost += other.cost;
    }
}

/// Per-call overrides. `None` falls back to the provider's config.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<Duration>,
}

impl GenerationParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A language-model backend.
pub trait LlmProvider: Send {
    /// Configured model identifier.
    fn model_name(&self) -> &str;

    /// Generate a reply to a multi-turn conversation. Implementations
    /// normalize the message list to whatever their backend accepts.
    fn generate_chat(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> ProviderResult<GenerationResult>;

    /// Generate a reply to a single prompt with an optional system message.
    fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        params: &GenerationParams,
    ) -> ProviderResult<GenerationResult> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system.filter(|s| !s.is_empty()) {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));
        self.generate_chat(&messages, params)
    }

    /// Tokens `text` would occupy in this provider's vocabulary.
    fn count_tokens(&self, text: &str) -> usize;

    /// Estimated cost of a call, in currency units.
    fn estimate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64;
}

impl<P: LlmProvider + ?Sized> LlmProvider for Box<P> {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn generate_chat(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> ProviderResult<GenerationResult> {
        (**self).generate_chat(messages, params)
    }

    fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        params: &GenerationParams,
    ) -> ProviderResult<GenerationResult> {
        (**self).generate(prompt, system, params)
    }

    fn count_tokens(&self, text: &str) -> usize {
        (**self).count_tokens(text)
    }

    fn estimate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (**self).estimate_cost(input_tokens, output_tokens)
    }
}

/// Read the API key from `api_key_env`, or the provider's default variable.
pub(crate) fn api_key_from_env(config: &ProviderConfig, default_env: &str) -> ProviderResult<String> {
    let env_var = config.api_key_env.as_deref().unwrap_or(default_env);
    match std::env::var(env_var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ProviderError::MissingApiKey {
            env_var: env_var.to_string(),
        }),
    }
}

/// Build the provider named in the config.
///
/// Fails at construction when the API key is missing or the backend was
/// compiled out, never on first use.
pub fn create_provider(
    config: &ProviderConfig,
    counter: Arc<dyn TokenCounter>,
) -> ProviderResult<Box<dyn LlmProvider>> {
    match config.name {
        ProviderKind::OpenAi => Ok(Box::new(openai::OpenAiProvider::from_env(
            config.clone(),
            counter,
        )?)),
        #[cfg(feature = "anthropic")]
        ProviderKind::Anthropic => Ok(Box::new(anthropic::AnthropicProvider::from_env(
            config.clone(),
        )?)),
        #[cfg(not(feature = "anthropic"))]
        ProviderKind::Anthropic => Err(ProviderError::Unsupported {
            provider: config.name.to_string(),
            feature: "anthropic".into(),
        }),
    }
}
