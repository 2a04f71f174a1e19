//! OpenAI Chat Completions backend.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::config::ProviderConfig;
use crate::provider::pricing::OPENAI_PRICES;
use crate::provider::{
    FinishReason, GenerationParams, GenerationResult, LlmProvider, ProviderError, ProviderResult,
    RetryPolicy, api_key_from_env, http,
};
use crate::schema::ChatMessage;
use crate::tokenizer::TokenCounter;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Client for `POST /chat/completions`.
///
/// Token counting goes through the shared BPE counter so budgets match
/// what the API bills.
pub struct OpenAiProvider {
    config: ProviderConfig,
    api_key: String,
    agent: ureq::Agent,
    retry: RetryPolicy,
    counter: Arc<dyn TokenCounter>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig, api_key: String, counter: Arc<dyn TokenCounter>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        let retry = RetryPolicy::new(config.max_retries);
        Self {
            config,
            api_key,
            agent,
            retry,
            counter,
        }
    }

    /// Build with the key from `$OPENAI_API_KEY` (or `api_key_env`).
    pub fn from_env(config: ProviderConfig, counter: Arc<dyn TokenCounter>) -> ProviderResult<Self> {
        let api_key = api_key_from_env(&config, API_KEY_ENV)?;
        Ok(Self::new(config, api_key, counter))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        let base = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    fn request_body(&self, messages: &[ChatMessage], params: &GenerationParams) -> serde_json::Value {
        let msgs: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        serde_json::json!({
            "model": self.config.model,
            "messages": msgs,
            "temperature": params.temperature.unwrap_or(self.config.temperature),
            "max_completion_tokens": params.max_tokens.unwrap_or(self.config.max_tokens),
        })
    }

    fn into_result(response: ChatResponse) -> ProviderResult<GenerationResult> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: "API returned empty choices list".into(),
            })?;
        let (input_tokens, output_tokens) = response
            .usage
            .map_or((0, 0), |u| (u.prompt_tokens, u.completion_tokens));
        Ok(GenerationResult {
            text: choice.message.content.unwrap_or_default(),
            input_tokens,
            output_tokens,
            model: response.model,
            finish_reason: FinishReason::from_api(choice.finish_reason.as_deref()),
        })
    }
}

impl LlmProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn generate_chat(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> ProviderResult<GenerationResult> {
        let url = self.endpoint();
        let body = self.request_body(messages, params);
        let auth = format!("Bearer {}", self.api_key);
        let timeout = params
            .timeout
            .unwrap_or(Duration::from_secs(self.config.timeout_secs));

        let response: ChatResponse = self.retry.run(|_| {
            http::post_json(
                &self.agent,
                &url,
                &[("Authorization", auth.as_str())],
                timeout,
                &body,
            )
        })?;
        let result = Self::into_result(response)?;
        if result.is_truncated() {
            tracing::warn!(
                model = %result.model,
                output_tokens = result.output_tokens,
                "response truncated at the output token limit"
            );
        }
        Ok(result)
    }

    fn count_tokens(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    fn estimate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        OPENAI_PRICES.cost(&self.config.model, input_tokens, output_tokens)
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("model", &self.config.model)
            .field("endpoint", &self.endpoint())
            .field("retry", &self.retry)
            .finish()
    }
}
