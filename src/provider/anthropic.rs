//! Anthropic Messages backend.
//!
//! The Messages API takes the system prompt as a top-level field and
//! requires user/assistant turns to alternate strictly, so conversations are
//! normalized before sending.

use std::time::Duration;

use serde::Deserialize;

use crate::config::ProviderConfig;
use crate::provider::pricing::ANTHROPIC_PRICES;
use crate::provider::{
    FinishReason, GenerationParams, GenerationResult, LlmProvider, ProviderError, ProviderResult,
    RetryPolicy, api_key_from_env, http,
};
use crate::schema::{ChatMessage, Role};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const API_VERSION: &str = "2023-06-01";

/// Highest temperature the Messages API accepts.
const MAX_TEMPERATURE: f32 = 1.0;

pub struct AnthropicProvider {
    config: ProviderConfig,
    api_key: String,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

/// A conversation reshaped for the Messages API.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedChat {
    /// All system messages, in order, joined with a blank line.
    pub system: Option<String>,
    /// Alternating user/assistant turns.
    pub messages: Vec<ChatMessage>,
}

/// Hoist system messages out of the list and merge consecutive same-role
/// turns with a blank line, keeping order.
pub fn normalize_messages(messages: &[ChatMessage]) -> NormalizedChat {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut merged: Vec<ChatMessage> = Vec::with_capacity(messages.len());

    for msg in messages {
        if msg.role == Role::System {
            system_parts.push(&msg.content);
            continue;
        }
        match merged.last_mut() {
            Some(last) if last.role == msg.role => {
                last.content.push_str("\n\n");
                last.content.push_str(&msg.content);
            }
            _ => merged.push(msg.clone()),
        }
    }

    NormalizedChat {
        system: (!system_parts.is_empty()).then(|| system_parts.join("\n\n")),
        messages: merged,
    }
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig, api_key: String) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        let retry = RetryPolicy::new(config.max_retries);
        Self {
            config,
            api_key,
            agent,
            retry,
        }
    }

    /// Build with the key from `$ANTHROPIC_API_KEY` (or `api_key_env`).
    pub fn from_env(config: ProviderConfig) -> ProviderResult<Self> {
        let api_key = api_key_from_env(&config, API_KEY_ENV)?;
        Ok(Self::new(config, api_key))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        let base = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        format!("{}/messages", base.trim_end_matches('/'))
    }

    fn request_body(&self, chat: &NormalizedChat, params: &GenerationParams) -> serde_json::Value {
        let mut temperature = params.temperature.unwrap_or(self.config.temperature);
        if temperature > MAX_TEMPERATURE {
            tracing::debug!(temperature, "clamping temperature to 1.0");
            temperature = MAX_TEMPERATURE;
        }

        let msgs: Vec<serde_json::Value> = chat
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": msgs,
            "temperature": temperature,
            "max_tokens": params.max_tokens.unwrap_or(self.config.max_tokens),
        });
        if let Some(system) = &chat.system {
            body["system"] = serde_json::Value::String(system.clone());
        }
        body
    }

    fn into_result(response: MessagesResponse) -> ProviderResult<GenerationResult> {
        let text = response
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: "API returned empty content list".into(),
            })?;
        Ok(GenerationResult {
            text,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            model: response.model,
            finish_reason: FinishReason::from_api(response.stop_reason.as_deref()),
        })
    }
}

impl LlmProvider for AnthropicProvider {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn generate_chat(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> ProviderResult<GenerationResult> {
        let chat = normalize_messages(messages);
        let url = self.endpoint();
        let body = self.request_body(&chat, params);
        let timeout = params
            .timeout
            .unwrap_or(Duration::from_secs(self.config.timeout_secs));
        let headers = [
            ("x-api-key", self.api_key.as_str()),
            ("anthropic-version", API_VERSION),
        ];

        let response: MessagesResponse = self
            .retry
            .run(|_| http::post_json(&self.agent, &url, &headers, timeout, &body))?;
        let result = Self::into_result(response)?;
        if result.is_truncated() {
            tracing::warn!(
                max_tokens = params.max_tokens.unwrap_or(self.config.max_tokens),
                output_tokens = result.output_tokens,
                "response truncated at max_tokens; output may be incomplete"
            );
        }
        Ok(result)
    }

    /// Four characters per token; the API has no local tokenizer.
    fn count_tokens(&self, text: &str) -> usize {
        text.chars().count() / 4
    }

    fn estimate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        ANTHROPIC_PRICES.cost(&self.config.model, input_tokens, output_tokens)
    }
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("model", &self.config.model)
            .field("endpoint", &self.endpoint())
            .field("retry", &self.retry)
            .finish()
    }
}
