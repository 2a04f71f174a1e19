//! Blocking JSON-over-HTTP plumbing shared by the HTTP providers.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::provider::{ProviderError, ProviderResult};

/// Map an HTTP error status and body onto the failure taxonomy.
pub fn classify_status(status: u16, retry_after: Option<Duration>, body: &str) -> ProviderError {
    let message = format!("HTTP {status}: {}", error_message(body));
    match status {
        429 => ProviderError::RateLimited {
            message,
            retry_after,
        },
        401 | 403 => ProviderError::Authentication { message },
        400 | 413 if mentions_context_limit(body) => ProviderError::ContextLength { message },
        408 | 409 | 500..=599 => ProviderError::Request {
            status: Some(status),
            message,
            transient: true,
        },
        _ => ProviderError::Request {
            status: Some(status),
            message,
            transient: false,
        },
    }
}

/// Whether an error body says the prompt did not fit the context window.
pub fn mentions_context_limit(body: &str) -> bool {
    let lower = body.to_lowercase();
    [
        "context_length",
        "maximum context",
        "context window",
        "too many input tokens",
        "prompt is too long",
        "input is too long",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

/// Pull `error.message` out of a JSON error body, or fall back to the raw
/// body (truncated).
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(500).collect())
}

/// `Retry-After` in seconds (fractional values allowed).
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// POST `body` as JSON and decode the JSON reply into `T`.
pub fn post_json<T: DeserializeOwned>(
    agent: &ureq::Agent,
    url: &str,
    headers: &[(&str, &str)],
    timeout: Duration,
    body: &serde_json::Value,
) -> ProviderResult<T> {
    let mut request = agent
        .post(url)
        .timeout(timeout)
        .set("Content-Type", "application/json");
    for (name, value) in headers {
        request = request.set(name, value);
    }

    match request.send_json(body) {
        Ok(response) => {
            let text = response.into_string().map_err(|e| ProviderError::Request {
                status: None,
                message: format!("failed to read response body: {e}"),
                transient: true,
            })?;
            serde_json::from_str(&text).map_err(|e| ProviderError::InvalidResponse {
                message: format!("{e}"),
            })
        }
        Err(ureq::Error::Status(code, response)) => {
            let retry_after = parse_retry_after(response.header("retry-after"));
            let body = response.into_string().unwrap_or_default();
            Err(classify_status(code, retry_after, &body))
        }
        Err(ureq::Error::Transport(transport)) => Err(ProviderError::transient(format!(
            "transport error: {transport}"
        ))),
    }
}
