//! Direct API providers speaking the OpenAI chat-completions dialect.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use coordination::{AdapterError, ProviderAdapter, ProviderResponse, ProviderSpec, TaskPayload};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Status reported when the request itself timed out.
const REQUEST_TIMEOUT_STATUS: i32 = 408;

/// Status reported for a 2xx response whose body can't be used.
const MALFORMED_RESPONSE_STATUS: i32 = 502;

/// Rate-limit headers copied into the diagnostic so the cooldown parser sees them.
const RATE_LIMIT_HEADERS: &[&str] = &[
    "x-ratelimit-reset",
    "x-ratelimit-reset-requests",
    "x-ratelimit-reset-tokens",
];

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// `POST {endpoint}/chat/completions` via `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpAdapter {
    client: reqwest::Client,
}

impl HttpAdapter {
    pub fn new() -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AdapterError::Misconfigured(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Completion URL for an endpoint, tolerating a trailing slash.
pub fn completions_url(endpoint: &str) -> String {
    format!("{}/chat/completions", endpoint.trim_end_matches('/'))
}

/// Error body plus any reset hints carried in headers.
pub fn fold_headers(body: &str, headers: &HeaderMap) -> String {
    let mut diagnostic = body.trim().to_string();
    if let Some(value) = headers.get(RETRY_AFTER).and_then(|v| v.to_str().ok()) {
        diagnostic.push_str(&format!("\nretry-after: {value}"));
    }
    for name in RATE_LIMIT_HEADERS {
        if let Some(value) = headers.get(*name).and_then(|v| v.to_str().ok()) {
            diagnostic.push_str(&format!("\n{name}: {value}"));
        }
    }
    diagnostic
}

#[async_trait]
impl ProviderAdapter for HttpAdapter {
    async fn invoke(
        &self,
        provider: &ProviderSpec,
        model: &str,
        payload: &TaskPayload,
        timeout: Duration,
    ) -> Result<ProviderResponse, AdapterError> {
        let endpoint = provider.endpoint.as_deref().ok_or_else(|| {
            AdapterError::Misconfigured(format!("api provider '{}' has no endpoint", provider.id))
        })?;

        let api_key = match &provider.api_key_env {
            Some(var) => match std::env::var(var) {
                Ok(key) if !key.trim().is_empty() => Some(key),
                _ => {
                    return Ok(ProviderResponse::failure(
                        401,
                        format!("API key missing: ${var} is not set"),
                    ));
                }
            },
            None => None,
        };

        let body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: &payload.prompt,
            }],
            max_tokens: provider.max_tokens,
        };

        let mut request = self
            .client
            .post(completions_url(endpoint))
            .timeout(timeout)
            .json(&body);
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        debug!(provider = %provider.id, %model, "Sending completion request");
        let started = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Ok(ProviderResponse::failure(
                    REQUEST_TIMEOUT_STATUS,
                    format!("request timed out: {e}"),
                )
                .with_duration(started.elapsed()));
            }
            Err(e) => return Err(AdapterError::Transport(format!("error sending request: {e}"))),
        };

        let status = response.status();
        let headers = response.headers().clone();
        let text = response
            .text()
            .await
            .map_err(|e| AdapterError::Transport(format!("error reading response body: {e}")))?;
        let duration = started.elapsed();

        if !status.is_success() {
            return Ok(ProviderResponse::failure(
                i32::from(status.as_u16()),
                fold_headers(&text, &headers),
            )
            .with_duration(duration));
        }

        let content = serde_json::from_str::<ChatResponse>(&text)
            .ok()
            .and_then(|r| r.choices.into_iter().next())
            .and_then(|c| c.message.content);
        Ok(match content {
            Some(content) => ProviderResponse::success(content).with_duration(duration),
            None => ProviderResponse::failure(
                MALFORMED_RESPONSE_STATUS,
                format!("upstream error: malformed completion body: {}", truncate(&text, 200)),
            )
            .with_duration(duration),
        })
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_completions_url() {
        assert_eq!(
            completions_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            completions_url("http://localhost:8080/v1"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_fold_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        headers.insert("x-ratelimit-reset-tokens", HeaderValue::from_static("6s"));

        let diagnostic = fold_headers("{\"error\":\"rate limited\"}\n", &headers);
        assert_eq!(
            diagnostic,
            "{\"error\":\"rate limited\"}\nretry-after: 30\nx-ratelimit-reset-tokens: 6s"
        );
    }

    #[test]
    fn test_chat_response_parsing() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"hi"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hi"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 10), "ok");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let adapter = HttpAdapter::new().unwrap();
        let provider = ProviderSpec::api("local", "http://127.0.0.1:9/v1", &["gpt-4o"]);
        let result = adapter
            .invoke(
                &provider,
                "gpt-4o",
                &TaskPayload::new("hi"),
                Duration::from_secs(5),
            )
            .await;
        assert!(matches!(result, Err(AdapterError::Transport(_))));
    }
}
