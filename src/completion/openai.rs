// OpenAI-compatible chat-completion provider.
// Works with OpenAI, Azure-style proxies, OpenRouter, Ollama and anything else
// that serves POST {base_url}/chat/completions.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{CompletionProvider, CompletionRequest, CompletionResponse, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        OpenAiProvider {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Pulls `error.message` out of an OpenAI-style error body, falling back
    /// to the raw text.
    fn error_message(body: &str) -> String {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .and_then(|e| e.get("message").or(Some(e)))
                    .and_then(|m| m.as_str().map(str::to_string))
            })
            .unwrap_or_else(|| truncate(body, 500).to_string())
    }

    fn transport_error(err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::new(format!("request timeout: {err}"))
        } else {
            ProviderError::new(format!("HTTP request failed: {err}"))
        }
    }
}

fn truncate(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let url = self.endpoint();
        tracing::debug!(url = %url, model = %request.model, "POST chat completion");

        let mut req = self.client.post(&url).json(&request.to_body());
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }

        let response = req.send().await.map_err(Self::transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = Self::error_message(&body);
            return Err(ProviderError::with_status(
                status.as_u16(),
                format!("API error {}: {message}", status.as_u16()),
            ));
        }

        let body = response.text().await.map_err(Self::transport_error)?;
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::new(format!(
                "invalid completion payload: {e}: {}",
                truncate(&body, 200)
            ))
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}
