//! Claude (Anthropic) LLM provider implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{LlmError, LlmResult};
use crate::provider::{LlmProvider, ProviderConfig, map_send_error};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Claude LLM provider.
pub struct ClaudeProvider {
    client: Client,
    config: ProviderConfig,
}

impl std::fmt::Debug for ClaudeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeProvider")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ClaudeProvider {
    /// Create a new Claude provider.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] if the HTTP client cannot be built.
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        Ok(Self {
            client: config.http_client()?,
            config,
        })
    }

    /// Build the API request body.
    fn build_request(&self, system: &str, prompt: &str) -> Value {
        let mut request = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        if !system.is_empty() {
            request["system"] = Value::String(system.to_string());
        }

        request
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "Anthropic Claude"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, system: &str, prompt: &str) -> LlmResult<String> {
        if self.config.api_key.is_empty() {
            return Err(LlmError::ApiKeyNotConfigured {
                provider: "claude".to_string(),
            });
        }

        let request_body = self.build_request(system, prompt);
        let url = self.config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL);

        debug!(model = self.config.model, "Sending Claude request");

        let mut api_key_header = reqwest::header::HeaderValue::try_from(&self.config.api_key)
            .map_err(|e| LlmError::ConfigError(format!("Invalid API key characters: {e}")))?;
        api_key_header.set_sensitive(true);

        let response = self
            .client
            .post(url)
            .header("x-api-key", api_key_header)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| map_send_error(e, &self.config))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Claude API error");

            if status.as_u16() == 429 {
                return Err(LlmError::RateLimitExceeded {
                    retry_after_secs: 60,
                });
            }

            return Err(LlmError::ApiRequestFailed(format!(
                "Status {status}: {body}"
            )));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let text: String = api_response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect();
        if text.is_empty() {
            return Err(LlmError::InvalidResponse(
                "response contained no text blocks".to_string(),
            ));
        }
        Ok(text)
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}
