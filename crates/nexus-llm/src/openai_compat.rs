//! OpenAI-compatible LLM provider implementation.
//!
//! Works with:
//! - `OpenAI` API
//! - Ollama (through its `OpenAI`-compatible `/v1/chat/completions`)
//! - Any `OpenAI`-compatible endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{LlmError, LlmResult};
use crate::provider::{LlmProvider, ProviderConfig, map_send_error};

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_OLLAMA_BASE: &str = "http://localhost:11434";
const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    client: Client,
    config: ProviderConfig,
    url: String,
    label: &'static str,
}

impl OpenAiCompatProvider {
    /// Provider for the hosted `OpenAI` API.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] if the HTTP client cannot be built.
    pub fn openai(config: ProviderConfig) -> LlmResult<Self> {
        let url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());
        Self::build(config, url, "OpenAI")
    }

    /// Provider for an Ollama server.
    ///
    /// `config.base_url` is the server root (e.g. `http://localhost:11434`);
    /// the chat-completions path is appended.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] if the HTTP client cannot be built.
    pub fn ollama(config: ProviderConfig) -> LlmResult<Self> {
        let base = config.base_url.as_deref().unwrap_or(DEFAULT_OLLAMA_BASE);
        let url = format!("{}{CHAT_COMPLETIONS_PATH}", base.trim_end_matches('/'));
        Self::build(config, url, "Ollama")
    }

    fn build(config: ProviderConfig, url: String, label: &'static str) -> LlmResult<Self> {
        Ok(Self {
            client: config.http_client()?,
            config,
            url,
            label,
        })
    }

    /// The full chat-completions URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Build the request body.
    fn build_request(&self, system: &str, prompt: &str) -> Value {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": prompt }));

        serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "stream": false,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        self.label
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, system: &str, prompt: &str) -> LlmResult<String> {
        if self.config.api_key.is_empty() && !is_local_url(&self.url) {
            return Err(LlmError::ApiKeyNotConfigured {
                provider: self.label.to_lowercase(),
            });
        }

        let request_body = self.build_request(system, prompt);

        debug!(
            model = %self.config.model,
            url = %self.url,
            "Making OpenAI-compatible completion request"
        );

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json");

        if !self.config.api_key.is_empty() {
            let mut auth_value =
                reqwest::header::HeaderValue::try_from(format!("Bearer {}", self.config.api_key))
                    .map_err(|e| {
                        LlmError::ConfigError(format!("Invalid API key characters: {e}"))
                    })?;
            auth_value.set_sensitive(true);
            request = request.header("Authorization", auth_value);
        }

        let response = request
            .json(&request_body)
            .send()
            .await
            .map_err(|e| map_send_error(e, &self.config))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, provider = self.label, "completion API error");
            if status.as_u16() == 429 {
                return Err(LlmError::RateLimitExceeded {
                    retry_after_secs: 60,
                });
            }
            return Err(LlmError::ApiRequestFailed(format!(
                "HTTP {}: {body}",
                status.as_u16()
            )));
        }

        let response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))
    }
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("label", &self.label)
            .field("url", &self.url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// OpenAI API response types

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

/// Whether a URL points at a local or sidecar endpoint where an API key is
/// typically not required.
fn is_local_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("localhost")
        || lower.contains("127.0.0.1")
        || lower.contains("[::1]")
        || lower.contains("host.docker.internal")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_ollama_url() {
        let provider = OpenAiCompatProvider::ollama(
            ProviderConfig::new("", "llama3").base_url("http://host.docker.internal:11434/"),
        )
        .unwrap();
        assert_eq!(
            provider.url(),
            "http://host.docker.internal:11434/v1/chat/completions"
        );
        assert_eq!(provider.name(), "Ollama");
    }

    #[test]
    fn test_openai_default_url() {
        let provider = OpenAiCompatProvider::openai(ProviderConfig::new("sk", "gpt-4o")).unwrap();
        assert!(provider.url().contains("api.openai.com"));
    }

    #[test]
    fn test_build_request() {
        let provider = OpenAiCompatProvider::ollama(ProviderConfig::new("", "llama3")).unwrap();
        let request = provider.build_request("Be helpful", "Hi");
        assert_eq!(request["model"], "llama3");
        assert_eq!(request["stream"], false);
        assert_eq!(request["messages"].as_array().unwrap().len(), 2);
        assert_eq!(request["messages"][0]["role"], "system");
    }

    #[tokio::test]
    async fn test_remote_requires_api_key() {
        let provider = OpenAiCompatProvider::openai(ProviderConfig::new("", "gpt-4o")).unwrap();
        let err = provider.complete("", "hi").await.unwrap_err();
        assert!(matches!(err, LlmError::ApiKeyNotConfigured { .. }));
    }

    #[tokio::test]
    async fn test_invalid_api_key_characters() {
        let provider =
            OpenAiCompatProvider::openai(ProviderConfig::new("invalid\nkey", "gpt-4o")).unwrap();
        let err = provider.complete("", "hi").await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::ConfigError(ref msg) if msg.contains("Invalid API key characters")
        ));
    }

    #[tokio::test]
    async fn test_complete_against_local_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Scraping detected."}}]
            })))
            .mount(&server)
            .await;

        let provider =
            OpenAiCompatProvider::ollama(ProviderConfig::new("", "llama3").base_url(server.uri()))
                .unwrap();
        assert_eq!(provider.complete("", "go").await.unwrap(), "Scraping detected.");
    }

    #[tokio::test]
    async fn test_bearer_header_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .mount(&server)
            .await;
        let provider = OpenAiCompatProvider::openai(
            ProviderConfig::new("sk-test", "gpt-4o")
                .base_url(format!("{}/v1/chat/completions", server.uri())),
        )
        .unwrap();
        assert_eq!(provider.complete("", "go").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;
        let provider = OpenAiCompatProvider::ollama(
            ProviderConfig::new("", "llama3")
                .base_url(server.uri())
                .timeout(Duration::from_millis(50)),
        )
        .unwrap();
        let err = provider.complete("", "go").await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout { after_ms: 50 }));
    }
}
