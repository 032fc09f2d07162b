//! LLM provider trait.
//!
//! Nexus only ever needs one thing from a model: turn a system prompt and a
//! user prompt into prose.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{LlmError, LlmResult};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// LLM provider trait.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Get the model being used.
    fn model(&self) -> &str;

    /// Complete `prompt` under `system` and return the generated text.
    async fn complete(&self, system: &str, prompt: &str) -> LlmResult<String>;
}

/// Configuration for LLM providers.
#[derive(Clone)]
pub struct ProviderConfig {
    /// API key. Empty for local models.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Maximum tokens to generate.
    pub max_tokens: usize,
    /// Temperature (0.0 - 1.0).
    pub temperature: f64,
    /// API base URL (for custom endpoints).
    pub base_url: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("has_api_key", &!self.api_key.is_empty())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Create a new config with API key and model.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Set max tokens.
    #[must_use]
    pub fn max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = max;
        self
    }

    /// Set temperature.
    #[must_use]
    pub fn temperature(mut self, temp: f64) -> Self {
        self.temperature = temp.clamp(0.0, 1.0);
        self
    }

    /// Set base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build an HTTP client honoring [`timeout`](Self::timeout).
    pub(crate) fn http_client(&self) -> LlmResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| LlmError::ConfigError(format!("failed to build HTTP client: {e}")))
    }

    /// Timeout in whole milliseconds, for error reporting.
    pub(crate) fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "llama3".to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Map a transport failure, recognizing timeouts.
pub(crate) fn map_send_error(e: reqwest::Error, config: &ProviderConfig) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout {
            after_ms: config.timeout_ms(),
        }
    } else {
        LlmError::HttpError(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_api_key() {
        let config = ProviderConfig::new("sk-secret", "gpt-4o-mini");
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("has_api_key: true"));
    }

    #[test]
    fn test_builder() {
        let config = ProviderConfig::new("", "llama3")
            .max_tokens(256)
            .temperature(3.0)
            .base_url("http://localhost:11434")
            .timeout(Duration::from_secs(60));
        assert_eq!(config.max_tokens, 256);
        assert!((config.temperature - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.timeout_ms(), 60_000);
    }
}
