//! LLM-assisted attack pattern analysis.

use std::sync::Arc;
use std::time::Duration;

use nexus_llm::{DEFAULT_TIMEOUT, LlmProvider};
use tracing::{debug, info};

use crate::error::{ToolError, ToolResult};
use crate::events::SecurityEvent;

/// Reply when there is nothing to analyze.
pub const NO_EVENTS_MESSAGE: &str = "No suspicious activities found to analyze.";

const SYSTEM_PROMPT: &str = "You are a Staff Security Engineer.";

const PROMPT_TEMPLATE: &str = "\
Analyze the following suspicious traffic events from our rate limiter (Aegis):

{events_json}

Tasks:
1. Identify any clear attack patterns (e.g., brute force, scraping, DDoS).
2. Identify the most aggressive IP addresses.
3. Recommend specific actions (e.g., ban IP, investigate endpoint).
4. Explain the potential business impact if not addressed.

Keep your response concise, technical, and actionable.";

/// Turns a batch of events into an operator briefing.
#[derive(Clone)]
pub struct AttackAnalyzer {
    provider: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl std::fmt::Debug for AttackAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttackAnalyzer")
            .field("provider", &self.provider.name())
            .field("model", &self.provider.model())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AttackAnalyzer {
    /// Analyzer backed by `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Upper bound on one analysis, on top of the provider's own timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Analyze `events`.
    ///
    /// An empty batch returns [`NO_EVENTS_MESSAGE`] without calling the model.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Timeout`] if the model does not answer in time,
    /// or [`ToolError::Llm`] if the provider fails.
    pub async fn analyze(&self, events: &[SecurityEvent]) -> ToolResult<String> {
        if events.is_empty() {
            return Ok(NO_EVENTS_MESSAGE.to_string());
        }

        let prompt = build_prompt(events)?;
        debug!(
            provider = self.provider.name(),
            model = self.provider.model(),
            events = events.len(),
            "requesting attack analysis"
        );

        let analysis = tokio::time::timeout(
            self.timeout,
            self.provider.complete(SYSTEM_PROMPT, &prompt),
        )
        .await
        .map_err(|_| ToolError::timeout("llm", self.timeout))??;

        info!(
            provider = self.provider.name(),
            events = events.len(),
            chars = analysis.len(),
            "attack analysis complete"
        );
        Ok(analysis)
    }
}

/// Render the fixed analysis prompt for `events`.
///
/// # Errors
///
/// Returns [`ToolError::InvalidEvent`] if the events cannot be serialized.
pub fn build_prompt(events: &[SecurityEvent]) -> ToolResult<String> {
    let events_json = serde_json::to_string_pretty(events)
        .map_err(|e| ToolError::InvalidEvent(format!("cannot serialize events: {e}")))?;
    Ok(PROMPT_TEMPLATE.replace("{events_json}", &events_json))
}
