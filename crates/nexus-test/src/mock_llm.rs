//! Mock LLM provider for testing.
//!
//! [`MockLlmProvider`] replays a queue of scripted replies, records every
//! prompt it receives, and can be slowed down to exercise timeouts.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nexus_llm::{LlmError, LlmProvider, LlmResult};

/// Deterministic, queue-based [`LlmProvider`].
///
/// Each call to `complete` pops one scripted turn. An exhausted queue yields
/// an [`LlmError::InvalidResponse`] so a test that calls the model more often
/// than it expected fails loudly.
#[derive(Debug, Default)]
pub struct MockLlmProvider {
    turns: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<(String, String)>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockLlmProvider {
    /// Provider with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    #[must_use]
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        if let Ok(mut guard) = self.turns.lock() {
            guard.push_back(Ok(text.into()));
        }
        self
    }

    /// Queue a failure, surfaced as [`LlmError::ApiRequestFailed`].
    #[must_use]
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        if let Ok(mut guard) = self.turns.lock() {
            guard.push_back(Err(message.into()));
        }
        self
    }

    /// Sleep before answering each call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `complete` calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every `(system, prompt)` pair received, in call order.
    #[must_use]
    pub fn captured_prompts(&self) -> Vec<(String, String)> {
        self.prompts
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, system: &str, prompt: &str) -> LlmResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.prompts.lock() {
            guard.push((system.to_string(), prompt.to_string()));
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let turn = self.turns.lock().ok().and_then(|mut g| g.pop_front());
        match turn {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(LlmError::ApiRequestFailed(message)),
            None => Err(LlmError::InvalidResponse(
                "mock provider script exhausted".to_string(),
            )),
        }
    }
}
