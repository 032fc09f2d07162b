//! Mock collaborators for the approval interlock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nexus_approval::{Action, ActionExecutor, ExecutorError, ToolOutput};

/// [`ActionExecutor`] that records every action it is asked to run.
///
/// Replies come from a queue of scripted results; once the queue is empty
/// every action succeeds with `executed {action}`. Clones share state, so a
/// test can hand one clone to the interlock and inspect the other.
///
/// Uses `std::sync::Mutex` internally so builder methods work without a
/// runtime.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    actions: Arc<Mutex<Vec<Action>>>,
    replies: Arc<Mutex<VecDeque<Result<ToolOutput, ExecutorError>>>>,
    delay: Option<Duration>,
}

impl RecordingExecutor {
    /// Executor that succeeds for every action.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful output.
    #[must_use]
    pub fn with_output(self, output: ToolOutput) -> Self {
        if let Ok(mut guard) = self.replies.lock() {
            guard.push_back(Ok(output));
        }
        self
    }

    /// Queue a failure.
    #[must_use]
    pub fn with_failure(self, error: ExecutorError) -> Self {
        if let Ok(mut guard) = self.replies.lock() {
            guard.push_back(Err(error));
        }
        self
    }

    /// Sleep before each execution.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// A shared handle for
    /// [`ApprovalInterlock::new`](nexus_approval::ApprovalInterlock::new).
    #[must_use]
    pub fn handle(&self) -> Arc<dyn ActionExecutor> {
        Arc::new(self.clone())
    }

    /// Actions executed so far, in order.
    #[must_use]
    pub fn actions(&self) -> Vec<Action> {
        self.actions
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    /// Number of executions so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.actions.lock().map(|g| g.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, action: &Action) -> Result<ToolOutput, ExecutorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Ok(mut guard) = self.actions.lock() {
            guard.push(action.clone());
        }

        let reply = self.replies.lock().ok().and_then(|mut g| g.pop_front());
        reply.unwrap_or_else(|| Ok(ToolOutput::Text(format!("executed {action}"))))
    }
}
