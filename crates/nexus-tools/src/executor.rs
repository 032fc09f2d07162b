//! The concrete [`ActionExecutor`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nexus_approval::{Action, ActionExecutor, ExecutorError, ToolOutput};
use tracing::{debug, warn};

use crate::analysis::{AttackAnalyzer, NO_EVENTS_MESSAGE};
use crate::blocklist::Blocklist;
use crate::error::{ToolError, ToolResult};
use crate::events::EventSource;
use crate::health::HealthMonitor;

/// Default bound on event-log and blocklist calls.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Dispatches validated actions to the health monitor, event source,
/// analyzer and blocklist.
pub struct ToolExecutor {
    health: HealthMonitor,
    events: Arc<dyn EventSource>,
    blocklist: Blocklist,
    analyzer: AttackAnalyzer,
    store_timeout: Duration,
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("health", &self.health)
            .field("blocklist", &self.blocklist)
            .field("analyzer", &self.analyzer)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

impl ToolExecutor {
    /// Wire the collaborators together.
    #[must_use]
    pub fn new(
        health: HealthMonitor,
        events: Arc<dyn EventSource>,
        blocklist: Blocklist,
        analyzer: AttackAnalyzer,
    ) -> Self {
        Self {
            health,
            events,
            blocklist,
            analyzer,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Bound event-log and blocklist calls.
    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    async fn bounded<T>(
        &self,
        component: &'static str,
        fut: impl Future<Output = ToolResult<T>>,
    ) -> ToolResult<T> {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .map_err(|_| ToolError::timeout(component, self.store_timeout))?
    }

    async fn run(&self, action: &Action) -> ToolResult<ToolOutput> {
        match action {
            Action::CheckSystemHealth => {
                let health = self.health.system_health().await;
                Ok(ToolOutput::Json(serde_json::to_value(health).map_err(
                    |e| ToolError::InvalidEvent(format!("cannot encode health: {e}")),
                )?))
            },
            Action::GetSecurityEvents { limit } => {
                let events = self
                    .bounded("events", self.events.recent(limit_to_usize(*limit)))
                    .await?;
                Ok(ToolOutput::Json(serde_json::to_value(events).map_err(
                    |e| ToolError::InvalidEvent(format!("cannot encode events: {e}")),
                )?))
            },
            Action::AnalyzeAttackPatterns { limit } => {
                let events = self
                    .bounded("events", self.events.recent(limit_to_usize(*limit)))
                    .await?;
                if events.is_empty() {
                    return Ok(ToolOutput::Text(NO_EVENTS_MESSAGE.to_string()));
                }
                Ok(ToolOutput::Text(self.analyzer.analyze(&events).await?))
            },
            Action::BanSuspiciousIp { ip, hours } => {
                let summary = self
                    .bounded("blocklist", self.blocklist.ban(*ip, *hours))
                    .await?;
                Ok(ToolOutput::Text(summary))
            },
        }
    }
}

#[async_trait]
impl ActionExecutor for ToolExecutor {
    async fn execute(&self, action: &Action) -> Result<ToolOutput, ExecutorError> {
        debug!(tool = %action.tool(), action = %action, "executing action");
        self.run(action).await.map_err(|e| {
            warn!(tool = %action.tool(), error = %e, "action failed");
            ExecutorError::from(e)
        })
    }
}

fn limit_to_usize(limit: u32) -> usize {
    usize::try_from(limit).unwrap_or(usize::MAX)
}
