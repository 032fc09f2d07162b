//! The tool-call boundary.
//!
//! [`ToolDispatcher`] turns interlock outcomes and errors into
//! [`ToolResult`]s. Each call runs on its own task inside a request span, so
//! a panicking tool surfaces as a generic system error instead of taking the
//! gateway down.

use std::sync::Arc;

use nexus_approval::{ApprovalError, ApprovalInterlock, ApprovalResult, Outcome, PendingEntry};
use nexus_telemetry::RequestContext;
use serde_json::{Map, Value};
use tracing::{Instrument, debug, error, info, warn};

use crate::rpc::{PendingInfo, ToolInfo, ToolResult};

/// Reply for an absent, expired, malformed or consumed token.
pub const INVALID_TOKEN_MESSAGE: &str = "Error: Invalid, expired, or already used token.";

/// Reply when nothing awaits approval.
pub const NO_PENDING_MESSAGE: &str = "No actions pending approval.";

/// Reply for failures whose details stay in the logs.
pub const SYSTEM_ERROR_MESSAGE: &str = "System Error: the request could not be completed.";

/// Routes tool calls into the approval interlock.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    interlock: Arc<ApprovalInterlock>,
    source: &'static str,
}

impl ToolDispatcher {
    /// Dispatcher over `interlock`, tagging request spans with `rpc`.
    #[must_use]
    pub fn new(interlock: Arc<ApprovalInterlock>) -> Self {
        Self {
            interlock,
            source: "rpc",
        }
    }

    /// Tag request spans with a different source.
    #[must_use]
    pub fn with_source(mut self, source: &'static str) -> Self {
        self.source = source;
        self
    }

    /// The interlock behind this dispatcher.
    #[must_use]
    pub fn interlock(&self) -> &Arc<ApprovalInterlock> {
        &self.interlock
    }

    /// Every tool in listing order.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.interlock
            .registry()
            .descriptors()
            .into_iter()
            .map(ToolInfo::from)
            .collect()
    }

    /// Call `name` with `arguments`. Never fails; errors are in-band.
    pub async fn call(&self, name: &str, arguments: Value) -> ToolResult {
        let ctx = RequestContext::new(self.source).with_operation(name);
        let span = ctx.span();

        let interlock = Arc::clone(&self.interlock);
        let tool = name.to_string();
        let task = tokio::spawn(
            async move { interlock.submit(&tool, &arguments).await }.instrument(span.clone()),
        );

        let result = match task.await {
            Ok(Ok(outcome)) => render_outcome(outcome),
            Ok(Err(e)) => {
                let _guard = span.enter();
                render_error(&e)
            },
            Err(e) => {
                error!(parent: &span, tool = %name, error = %e, "tool task did not complete");
                ToolResult::error("internal_error", SYSTEM_ERROR_MESSAGE)
            },
        };

        info!(
            parent: &span,
            kind = %result.kind,
            is_error = result.is_error,
            elapsed_ms = ctx.elapsed_ms(),
            "tool call finished"
        );
        result
    }

    /// Pending actions, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::UpstreamUnavailable`] if the store fails.
    pub async fn list_pending(&self) -> ApprovalResult<Vec<PendingInfo>> {
        Ok(self
            .interlock
            .list_pending()
            .await?
            .into_iter()
            .map(PendingInfo::from)
            .collect())
    }
}

/// Render a successful interlock outcome.
#[must_use]
pub fn render_outcome(outcome: Outcome) -> ToolResult {
    match outcome {
        Outcome::Executed(output) => ToolResult::ok("executed", output.render()),
        Outcome::PendingApproval { token, action } => {
            let arguments = Value::Object(action.arguments).to_string();
            let mut result = ToolResult::ok(
                "pending_approval",
                interlock_notice(action.name.as_str(), &arguments, token.as_str()),
            );
            result.token = Some(token.to_string());
            result
        },
        Outcome::InvalidToken => ToolResult::error("invalid_token", INVALID_TOKEN_MESSAGE),
        Outcome::Pending(entries) => render_pending(&entries),
    }
}

/// Render an interlock error.
///
/// Internal failures are logged with their detail and shown as
/// [`SYSTEM_ERROR_MESSAGE`].
#[must_use]
pub fn render_error(err: &ApprovalError) -> ToolResult {
    let content = match err {
        ApprovalError::Validation { argument, message } => {
            debug!(argument = %argument, "rejected tool arguments");
            format!("Error: {message}")
        },
        ApprovalError::UnknownOperation { name } => format!("Error: Unknown tool: {name}"),
        ApprovalError::UpstreamUnavailable { component, message } => {
            warn!(component = %component, error = %message, "dependency unavailable");
            format!("System Error: {component} is unavailable. Try again shortly.")
        },
        ApprovalError::Execution { action, source } => {
            warn!(action = %action, error = %source, "action failed");
            format!("System Error: {source}")
        },
        ApprovalError::Internal(detail) => {
            error!(error = %detail, "internal interlock error");
            SYSTEM_ERROR_MESSAGE.to_string()
        },
    };
    ToolResult::error(err.kind(), content)
}

fn interlock_notice(name: &str, arguments: &str, token: &str) -> String {
    format!(
        "⚠️ SAFETY INTERLOCK TRIGGERED\n\
         Action: {name}\n\
         Arguments: {arguments}\n\
         Status: PENDING APPROVAL\n\n\
         To execute this command, call 'approve_action' with:\n\
         token: {token}"
    )
}

fn render_pending(entries: &[PendingEntry]) -> ToolResult {
    if entries.is_empty() {
        return ToolResult::ok("pending", NO_PENDING_MESSAGE);
    }

    let mut by_token = Map::new();
    for entry in entries {
        match serde_json::to_value(&entry.action) {
            Ok(value) => {
                by_token.insert(entry.token.to_string(), value);
            },
            Err(e) => {
                error!(token = %entry.token, error = %e, "cannot encode pending action");
                return ToolResult::error("internal_error", SYSTEM_ERROR_MESSAGE);
            },
        }
    }
    match serde_json::to_string_pretty(&Value::Object(by_token)) {
        Ok(content) => ToolResult::ok("pending", content),
        Err(e) => {
            error!(error = %e, "cannot render pending actions");
            ToolResult::error("internal_error", SYSTEM_ERROR_MESSAGE)
        },
    }
}
