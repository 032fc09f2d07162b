//! JSON-RPC API definition for the gateway.
//!
//! Uses jsonrpsee proc macros to define the RPC interface. The gateway
//! implements the server side; the `nexus` CLI and tool-calling clients use
//! the generated client.

use chrono::{DateTime, Utc};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::ErrorObjectOwned;
use nexus_approval::{Classification, PendingEntry, ToolDescriptor};
use nexus_tools::{NewSecurityEvent, SecurityEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------- Wire types ----------

/// A tool as listed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Whether calls are deferred behind an approval token.
    pub dangerous: bool,
    /// JSON schema of the arguments.
    pub input_schema: Value,
}

impl From<ToolDescriptor> for ToolInfo {
    fn from(d: ToolDescriptor) -> Self {
        Self {
            name: d.name.to_string(),
            description: d.description,
            dangerous: d.classification == Classification::Dangerous,
            input_schema: d.input_schema,
        }
    }
}

/// Result of one tool call.
///
/// Failures are reported in-band with `is_error` set, so a client always
/// gets text it can show to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the call failed.
    pub is_error: bool,
    /// Machine-readable outcome: `executed`, `pending_approval`, `pending`,
    /// `invalid_token`, or an error kind such as `validation_error`.
    pub kind: String,
    /// Text for the operator.
    pub content: String,
    /// Approval token, when the call was deferred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ToolResult {
    /// A successful result.
    #[must_use]
    pub fn ok(kind: &str, content: impl Into<String>) -> Self {
        Self {
            is_error: false,
            kind: kind.to_string(),
            content: content.into(),
            token: None,
        }
    }

    /// A failed result.
    #[must_use]
    pub fn error(kind: &str, content: impl Into<String>) -> Self {
        Self {
            is_error: true,
            kind: kind.to_string(),
            content: content.into(),
            token: None,
        }
    }
}

/// A pending action (wire type for display).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInfo {
    /// Token that unlocks the action.
    pub token: String,
    /// Deferred tool.
    pub tool: String,
    /// Validated arguments.
    pub arguments: Value,
    /// Audit identifier.
    pub request_id: Uuid,
    /// When the action was deferred.
    pub created_at: DateTime<Utc>,
    /// When the token stops working.
    pub expires_at: DateTime<Utc>,
}

impl From<PendingEntry> for PendingInfo {
    fn from(entry: PendingEntry) -> Self {
        Self {
            token: entry.token.to_string(),
            tool: entry.action.name.to_string(),
            arguments: Value::Object(entry.action.arguments),
            request_id: entry.action.request_id,
            created_at: entry.action.created_at,
            expires_at: entry.action.expires_at,
        }
    }
}

/// Status information about the running gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayStatus {
    /// Gateway version.
    pub version: String,
    /// How long the gateway has been running (seconds).
    pub uptime_secs: u64,
    /// Store backend (`surrealkv`, `redis` or `memory`).
    pub storage_backend: String,
    /// Model provider.
    pub model_provider: String,
    /// Model name.
    pub model: String,
    /// Tools that require approval.
    pub dangerous_tools: Vec<String>,
    /// Lifetime of an approval token (seconds).
    pub approval_ttl_secs: u64,
    /// Actions currently awaiting approval.
    pub pending_actions: usize,
}

// ---------- RPC API ----------

/// The Nexus gateway RPC API.
#[rpc(server, client, namespace = "nexus")]
pub trait NexusRpc {
    /// List every tool with its classification and argument schema.
    #[method(name = "listTools")]
    async fn list_tools(&self) -> Result<Vec<ToolInfo>, ErrorObjectOwned>;

    /// Call a tool. Dangerous tools return a token instead of running.
    #[method(name = "callTool")]
    async fn call_tool(
        &self,
        name: String,
        arguments: Option<Value>,
    ) -> Result<ToolResult, ErrorObjectOwned>;

    /// List actions awaiting approval, oldest first.
    #[method(name = "listPending")]
    async fn list_pending(&self) -> Result<Vec<PendingInfo>, ErrorObjectOwned>;

    /// Get gateway status.
    #[method(name = "status")]
    async fn status(&self) -> Result<GatewayStatus, ErrorObjectOwned>;

    /// Append a suspicious-traffic event to the event log.
    #[method(name = "recordEvent")]
    async fn record_event(&self, event: NewSecurityEvent)
    -> Result<SecurityEvent, ErrorObjectOwned>;
}

/// Custom JSON-RPC error codes.
pub mod error_codes {
    /// The store or another dependency is unavailable.
    pub const UPSTREAM_UNAVAILABLE: i32 = -32001;
    /// A reported event was rejected.
    pub const INVALID_EVENT: i32 = -32002;
    /// Internal gateway error.
    pub const INTERNAL_ERROR: i32 = -32003;
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_approval::ActionRegistry;
    use serde_json::json;

    #[test]
    fn tool_info_from_descriptor() {
        let tools: Vec<ToolInfo> = ActionRegistry::new()
            .descriptors()
            .into_iter()
            .map(ToolInfo::from)
            .collect();

        let ban = tools.iter().find(|t| t.name == "ban_suspicious_ip").unwrap();
        assert!(ban.dangerous);
        assert_eq!(ban.input_schema["required"], json!(["ip"]));
        assert!(tools.iter().filter(|t| t.dangerous).count() == 1);
    }

    #[test]
    fn tool_result_token_omitted_when_absent() {
        let json = serde_json::to_value(ToolResult::ok("executed", "done")).unwrap();
        assert!(json.get("token").is_none());
        assert_eq!(json["is_error"], false);
    }

    #[test]
    fn tool_result_deserializes_without_token() {
        let r: ToolResult = serde_json::from_str(
            r#"{"is_error":true,"kind":"invalid_token","content":"Error"}"#,
        )
        .unwrap();
        assert!(r.is_error);
        assert!(r.token.is_none());
    }
}
