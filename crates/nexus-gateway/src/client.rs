//! Gateway client: connects the CLI to a running gateway over `WebSocket`.

use std::time::Duration;

use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use nexus_tools::{NewSecurityEvent, SecurityEvent};
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};
use crate::rpc::{GatewayStatus, NexusRpcClient, PendingInfo, ToolInfo, ToolResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected gateway client.
#[derive(Debug)]
pub struct GatewayClient {
    client: WsClient,
}

impl GatewayClient {
    /// Connect to the gateway at `url` (e.g. `ws://127.0.0.1:8082`).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Runtime`] if the gateway cannot be reached.
    pub async fn connect(url: &str) -> GatewayResult<Self> {
        let client = WsClientBuilder::default()
            .connection_timeout(CONNECT_TIMEOUT)
            .build(url)
            .await
            .map_err(|e| {
                GatewayError::Runtime(format!("Failed to connect to gateway at {url}: {e}"))
            })?;
        Ok(Self { client })
    }

    /// List tools.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC call fails.
    pub async fn list_tools(&self) -> GatewayResult<Vec<ToolInfo>> {
        Ok(self.client.list_tools().await?)
    }

    /// Call a tool.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC call fails. Tool failures are reported
    /// in the returned [`ToolResult`].
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> GatewayResult<ToolResult> {
        Ok(self.client.call_tool(name.to_string(), arguments).await?)
    }

    /// List pending actions.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC call fails.
    pub async fn list_pending(&self) -> GatewayResult<Vec<PendingInfo>> {
        Ok(self.client.list_pending().await?)
    }

    /// Get gateway status.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC call fails.
    pub async fn status(&self) -> GatewayResult<GatewayStatus> {
        Ok(self.client.status().await?)
    }

    /// Record a security event.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC call fails or the event is rejected.
    pub async fn record_event(&self, event: NewSecurityEvent) -> GatewayResult<SecurityEvent> {
        Ok(self.client.record_event(event).await?)
    }
}
