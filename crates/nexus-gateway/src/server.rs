//! Gateway `WebSocket` server.
//!
//! Implements the `jsonrpsee` server that serves the [`NexusRpc`] API.
//!
//! # Shared state
//!
//! [`Gateway`] is immutable after construction and shared behind an `Arc`.
//! All mutable state lives in the store; the only serialization point between
//! concurrent approvals is the store's atomic delete.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use nexus_approval::{ApprovalError, ApprovalInterlock};
use nexus_config::Config;
use nexus_tools::{
    AttackAnalyzer, Blocklist, EventSource, HealthMonitor, NewSecurityEvent, SecurityEvent,
    ToolError, ToolExecutor,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config_bridge;
use crate::dispatch::ToolDispatcher;
use crate::error::{GatewayError, GatewayResult};
use crate::rpc::{
    GatewayStatus, NexusRpcServer, PendingInfo, ToolInfo, ToolResult, error_codes,
};

/// How often the background sweep removes expired pending actions and
/// lapsed bans.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(300);

/// An assembled gateway: dispatcher, event source and status labels.
pub struct Gateway {
    dispatcher: ToolDispatcher,
    events: Arc<dyn EventSource>,
    blocklist: Option<Blocklist>,
    storage_backend: String,
    model_provider: String,
    model: String,
    started_at: Instant,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("dispatcher", &self.dispatcher)
            .field("blocklist", &self.blocklist)
            .field("storage_backend", &self.storage_backend)
            .field("model_provider", &self.model_provider)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Assemble a gateway from its parts.
    #[must_use]
    pub fn new(interlock: Arc<ApprovalInterlock>, events: Arc<dyn EventSource>) -> Self {
        Self {
            dispatcher: ToolDispatcher::new(interlock),
            events,
            blocklist: None,
            storage_backend: "memory".to_string(),
            model_provider: "none".to_string(),
            model: "none".to_string(),
            started_at: Instant::now(),
        }
    }

    /// Include the blocklist namespace in the expiry sweep.
    #[must_use]
    pub fn with_blocklist(mut self, blocklist: Blocklist) -> Self {
        self.blocklist = Some(blocklist);
        self
    }

    /// Label the store backend in [`GatewayStatus`].
    #[must_use]
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.storage_backend = backend.into();
        self
    }

    /// Label the model in [`GatewayStatus`].
    #[must_use]
    pub fn with_model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.model_provider = provider.into();
        self.model = model.into();
        self
    }

    /// Build every component from a validated config.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened, the provider or
    /// health client cannot be built, or the approval settings are invalid.
    pub fn from_config(cfg: &Config) -> GatewayResult<Self> {
        let config_bridge::Backend { store, events } = config_bridge::open_backend(cfg)?;
        let provider = config_bridge::build_provider(cfg)?;
        let registry = config_bridge::to_registry(cfg)?;

        let blocklist = Blocklist::new(Arc::clone(&store))?;
        let health = HealthMonitor::new(
            &cfg.services.aegis_url,
            &cfg.services.cryptex_url,
            cfg.services.health_timeout(),
        )?;
        let executor = ToolExecutor::new(
            health,
            Arc::clone(&events),
            blocklist.clone(),
            AttackAnalyzer::new(provider).with_timeout(cfg.model.timeout()),
        )
        .with_store_timeout(cfg.storage.timeout());

        let interlock = ApprovalInterlock::new(store, Arc::new(executor))
            .with_registry(registry)
            .with_ttl(cfg.approval.ttl())
            .with_token_bytes(cfg.approval.token_bytes)?
            .with_namespace(cfg.approval.namespace.clone())?
            .with_store_timeout(cfg.storage.timeout());

        info!(
            backend = %cfg.storage.backend,
            provider = %cfg.model.provider,
            model = %cfg.model.model,
            ttl_secs = cfg.approval.ttl_secs,
            "gateway assembled"
        );

        Ok(Self::new(Arc::new(interlock), events)
            .with_blocklist(blocklist)
            .with_backend(&cfg.storage.backend)
            .with_model(&cfg.model.provider, &cfg.model.model))
    }

    /// The tool-call boundary.
    #[must_use]
    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Current status.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Approval`] if pending actions cannot be listed.
    pub async fn status(&self) -> GatewayResult<GatewayStatus> {
        let interlock = self.dispatcher.interlock();
        let pending = interlock.list_pending().await?;
        Ok(GatewayStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            storage_backend: self.storage_backend.clone(),
            model_provider: self.model_provider.clone(),
            model: self.model.clone(),
            dangerous_tools: interlock
                .registry()
                .dangerous_tools()
                .into_iter()
                .map(|t| t.to_string())
                .collect(),
            approval_ttl_secs: interlock.ttl().as_secs(),
            pending_actions: pending.len(),
        })
    }

    /// Append an event reported by the rate limiter.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Tool`] if the event is rejected or the store
    /// fails.
    pub async fn record_event(&self, event: NewSecurityEvent) -> GatewayResult<SecurityEvent> {
        Ok(self.events.record(event).await?)
    }

    /// Bind `addr` and serve the RPC API.
    ///
    /// Port `0` picks a free port; the bound address is returned.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Runtime`] if the server cannot bind.
    pub async fn start(self: Arc<Self>, addr: &str) -> GatewayResult<(ServerHandle, SocketAddr)> {
        let server = Server::builder()
            .build(addr)
            .await
            .map_err(|e| GatewayError::Runtime(format!("Failed to bind {addr}: {e}")))?;
        let local = server
            .local_addr()
            .map_err(|e| GatewayError::Runtime(format!("Failed to get address: {e}")))?;

        let handle = server.start(RpcImpl { gateway: self }.into_rpc());
        info!(addr = %local, "gateway listening");
        Ok((handle, local))
    }

    /// Reclaim expired pending actions and lapsed bans.
    ///
    /// Both namespaces are swept even if the first fails. Returns the number
    /// of entries removed.
    ///
    /// # Errors
    ///
    /// Returns the first store failure.
    pub async fn purge_expired(&self) -> GatewayResult<u64> {
        let approvals = self
            .dispatcher
            .interlock()
            .purge_expired()
            .await
            .map_err(GatewayError::from);
        let bans = match &self.blocklist {
            Some(blocklist) => blocklist.purge_expired().await.map_err(GatewayError::from),
            None => Ok(0),
        };
        let (approvals, bans) = (approvals?, bans?);
        debug!(approvals, bans, "expiry sweep complete");
        Ok(approvals.saturating_add(bans))
    }

    /// Spawn the background sweep that calls [`Gateway::purge_expired`].
    #[must_use]
    pub fn spawn_purge_task(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = gateway.purge_expired().await {
                    warn!(error = %e, "expiry sweep failed");
                }
            }
        })
    }
}

/// The jsonrpsee RPC method handler.
struct RpcImpl {
    gateway: Arc<Gateway>,
}

#[jsonrpsee::core::async_trait]
impl NexusRpcServer for RpcImpl {
    async fn list_tools(&self) -> Result<Vec<ToolInfo>, ErrorObjectOwned> {
        Ok(self.gateway.dispatcher.list_tools())
    }

    async fn call_tool(
        &self,
        name: String,
        arguments: Option<Value>,
    ) -> Result<ToolResult, ErrorObjectOwned> {
        Ok(self
            .gateway
            .dispatcher
            .call(&name, arguments.unwrap_or(Value::Null))
            .await)
    }

    async fn list_pending(&self) -> Result<Vec<PendingInfo>, ErrorObjectOwned> {
        self.gateway
            .dispatcher
            .list_pending()
            .await
            .map_err(|e| rpc_error(&GatewayError::Approval(e)))
    }

    async fn status(&self) -> Result<GatewayStatus, ErrorObjectOwned> {
        self.gateway.status().await.map_err(|e| rpc_error(&e))
    }

    async fn record_event(
        &self,
        event: NewSecurityEvent,
    ) -> Result<SecurityEvent, ErrorObjectOwned> {
        self.gateway
            .record_event(event)
            .await
            .map_err(|e| rpc_error(&e))
    }
}

fn rpc_error(err: &GatewayError) -> ErrorObjectOwned {
    let code = match err {
        GatewayError::Tool(ToolError::InvalidEvent(_)) => error_codes::INVALID_EVENT,
        GatewayError::Tool(ToolError::Storage { .. } | ToolError::Timeout { .. })
        | GatewayError::Approval(ApprovalError::UpstreamUnavailable { .. }) => {
            error_codes::UPSTREAM_UNAVAILABLE
        },
        _ => {
            warn!(error = %err, "rpc call failed");
            error_codes::INTERNAL_ERROR
        },
    };
    ErrorObjectOwned::owned(code, err.to_string(), None::<()>)
}
