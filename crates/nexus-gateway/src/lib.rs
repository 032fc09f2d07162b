//! Nexus Gateway - the JSON-RPC surface of the approval interlock.
//!
//! This crate wires configuration, store, model provider and tools into an
//! [`ApprovalInterlock`](nexus_approval::ApprovalInterlock) and serves it:
//! - [`rpc`]: wire types and the `nexus_*` method definitions
//! - [`dispatch`]: the tool-call boundary that renders outcomes and contains
//!   failures
//! - [`server`]: the `jsonrpsee` server and gateway assembly
//! - [`client`]: the client used by the `nexus` CLI
//! - [`config_bridge`]: config to domain type conversion
//!
//! # Architecture
//!
//! ```text
//! nexus-gateway (rpc + cli)
//! ├── ToolDispatcher (one task per call, request span)
//! └── nexus-approval (interlock)
//!     ├── nexus-storage (pending actions)
//!     └── nexus-tools (executor)
//!         ├── HealthMonitor -> Aegis, Cryptex
//!         ├── EventLog / RedisEventStream, Blocklist -> nexus-storage
//!         └── AttackAnalyzer -> nexus-llm
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nexus_gateway::Gateway;
//!
//! let config = nexus_config::Config::load(None)?.config;
//! let gateway = Arc::new(Gateway::from_config(&config)?);
//! let (handle, addr) = gateway.start(&config.gateway.bind_addr).await?;
//! handle.stopped().await;
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod client;
pub mod config_bridge;
pub mod dispatch;
pub mod error;
pub mod rpc;
pub mod server;

pub use client::GatewayClient;
pub use dispatch::{
    INVALID_TOKEN_MESSAGE, NO_PENDING_MESSAGE, SYSTEM_ERROR_MESSAGE, ToolDispatcher,
};
pub use error::{GatewayError, GatewayResult};
pub use rpc::{GatewayStatus, PendingInfo, ToolInfo, ToolResult};
pub use server::{Gateway, PURGE_INTERVAL};
