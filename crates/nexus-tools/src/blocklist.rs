//! IP blocklist shared with the rate limiter.
//!
//! A ban is the key `blacklist:{ip}` holding `banned`, expiring after the ban
//! duration. The rate limiter only checks for the key's existence.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use nexus_storage::{KvStore, ScopedKvStore};
use tracing::info;

use crate::error::{ToolError, ToolResult};

/// Namespace the rate limiter reads.
pub const BLOCKLIST_NAMESPACE: &str = "blacklist";

const BANNED_MARKER: &[u8] = b"banned";
const COMPONENT: &str = "blocklist";
const SECS_PER_HOUR: u64 = 3600;

/// Time-limited IP bans.
#[derive(Debug, Clone)]
pub struct Blocklist {
    store: ScopedKvStore,
}

impl Blocklist {
    /// Blocklist in the default namespace.
    ///
    /// # Errors
    ///
    /// Never fails for the default namespace; the signature mirrors
    /// [`Blocklist::with_namespace`].
    pub fn new(store: Arc<dyn KvStore>) -> ToolResult<Self> {
        Self::with_namespace(store, BLOCKLIST_NAMESPACE)
    }

    /// Blocklist in a custom namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace is invalid.
    pub fn with_namespace(store: Arc<dyn KvStore>, namespace: &str) -> ToolResult<Self> {
        Ok(Self {
            store: ScopedKvStore::new(store, namespace).map_err(ToolError::storage(COMPONENT))?,
        })
    }

    /// Ban `ip` for `hours` hours and return the operator-facing summary.
    ///
    /// Re-banning an address replaces the previous expiry.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Storage`] if the ban could not be written.
    pub async fn ban(&self, ip: IpAddr, hours: u32) -> ToolResult<String> {
        let secs = u64::from(hours).saturating_mul(SECS_PER_HOUR);
        self.store
            .set_with_ttl(
                &ip.to_string(),
                BANNED_MARKER.to_vec(),
                Duration::from_secs(secs),
            )
            .await
            .map_err(ToolError::storage(COMPONENT))?;

        info!(ip = %ip, duration_secs = secs, "banned ip");
        Ok(format!("IP {ip} has been banned for {secs} seconds."))
    }

    /// Reclaim lapsed bans.
    ///
    /// Backends with native expiry report `0`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Storage`] on store failure.
    pub async fn purge_expired(&self) -> ToolResult<u64> {
        self.store
            .purge_expired()
            .await
            .map_err(ToolError::storage(COMPONENT))
    }
}
