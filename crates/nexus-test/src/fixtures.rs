//! Test fixtures for common arguments and stores.

use std::sync::Arc;

use nexus_storage::{KvStore, MemoryKvStore};
use serde_json::{Value, json};

/// A fresh in-memory store.
#[must_use]
pub fn memory_store() -> Arc<dyn KvStore> {
    Arc::new(MemoryKvStore::new())
}

/// Arguments for `ban_suspicious_ip`.
#[must_use]
pub fn ban_args(ip: &str, hours: u32) -> Value {
    json!({ "ip": ip, "hours": hours })
}

/// Arguments for the tools that take a `limit`.
#[must_use]
pub fn limit_args(limit: u32) -> Value {
    json!({ "limit": limit })
}

/// Arguments for `approve_action`.
#[must_use]
pub fn token_args(token: &str) -> Value {
    json!({ "token": token })
}

/// An empty argument object.
#[must_use]
pub fn no_args() -> Value {
    json!({})
}
