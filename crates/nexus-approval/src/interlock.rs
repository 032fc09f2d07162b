//! The approval interlock.
//!
//! [`ApprovalInterlock`] sits between callers and the [`ActionExecutor`].
//! Safe actions pass straight through. Dangerous actions are serialized into
//! the store under a fresh single-use token and only run when that token is
//! presented to [`approve`](ApprovalInterlock::approve).
//!
//! # Consumption
//!
//! ```text
//! approve(t):
//!   get(ns, t)    -> None           => InvalidToken
//!   delete(ns, t) -> false          => InvalidToken   (lost the race)
//!   delete(ns, t) -> true           => decode, execute once
//! ```
//!
//! The store's delete is the only serialization point. A consumed token is
//! never restored, even if execution fails afterwards.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use nexus_storage::{KvStore, StorageResult};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::action::{Action, ToolName};
use crate::error::{ApprovalError, ApprovalResult};
use crate::executor::ActionExecutor;
use crate::pending::{Outcome, PendingAction, PendingEntry};
use crate::registry::ActionRegistry;
use crate::token::{ApprovalToken, TokenGenerator};

/// Default namespace for pending actions.
pub const DEFAULT_NAMESPACE: &str = "nexus:approval";
/// Default lifetime of a pending action.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
/// Default bound on a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Human-approval gate in front of dangerous actions.
pub struct ApprovalInterlock {
    store: Arc<dyn KvStore>,
    executor: Arc<dyn ActionExecutor>,
    registry: Arc<ActionRegistry>,
    tokens: TokenGenerator,
    namespace: String,
    ttl: Duration,
    store_timeout: Duration,
}

impl std::fmt::Debug for ApprovalInterlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalInterlock")
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .field("token_bytes", &self.tokens.width_bytes())
            .field("dangerous", &self.registry.dangerous_tools())
            .finish_non_exhaustive()
    }
}

impl ApprovalInterlock {
    /// Create an interlock with default registry, TTL, token width and
    /// namespace.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            store,
            executor,
            registry: Arc::new(ActionRegistry::new()),
            tokens: TokenGenerator::default(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            ttl: DEFAULT_TTL,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Use a custom registry.
    #[must_use]
    pub fn with_registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Set the pending-action lifetime.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the width of newly generated tokens.
    ///
    /// Tokens already pending at another width stay listable and approvable.
    ///
    /// # Errors
    ///
    /// Returns an error if the width is out of range.
    pub fn with_token_bytes(mut self, width_bytes: usize) -> ApprovalResult<Self> {
        self.tokens = TokenGenerator::new(width_bytes)?;
        Ok(self)
    }

    /// Bound every store call by `timeout`.
    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Store pending actions under `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::Validation`] for an empty namespace or one
    /// containing a null byte.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> ApprovalResult<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() || namespace.contains('\0') {
            return Err(ApprovalError::validation(
                "namespace",
                "namespace must be non-empty and free of null bytes",
            ));
        }
        self.namespace = namespace;
        Ok(self)
    }

    /// The registry in use.
    #[must_use]
    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Pending-action lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Namespace holding pending actions.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Submit a tool call.
    ///
    /// # Errors
    ///
    /// - [`ApprovalError::UnknownOperation`] if `name` is not registered
    /// - [`ApprovalError::Validation`] if an argument is malformed
    /// - [`ApprovalError::UpstreamUnavailable`] if the store fails
    /// - [`ApprovalError::Execution`] if a safe action fails
    pub async fn submit(&self, name: &str, arguments: &Value) -> ApprovalResult<Outcome> {
        let tool = self.registry.resolve(name)?;
        let arguments = ActionRegistry::normalize_arguments(arguments)?;
        self.registry.validate(tool, &arguments)?;
        debug!(tool = %tool, arguments = %serde_json::Value::Object(arguments.clone()), "tool submitted");

        match tool {
            ToolName::ApproveAction => {
                let token = arguments
                    .get("token")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                self.approve(token).await
            },
            ToolName::ListPendingActions => Ok(Outcome::Pending(self.list_pending().await?)),
            tool if self.registry.is_dangerous(tool) => self.defer(tool, arguments).await,
            tool => {
                let action = self.registry.parse_action(tool, &arguments)?;
                self.execute(&action).await.map(Outcome::Executed)
            },
        }
    }

    /// Consume `token` and run the action it guards, at most once.
    ///
    /// # Errors
    ///
    /// - [`ApprovalError::UpstreamUnavailable`] if the store fails
    /// - [`ApprovalError::Execution`] if the action fails (the token is
    ///   still consumed)
    /// - [`ApprovalError::Internal`] if the stored record cannot be decoded
    pub async fn approve(&self, token: &str) -> ApprovalResult<Outcome> {
        let Some(token) = ApprovalToken::parse(token) else {
            info!("approval rejected: malformed token");
            return Ok(Outcome::InvalidToken);
        };

        let Some(raw) = self
            .store_call("get", self.store.get(&self.namespace, token.as_str()))
            .await?
        else {
            info!(token = %token, "approval rejected: unknown or expired token");
            return Ok(Outcome::InvalidToken);
        };

        let removed = self
            .store_call("delete", self.store.delete(&self.namespace, token.as_str()))
            .await?;
        if !removed {
            info!(token = %token, "approval rejected: token consumed concurrently");
            return Ok(Outcome::InvalidToken);
        }

        let record: PendingAction = serde_json::from_slice(&raw).map_err(|e| {
            warn!(token = %token, error = %e, "consumed pending action is corrupt");
            ApprovalError::Internal(format!("pending action under {token} is corrupt: {e}"))
        })?;
        let action = self.registry.parse_action(record.name, &record.arguments)?;

        info!(
            token = %token,
            tool = %record.name,
            request_id = %record.request_id,
            "pending action approved"
        );
        self.execute(&action).await.map(Outcome::Executed)
    }

    /// Every live pending action, oldest first.
    ///
    /// Entries that fail to decode are skipped and logged.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::UpstreamUnavailable`] if the store fails.
    pub async fn list_pending(&self) -> ApprovalResult<Vec<PendingEntry>> {
        let entries = self
            .store_call("list", self.store.list_entries(&self.namespace))
            .await?;

        let mut pending: Vec<PendingEntry> = entries
            .into_iter()
            .filter_map(|entry| {
                let Some(token) = ApprovalToken::parse(&entry.key) else {
                    warn!(key = %entry.key, "skipping pending entry with malformed token");
                    return None;
                };
                match serde_json::from_slice::<PendingAction>(&entry.value) {
                    Ok(action) => Some(PendingEntry { token, action }),
                    Err(e) => {
                        warn!(token = %token, error = %e, "skipping undecodable pending entry");
                        None
                    },
                }
            })
            .collect();
        pending.sort_by(|a, b| {
            a.action
                .created_at
                .cmp(&b.action.created_at)
                .then_with(|| a.token.cmp(&b.token))
        });
        Ok(pending)
    }

    /// Physically remove expired records.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::UpstreamUnavailable`] if the store fails.
    pub async fn purge_expired(&self) -> ApprovalResult<u64> {
        let purged = self
            .store_call("purge", self.store.purge_expired(&self.namespace))
            .await?;
        if purged > 0 {
            info!(purged, namespace = %self.namespace, "purged expired pending actions");
        }
        Ok(purged)
    }

    async fn defer(
        &self,
        tool: ToolName,
        arguments: Map<String, Value>,
    ) -> ApprovalResult<Outcome> {
        let token = self.tokens.generate();
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| ApprovalError::Internal(format!("ttl out of range: {e}")))?;
        let record = PendingAction::new(tool, arguments, ttl);
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| ApprovalError::Internal(format!("failed to encode pending action: {e}")))?;

        self.store_call(
            "set",
            self.store
                .set_with_ttl(&self.namespace, token.as_str(), bytes, self.ttl),
        )
        .await?;

        info!(
            tool = %tool,
            token = %token,
            request_id = %record.request_id,
            ttl_secs = self.ttl.as_secs(),
            "dangerous action deferred pending approval"
        );
        Ok(Outcome::PendingApproval {
            token,
            action: record,
        })
    }

    async fn execute(&self, action: &Action) -> ApprovalResult<crate::ToolOutput> {
        self.executor.execute(action).await.map_err(|source| {
            warn!(action = %action, error = %source, "action execution failed");
            ApprovalError::Execution {
                action: action.tool().to_string(),
                source,
            }
        })
    }

    async fn store_call<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = StorageResult<T>>,
    ) -> ApprovalResult<T> {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(op, error = %e, "approval store call failed");
                Err(ApprovalError::UpstreamUnavailable {
                    component: "store".into(),
                    message: e.to_string(),
                })
            },
            Err(_) => {
                let timeout_ms = u64::try_from(self.store_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(op, timeout_ms, "approval store call timed out");
                Err(ApprovalError::UpstreamUnavailable {
                    component: "store".into(),
                    message: format!("{op} timed out after {timeout_ms}ms"),
                })
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutorError, ToolOutput};
    use async_trait::async_trait;
    use nexus_storage::MemoryKvStore;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingExecutor {
        calls: Mutex<Vec<Action>>,
        fail: bool,
    }

    impl CountingExecutor {
        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn calls(&self) -> Vec<Action> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ActionExecutor for CountingExecutor {
        async fn execute(&self, action: &Action) -> Result<ToolOutput, ExecutorError> {
            self.calls.lock().unwrap().push(action.clone());
            if self.fail {
                return Err(ExecutorError::Failed {
                    component: "blocklist".into(),
                    message: "boom".into(),
                });
            }
            Ok(ToolOutput::Text(format!("ran {action}")))
        }
    }

    fn setup() -> (Arc<MemoryKvStore>, Arc<CountingExecutor>, ApprovalInterlock) {
        let store = Arc::new(MemoryKvStore::new());
        let executor = Arc::new(CountingExecutor::default());
        let interlock = ApprovalInterlock::new(store.clone(), executor.clone());
        (store, executor, interlock)
    }

    #[tokio::test]
    async fn test_safe_action_executes_immediately() {
        let (store, executor, interlock) = setup();
        let outcome = interlock
            .submit("check_system_health", &Value::Null)
            .await
            .unwrap();
        assert!(outcome.is_executed());
        assert_eq!(executor.calls(), vec![Action::CheckSystemHealth]);
        assert!(store.list_keys(DEFAULT_NAMESPACE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dangerous_action_is_deferred() {
        let (store, executor, interlock) = setup();
        let outcome = interlock
            .submit("ban_suspicious_ip", &json!({"ip": "1.2.3.4", "hours": 2}))
            .await
            .unwrap();
        let token = outcome.token().unwrap().clone();
        assert!(executor.calls().is_empty());
        assert!(store.exists(DEFAULT_NAMESPACE, token.as_str()).await.unwrap());

        let outcome = interlock.approve(token.as_str()).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Executed(ToolOutput::Text("ran ban 1.2.3.4 for 2h".into()))
        );
        assert_eq!(executor.calls().len(), 1);

        // Second approval fails.
        assert_eq!(
            interlock.approve(token.as_str()).await.unwrap(),
            Outcome::InvalidToken
        );
        assert_eq!(executor.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_approve_via_meta_tool() {
        let (_store, executor, interlock) = setup();
        let token = interlock
            .submit("ban_suspicious_ip", &json!({"ip": "::1"}))
            .await
            .unwrap()
            .token()
            .unwrap()
            .clone();
        let outcome = interlock
            .submit("approve_action", &json!({"token": token.as_str().to_uppercase()}))
            .await
            .unwrap();
        assert!(outcome.is_executed());
        assert_eq!(
            executor.calls(),
            vec![Action::BanSuspiciousIp {
                ip: "::1".parse().unwrap(),
                hours: 1
            }]
        );
    }

    #[tokio::test]
    async fn test_invalid_argument_creates_nothing() {
        let (store, executor, interlock) = setup();
        let err = interlock
            .submit("ban_suspicious_ip", &json!({"ip": "not-an-ip"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ApprovalError::Validation { ref argument, .. } if argument == "ip"));
        assert!(store.list_keys(DEFAULT_NAMESPACE).await.unwrap().is_empty());
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let (store, executor, interlock) = setup();
        let err = interlock.submit("format_disk", &json!({})).await.unwrap_err();
        assert!(matches!(err, ApprovalError::UnknownOperation { .. }));
        assert!(store.list_keys(DEFAULT_NAMESPACE).await.unwrap().is_empty());
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_tokens() {
        let (_store, _executor, interlock) = setup();
        assert_eq!(interlock.approve("nope").await.unwrap(), Outcome::InvalidToken);
        assert_eq!(
            interlock.approve("0123456789abcdef").await.unwrap(),
            Outcome::InvalidToken
        );
    }

    #[tokio::test]
    async fn test_expired_token_is_invalid() {
        let (_store, executor, interlock) = setup();
        let interlock = interlock.with_ttl(Duration::from_millis(50));
        let token = interlock
            .submit("ban_suspicious_ip", &json!({"ip": "1.2.3.4"}))
            .await
            .unwrap()
            .token()
            .unwrap()
            .clone();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(
            interlock.approve(token.as_str()).await.unwrap(),
            Outcome::InvalidToken
        );
        assert!(executor.calls().is_empty());
        assert_eq!(interlock.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_execution_failure_consumes_token() {
        let store = Arc::new(MemoryKvStore::new());
        let executor = Arc::new(CountingExecutor::failing());
        let interlock = ApprovalInterlock::new(store, executor.clone());
        let token = interlock
            .submit("ban_suspicious_ip", &json!({"ip": "1.2.3.4"}))
            .await
            .unwrap()
            .token()
            .unwrap()
            .clone();

        let err = interlock.approve(token.as_str()).await.unwrap_err();
        assert!(matches!(err, ApprovalError::Execution { .. }));
        assert_eq!(
            interlock.approve(token.as_str()).await.unwrap(),
            Outcome::InvalidToken
        );
        assert_eq!(executor.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_list_pending_sorted_and_skips_corrupt() {
        let (store, _executor, interlock) = setup();
        for ip in ["10.0.0.1", "10.0.0.2"] {
            interlock
                .submit("ban_suspicious_ip", &json!({"ip": ip}))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        store
            .set(DEFAULT_NAMESPACE, "00000000deadbeef", b"{not json".to_vec())
            .await
            .unwrap();

        let pending = interlock.list_pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].action.arguments["ip"], "10.0.0.1");
        assert_eq!(pending[1].action.arguments["ip"], "10.0.0.2");

        let via_tool = interlock
            .submit("list_pending_actions", &Value::Null)
            .await
            .unwrap();
        assert_eq!(via_tool, Outcome::Pending(pending));
    }

    #[tokio::test]
    async fn test_custom_token_width_and_namespace() {
        let (store, _executor, interlock) = setup();
        let interlock = interlock
            .with_token_bytes(4)
            .unwrap()
            .with_namespace("ops:pending")
            .unwrap();
        let token = interlock
            .submit("ban_suspicious_ip", &json!({"ip": "1.2.3.4"}))
            .await
            .unwrap()
            .token()
            .unwrap()
            .clone();
        assert_eq!(token.as_str().len(), 8);
        assert!(store.exists("ops:pending", token.as_str()).await.unwrap());
        assert!(interlock.with_namespace("").is_err());
    }

    #[tokio::test]
    async fn test_width_change_keeps_pending_tokens_redeemable() {
        let store = Arc::new(MemoryKvStore::new());
        let executor = Arc::new(CountingExecutor::default());
        let before = ApprovalInterlock::new(store.clone(), executor.clone());
        let token = before
            .submit("ban_suspicious_ip", &json!({"ip": "1.2.3.4"}))
            .await
            .unwrap()
            .token()
            .unwrap()
            .clone();
        assert_eq!(token.as_str().len(), 16);

        let after = ApprovalInterlock::new(store, executor.clone())
            .with_token_bytes(4)
            .unwrap();
        let pending = after.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].token, token);

        let outcome = after.approve(token.as_str()).await.unwrap();
        assert!(outcome.is_executed());
        assert_eq!(executor.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_store_timeout_maps_to_upstream_unavailable() {
        struct StallingStore;

        #[async_trait]
        impl KvStore for StallingStore {
            async fn get(&self, _: &str, _: &str) -> StorageResult<Option<Vec<u8>>> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(None)
            }
            async fn set(&self, _: &str, _: &str, _: Vec<u8>) -> StorageResult<()> {
                Ok(())
            }
            async fn set_with_ttl(
                &self,
                _: &str,
                _: &str,
                _: Vec<u8>,
                _: Duration,
            ) -> StorageResult<()> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
            async fn delete(&self, _: &str, _: &str) -> StorageResult<bool> {
                Ok(false)
            }
            async fn exists(&self, _: &str, _: &str) -> StorageResult<bool> {
                Ok(false)
            }
            async fn list_keys(&self, _: &str) -> StorageResult<Vec<String>> {
                Ok(Vec::new())
            }
            async fn list_entries(&self, _: &str) -> StorageResult<Vec<nexus_storage::KvEntry>> {
                Ok(Vec::new())
            }
            async fn clear_namespace(&self, _: &str) -> StorageResult<u64> {
                Ok(0)
            }
            async fn purge_expired(&self, _: &str) -> StorageResult<u64> {
                Ok(0)
            }
        }

        let interlock = ApprovalInterlock::new(
            Arc::new(StallingStore),
            Arc::new(CountingExecutor::default()),
        )
        .with_store_timeout(Duration::from_millis(20));
        let err = interlock
            .submit("ban_suspicious_ip", &json!({"ip": "1.2.3.4"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ApprovalError::UpstreamUnavailable { .. }));
        let err = interlock.approve("0123456789abcdef").await.unwrap_err();
        assert!(matches!(err, ApprovalError::UpstreamUnavailable { .. }));
    }
}
