//! End-to-end properties of the approval interlock.
//!
//! Dangerous actions must never run without a token, a token must run its
//! action at most once, and nothing reaches the executor or the store
//! unless the request was valid.

#![allow(clippy::arithmetic_side_effects)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nexus_approval::{
    Action, ApprovalError, ApprovalInterlock, ExecutorError, Outcome, ToolOutput,
};
use nexus_storage::{KvEntry, KvStore, MemoryKvStore, StorageError, StorageResult};
use nexus_test::{
    RecordingExecutor, ban_args, init_test_tracing, limit_args, no_args, token_args,
};
use serde_json::json;

const NAMESPACE: &str = "nexus:approval";

/// Store wrapper that counts writes and can be switched off.
#[derive(Default)]
struct CountingStore {
    inner: MemoryKvStore,
    writes: AtomicUsize,
    offline: std::sync::atomic::AtomicBool,
}

impl CountingStore {
    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("connection refused".to_string()));
        }
        Ok(())
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl KvStore for CountingStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(namespace, key).await
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.check()?;
        self.wrote();
        self.inner.set(namespace, key, value).await
    }

    async fn set_with_ttl(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> StorageResult<()> {
        self.check()?;
        self.wrote();
        self.inner.set_with_ttl(namespace, key, value, ttl).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        self.check()?;
        self.wrote();
        self.inner.delete(namespace, key).await
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        self.check()?;
        self.inner.exists(namespace, key).await
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        self.check()?;
        self.inner.list_keys(namespace).await
    }

    async fn list_entries(&self, namespace: &str) -> StorageResult<Vec<KvEntry>> {
        self.check()?;
        self.inner.list_entries(namespace).await
    }

    async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64> {
        self.check()?;
        self.wrote();
        self.inner.clear_namespace(namespace).await
    }

    async fn purge_expired(&self, namespace: &str) -> StorageResult<u64> {
        self.check()?;
        self.inner.purge_expired(namespace).await
    }
}

fn interlock(store: Arc<dyn KvStore>, executor: &RecordingExecutor) -> ApprovalInterlock {
    ApprovalInterlock::new(store, executor.handle())
}

async fn defer_ban(interlock: &ApprovalInterlock, ip: &str) -> String {
    match interlock.submit("ban_suspicious_ip", &ban_args(ip, 1)).await {
        Ok(Outcome::PendingApproval { token, .. }) => token.to_string(),
        other => panic!("expected a pending approval, got {other:?}"),
    }
}

#[tokio::test]
async fn test_dangerous_submit_has_no_side_effect() {
    let store = Arc::new(CountingStore::default());
    let executor = RecordingExecutor::new();
    let interlock = interlock(store.clone(), &executor);

    let token = defer_ban(&interlock, "203.0.113.7").await;

    assert_eq!(executor.call_count(), 0);
    // Exactly the pending record was written.
    assert_eq!(store.writes(), 1);
    assert_eq!(store.inner.list_keys(NAMESPACE).await.unwrap(), vec![token]);
}

#[tokio::test]
async fn test_approve_round_trip_executes_stored_arguments() {
    let executor = RecordingExecutor::new();
    let interlock = interlock(Arc::new(MemoryKvStore::new()), &executor);

    let token = defer_ban(&interlock, "198.51.100.23").await;
    let outcome = interlock
        .submit("approve_action", &token_args(&token))
        .await
        .unwrap();

    assert!(outcome.is_executed());
    assert_eq!(
        executor.actions(),
        vec![Action::BanSuspiciousIp {
            ip: "198.51.100.23".parse().unwrap(),
            hours: 1,
        }]
    );
    assert!(interlock.list_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_second_approval_is_invalid() {
    let executor = RecordingExecutor::new();
    let interlock = interlock(Arc::new(MemoryKvStore::new()), &executor);
    let token = defer_ban(&interlock, "10.1.2.3").await;

    assert!(interlock.approve(&token).await.unwrap().is_executed());
    assert!(matches!(
        interlock.approve(&token).await.unwrap(),
        Outcome::InvalidToken
    ));
    assert_eq!(executor.call_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_execute_once() {
    init_test_tracing();
    let executor = RecordingExecutor::new().with_delay(Duration::from_millis(20));
    let interlock = Arc::new(interlock(Arc::new(MemoryKvStore::new()), &executor));
    let token = defer_ban(&interlock, "192.0.2.44").await;

    let attempts = (0..16).map(|_| {
        let interlock = Arc::clone(&interlock);
        let token = token.clone();
        tokio::spawn(async move { interlock.approve(&token).await })
    });
    let outcomes = futures::future::join_all(attempts).await;

    let executed = outcomes
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .filter(Outcome::is_executed)
        .count();
    assert_eq!(executed, 1);
    assert_eq!(executor.call_count(), 1);
}

#[tokio::test]
async fn test_expired_token_is_invalid() {
    let executor = RecordingExecutor::new();
    let interlock = interlock(Arc::new(MemoryKvStore::new()), &executor)
        .with_ttl(Duration::from_secs(1));
    let token = defer_ban(&interlock, "203.0.113.80").await;

    tokio::time::sleep(Duration::from_millis(1200)).await;

    assert!(interlock.list_pending().await.unwrap().is_empty());
    assert!(matches!(
        interlock.approve(&token).await.unwrap(),
        Outcome::InvalidToken
    ));
    assert_eq!(executor.call_count(), 0);
}

#[tokio::test]
async fn test_purge_reclaims_expired_records() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let executor = RecordingExecutor::new();
    let interlock = interlock(Arc::clone(&store), &executor).with_ttl(Duration::from_millis(50));
    defer_ban(&interlock, "203.0.113.81").await;
    defer_ban(&interlock, "203.0.113.82").await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(interlock.purge_expired().await.unwrap(), 2);
    assert_eq!(interlock.purge_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_arguments_touch_nothing() {
    let store = Arc::new(CountingStore::default());
    let executor = RecordingExecutor::new();
    let interlock = interlock(store.clone(), &executor);

    let cases = [
        ("ban_suspicious_ip", ban_args("999.1.1.1", 1)),
        ("ban_suspicious_ip", json!({ "hours": 2 })),
        ("ban_suspicious_ip", json!({ "ip": "10.0.0.1", "hours": -1 })),
        ("get_security_events", json!({ "limit": "ten" })),
        ("approve_action", json!({})),
    ];
    for (name, args) in cases {
        let err = interlock.submit(name, &args).await.unwrap_err();
        assert!(
            matches!(err, ApprovalError::Validation { .. }),
            "{name} {args}: {err:?}"
        );
    }

    assert_eq!(store.writes(), 0);
    assert_eq!(executor.call_count(), 0);
}

#[tokio::test]
async fn test_unknown_operation_touches_nothing() {
    let store = Arc::new(CountingStore::default());
    let executor = RecordingExecutor::new();
    let interlock = interlock(store.clone(), &executor);

    let err = interlock.submit("rm_rf", &no_args()).await.unwrap_err();
    assert!(matches!(err, ApprovalError::UnknownOperation { ref name } if name == "rm_rf"));
    assert_eq!(store.writes(), 0);
    assert_eq!(executor.call_count(), 0);
}

#[tokio::test]
async fn test_safe_actions_skip_the_store() {
    let store = Arc::new(CountingStore::default());
    let executor = RecordingExecutor::new();
    let interlock = interlock(store.clone(), &executor);

    for (name, args) in [
        ("check_system_health", no_args()),
        ("get_security_events", limit_args(5)),
        ("analyze_attack_patterns", no_args()),
    ] {
        assert!(interlock.submit(name, &args).await.unwrap().is_executed());
    }

    assert_eq!(store.writes(), 0);
    assert_eq!(executor.call_count(), 3);
    // The default limit was filled in before execution.
    assert_eq!(
        executor.actions()[2],
        Action::AnalyzeAttackPatterns { limit: 10 }
    );
}

#[tokio::test]
async fn test_failed_execution_still_consumes_token() {
    let executor = RecordingExecutor::new().with_failure(ExecutorError::Unavailable {
        component: "blocklist".to_string(),
        message: "connection reset".to_string(),
    });
    let interlock = interlock(Arc::new(MemoryKvStore::new()), &executor);
    let token = defer_ban(&interlock, "203.0.113.99").await;

    let err = interlock.approve(&token).await.unwrap_err();
    assert!(matches!(err, ApprovalError::Execution { .. }));
    assert!(matches!(
        interlock.approve(&token).await.unwrap(),
        Outcome::InvalidToken
    ));
    assert_eq!(executor.call_count(), 1);
}

#[tokio::test]
async fn test_corrupt_pending_entries() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let executor = RecordingExecutor::new();
    let interlock = interlock(Arc::clone(&store), &executor);

    let good = defer_ban(&interlock, "10.9.8.7").await;
    store
        .set(NAMESPACE, "deadbeefdeadbeef", b"{not json".to_vec())
        .await
        .unwrap();
    store
        .set(NAMESPACE, "not-a-token", b"{}".to_vec())
        .await
        .unwrap();

    let pending = interlock.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].token.as_str(), good);

    // The corrupt record is consumed and reported, never executed.
    let err = interlock.approve("deadbeefdeadbeef").await.unwrap_err();
    assert!(matches!(err, ApprovalError::Internal(_)));
    assert!(!store.exists(NAMESPACE, "deadbeefdeadbeef").await.unwrap());
    assert_eq!(executor.call_count(), 0);
}

#[tokio::test]
async fn test_tokens_are_unique_hex_of_configured_width() {
    let executor = RecordingExecutor::new();
    let interlock = interlock(Arc::new(MemoryKvStore::new()), &executor)
        .with_token_bytes(16)
        .unwrap();

    let mut seen = HashSet::new();
    for i in 0..200 {
        let token = defer_ban(&interlock, &format!("10.0.{}.{}", i / 256, i % 256)).await;
        assert_eq!(token.len(), 32);
        assert!(token.bytes().all(|b| b.is_ascii_hexdigit()));
        assert!(seen.insert(token));
    }
    assert_eq!(interlock.list_pending().await.unwrap().len(), 200);
}

#[tokio::test]
async fn test_malformed_tokens_never_reach_the_store() {
    let store = Arc::new(CountingStore::default());
    let executor = RecordingExecutor::new();
    let interlock = interlock(store.clone(), &executor);
    store.go_offline();

    for raw in ["", "xyz", "DEADBEE", "0123456789abcdef0"] {
        assert!(matches!(
            interlock.approve(raw).await.unwrap(),
            Outcome::InvalidToken
        ));
    }
}

#[tokio::test]
async fn test_store_outage_is_upstream_unavailable() {
    let store = Arc::new(CountingStore::default());
    let executor = RecordingExecutor::new();
    let interlock = interlock(store.clone(), &executor);
    let token = defer_ban(&interlock, "203.0.113.5").await;

    store.go_offline();
    let err = interlock.approve(&token).await.unwrap_err();
    assert!(matches!(err, ApprovalError::UpstreamUnavailable { .. }));
    assert_eq!(err.kind(), "upstream_unavailable");

    let err = interlock
        .submit("ban_suspicious_ip", &ban_args("203.0.113.6", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ApprovalError::UpstreamUnavailable { .. }));
    assert_eq!(executor.call_count(), 0);
}

#[tokio::test]
async fn test_executor_output_is_returned() {
    let executor = RecordingExecutor::new().with_output(ToolOutput::Text("done".into()));
    let interlock = interlock(Arc::new(MemoryKvStore::new()), &executor);
    let token = defer_ban(&interlock, "203.0.113.10").await;

    match interlock.approve(&token).await.unwrap() {
        Outcome::Executed(ToolOutput::Text(text)) => assert_eq!(text, "done"),
        other => panic!("unexpected outcome {other:?}"),
    }
}
