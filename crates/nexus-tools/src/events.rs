//! Suspicious-traffic event log.
//!
//! The rate limiter reports blocked requests; operators read them newest
//! first. Events are stored one per key under a sortable key
//! `{unix_millis:020}-{seq:010}`, so a reverse key sort is a reverse
//! chronological range read and [`EventSource::recent`] only decodes the
//! entries it returns.
//!
//! The log keeps at most [`EventLog::with_max_events`] entries (default
//! [`DEFAULT_MAX_EVENTS`]). A running count of live entries is kept in
//! memory and the store is only scanned for trimming once that count passes
//! the cap by a tenth, at which point the oldest entries are dropped in one
//! batch.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use nexus_storage::{KvStore, ScopedKvStore, StorageError};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{ToolError, ToolResult};

/// Default namespace for the event log.
pub const DEFAULT_EVENTS_NAMESPACE: &str = "nexus:events";

/// Maximum events retained.
pub const DEFAULT_MAX_EVENTS: usize = 10_000;

const COMPONENT: &str = "events";

/// A recorded suspicious-traffic event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Source-assigned identifier, `{unix_millis}-{seq}`.
    pub id: String,
    /// Client identifier the rate limiter resolved.
    pub client_id: Option<String>,
    /// Source address.
    pub ip: Option<String>,
    /// Why the request was flagged.
    pub reason: Option<String>,
    /// RFC 3339 time of the event.
    pub timestamp: Option<String>,
}

/// An event as reported, before the log assigns it an id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSecurityEvent {
    /// Client identifier the rate limiter resolved.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Source address; must be an IP literal when present.
    #[serde(default)]
    pub ip: Option<String>,
    /// Why the request was flagged.
    #[serde(default)]
    pub reason: Option<String>,
    /// RFC 3339 time of the event. Defaults to the time of recording.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl NewSecurityEvent {
    /// Check the event can be recorded.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidEvent`] if the event carries neither an IP
    /// nor a client id, or if its IP is not an address literal.
    pub fn validate(&self) -> ToolResult<()> {
        if self.ip.is_none() && self.client_id.is_none() {
            return Err(ToolError::InvalidEvent(
                "event needs an ip or a client_id".to_string(),
            ));
        }
        if let Some(ip) = &self.ip
            && ip.parse::<IpAddr>().is_err()
        {
            return Err(ToolError::InvalidEvent(format!(
                "'{ip}' is not a valid IP address."
            )));
        }
        Ok(())
    }
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Where security events are read from and appended to.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// The `limit` most recent events, newest first.
    async fn recent(&self, limit: usize) -> ToolResult<Vec<SecurityEvent>>;

    /// Append an event and return it with its assigned id.
    ///
    /// Rejects events that fail [`NewSecurityEvent::validate`] before
    /// touching the backend.
    async fn record(&self, event: NewSecurityEvent) -> ToolResult<SecurityEvent>;
}

/// KV-backed event log.
#[derive(Debug)]
pub struct EventLog {
    store: ScopedKvStore,
    seq: AtomicU64,
    max_events: usize,
    /// Live entries in the namespace; `None` until first counted.
    live: Mutex<Option<usize>>,
}

impl EventLog {
    /// Open the log in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace is invalid.
    pub fn new(store: Arc<dyn KvStore>, namespace: &str) -> ToolResult<Self> {
        Ok(Self {
            store: ScopedKvStore::new(store, namespace).map_err(ToolError::storage(COMPONENT))?,
            seq: AtomicU64::new(0),
            max_events: DEFAULT_MAX_EVENTS,
            live: Mutex::new(None),
        })
    }

    /// Override the retention cap.
    #[must_use]
    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events.max(1);
        self
    }

    /// Count at which a trim runs.
    fn high_water(&self) -> usize {
        self.max_events.saturating_add(self.max_events / 10)
    }

    /// Account for one inserted entry and trim if the count passed the
    /// high-water mark.
    async fn note_insert(&self) -> ToolResult<()> {
        let mut live = self.live.lock().await;
        let count = match *live {
            Some(n) => n.saturating_add(1),
            // First insert since startup: the scan already includes it.
            None => self
                .store
                .list_keys()
                .await
                .map_err(ToolError::storage(COMPONENT))?
                .len(),
        };
        *live = Some(count);

        if count > self.high_water() {
            *live = Some(self.trim().await?);
        }
        Ok(())
    }

    /// Drop the oldest entries down to the cap. Returns the entries left.
    async fn trim(&self) -> ToolResult<usize> {
        let mut keys = self
            .store
            .list_keys()
            .await
            .map_err(ToolError::storage(COMPONENT))?;
        let excess = keys.len().saturating_sub(self.max_events);
        if excess == 0 {
            return Ok(keys.len());
        }

        keys.sort_unstable();
        for key in keys.iter().take(excess) {
            self.store
                .delete(key)
                .await
                .map_err(ToolError::storage(COMPONENT))?;
        }
        debug!(dropped = excess, kept = self.max_events, "trimmed event log");
        Ok(keys.len().saturating_sub(excess))
    }
}

#[async_trait]
impl EventSource for EventLog {
    async fn recent(&self, limit: usize) -> ToolResult<Vec<SecurityEvent>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut keys = self
            .store
            .list_keys()
            .await
            .map_err(ToolError::storage(COMPONENT))?;
        keys.sort_unstable_by(|a, b| b.cmp(a));

        let mut events = Vec::with_capacity(limit.min(keys.len()));
        for key in keys {
            if events.len() >= limit {
                break;
            }
            match self.store.get_json::<SecurityEvent>(&key).await {
                Ok(Some(event)) => events.push(event),
                // Trimmed since the key listing.
                Ok(None) => {},
                Err(StorageError::Serialization(e)) => {
                    warn!(key = %key, error = %e, "skipping undecodable event");
                },
                Err(e) => return Err(ToolError::storage(COMPONENT)(e)),
            }
        }
        Ok(events)
    }

    async fn record(&self, event: NewSecurityEvent) -> ToolResult<SecurityEvent> {
        event.validate()?;

        let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let key = format!("{millis:020}-{seq:010}");

        let stored = SecurityEvent {
            id: format!("{millis}-{seq}"),
            client_id: event.client_id,
            ip: event.ip,
            reason: event.reason,
            timestamp: event.timestamp.or_else(|| Some(now_rfc3339())),
        };

        self.store
            .set_json(&key, &stored)
            .await
            .map_err(ToolError::storage(COMPONENT))?;
        debug!(id = %stored.id, ip = ?stored.ip, "recorded security event");

        self.note_insert().await?;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_storage::{KvEntry, MemoryKvStore, StorageResult};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Memory store that counts value reads.
    #[derive(Default)]
    struct CountingReads {
        inner: MemoryKvStore,
        gets: AtomicUsize,
        entry_listings: AtomicUsize,
    }

    impl CountingReads {
        fn gets(&self) -> usize {
            self.gets.load(Ordering::SeqCst)
        }

        fn entry_listings(&self) -> usize {
            self.entry_listings.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KvStore for CountingReads {
        async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(namespace, key).await
        }

        async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
            self.inner.set(namespace, key, value).await
        }

        async fn set_with_ttl(
            &self,
            namespace: &str,
            key: &str,
            value: Vec<u8>,
            ttl: Duration,
        ) -> StorageResult<()> {
            self.inner.set_with_ttl(namespace, key, value, ttl).await
        }

        async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
            self.inner.delete(namespace, key).await
        }

        async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
            self.inner.exists(namespace, key).await
        }

        async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
            self.inner.list_keys(namespace).await
        }

        async fn list_entries(&self, namespace: &str) -> StorageResult<Vec<KvEntry>> {
            self.entry_listings.fetch_add(1, Ordering::SeqCst);
            self.inner.list_entries(namespace).await
        }

        async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64> {
            self.inner.clear_namespace(namespace).await
        }

        async fn purge_expired(&self, namespace: &str) -> StorageResult<u64> {
            self.inner.purge_expired(namespace).await
        }
    }

    async fn live(store: &Arc<dyn KvStore>) -> usize {
        store.list_keys(DEFAULT_EVENTS_NAMESPACE).await.unwrap().len()
    }

    fn log() -> EventLog {
        EventLog::new(Arc::new(MemoryKvStore::new()), DEFAULT_EVENTS_NAMESPACE).unwrap()
    }

    fn event(ip: &str) -> NewSecurityEvent {
        NewSecurityEvent {
            client_id: Some("api-key-7".to_string()),
            ip: Some(ip.to_string()),
            reason: Some("rate limit exceeded".to_string()),
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let log = log();
        log.record(event("10.0.0.1")).await.unwrap();
        log.record(event("10.0.0.2")).await.unwrap();
        log.record(event("10.0.0.3")).await.unwrap();

        let recent = log.recent(2).await.unwrap();
        let ips: Vec<_> = recent.iter().map(|e| e.ip.as_deref().unwrap()).collect();
        assert_eq!(ips, vec!["10.0.0.3", "10.0.0.2"]);
    }

    #[tokio::test]
    async fn test_recent_on_empty_log() {
        assert!(log().recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_assigns_id_and_timestamp() {
        let stored = log().record(event("2001:db8::1")).await.unwrap();
        assert!(stored.id.ends_with("-0"));
        assert!(stored.timestamp.is_some());
    }

    #[tokio::test]
    async fn test_record_keeps_reported_timestamp() {
        let mut e = event("10.0.0.1");
        e.timestamp = Some("2026-01-01T00:00:00Z".to_string());
        let stored = log().record(e).await.unwrap();
        assert_eq!(stored.timestamp.as_deref(), Some("2026-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_record_rejects_bad_ip() {
        let err = log().record(event("999.1.1.1")).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidEvent(ref m) if m.contains("999.1.1.1")));
    }

    #[tokio::test]
    async fn test_record_rejects_anonymous_event() {
        let err = log().record(NewSecurityEvent::default()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidEvent(_)));
    }

    #[tokio::test]
    async fn test_log_is_capped() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let log = EventLog::new(Arc::clone(&store), DEFAULT_EVENTS_NAMESPACE)
            .unwrap()
            .with_max_events(3);
        for i in 1..=5 {
            log.record(event(&format!("10.0.0.{i}"))).await.unwrap();
        }

        assert_eq!(store.list_keys(DEFAULT_EVENTS_NAMESPACE).await.unwrap().len(), 3);
        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(recent[2].ip.as_deref(), Some("10.0.0.3"));
    }

    #[tokio::test]
    async fn test_trim_waits_for_high_water_mark() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let log = EventLog::new(Arc::clone(&store), DEFAULT_EVENTS_NAMESPACE)
            .unwrap()
            .with_max_events(20);

        for i in 0..22 {
            log.record(event(&format!("10.1.0.{i}"))).await.unwrap();
        }
        // 22 is at the mark (20 + 20/10), not past it.
        assert_eq!(live(&store).await, 22);

        log.record(event("10.1.0.99")).await.unwrap();
        assert_eq!(live(&store).await, 20);
        let newest = log.recent(1).await.unwrap();
        assert_eq!(newest[0].ip.as_deref(), Some("10.1.0.99"));
    }

    #[tokio::test]
    async fn test_count_resumes_from_existing_entries() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let first = EventLog::new(Arc::clone(&store), DEFAULT_EVENTS_NAMESPACE).unwrap();
        for i in 0..4 {
            first.record(event(&format!("10.2.0.{i}"))).await.unwrap();
        }

        // A fresh log over the same store counts what is already there.
        let second = EventLog::new(Arc::clone(&store), DEFAULT_EVENTS_NAMESPACE)
            .unwrap()
            .with_max_events(2);
        second.record(event("10.2.0.9")).await.unwrap();
        assert_eq!(store.list_keys(DEFAULT_EVENTS_NAMESPACE).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_recent_stops_at_limit() {
        let store = Arc::new(CountingReads::default());
        let log = EventLog::new(store.clone(), DEFAULT_EVENTS_NAMESPACE).unwrap();
        for i in 0..50 {
            log.record(event(&format!("10.3.0.{i}"))).await.unwrap();
        }

        let recent = log.recent(5).await.unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].ip.as_deref(), Some("10.3.0.49"));
        assert_eq!(store.gets(), 5);
        assert_eq!(store.entry_listings(), 0);
    }

    #[tokio::test]
    async fn test_recent_skips_corrupt_entries() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let log = EventLog::new(Arc::clone(&store), DEFAULT_EVENTS_NAMESPACE).unwrap();
        log.record(event("10.0.0.1")).await.unwrap();
        store
            .set(
                DEFAULT_EVENTS_NAMESPACE,
                "99999999999999999999-0000000000",
                b"garbage".to_vec(),
            )
            .await
            .unwrap();

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
    }
}
