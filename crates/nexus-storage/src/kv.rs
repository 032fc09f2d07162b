//! Raw key-value store trait and implementations.
//!
//! The [`KvStore`] trait provides byte-level `get`/`set`/`delete` operations
//! with namespaced keys and optional per-entry expiry. Implementations:
//!
//! - **In-memory** (always available): For tests and ephemeral data
//! - **`SurrealKV`** (behind `kv` feature): Persistent, ACID-compliant
//!
//! # Namespacing
//!
//! All operations are scoped to a namespace. The gateway uses one namespace
//! per concern: `nexus:approval` for pending actions, `nexus:events` for the
//! suspicious-traffic log and `blacklist` for banned addresses.
//!
//! # Expiry
//!
//! Expiry is enforced lazily. An entry whose deadline has passed is treated
//! as absent by every read path; [`KvStore::purge_expired`] reclaims the
//! space.
//!
//! # Ergonomic Access
//!
//! Use [`ScopedKvStore`] to pre-bind a namespace. It also provides typed
//! [`get_json`](ScopedKvStore::get_json) /
//! [`set_json`](ScopedKvStore::set_json) convenience methods.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate that a namespace is safe for use as a key prefix.
///
/// Namespaces must be non-empty and must not contain the null byte
/// (used internally as the namespace/key separator).
pub(crate) fn validate_namespace(namespace: &str) -> StorageResult<()> {
    if namespace.is_empty() {
        return Err(StorageError::InvalidKey(
            "namespace must not be empty".into(),
        ));
    }
    if namespace.contains('\0') {
        return Err(StorageError::InvalidKey(
            "namespace must not contain null bytes".into(),
        ));
    }
    Ok(())
}

/// Validate that a key is safe for storage.
///
/// Keys must be non-empty and must not contain the null byte.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".into()));
    }
    if key.contains('\0') {
        return Err(StorageError::InvalidKey(
            "key must not contain null bytes".into(),
        ));
    }
    Ok(())
}

/// Build the composite key `"{namespace}\0{key}"` as bytes.
#[cfg(feature = "kv")]
fn composite_key(namespace: &str, key: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(namespace.len().saturating_add(key.len()).saturating_add(1));
    buf.extend_from_slice(namespace.as_bytes());
    buf.push(0);
    buf.extend_from_slice(key.as_bytes());
    buf
}

/// Build the start of the namespace range (inclusive): `"{namespace}\0"`.
#[cfg(feature = "kv")]
fn namespace_range_start(namespace: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(namespace.len().saturating_add(1));
    buf.extend_from_slice(namespace.as_bytes());
    buf.push(0);
    buf
}

/// Build the end of the namespace range (exclusive): `"{namespace}\x01"`.
///
/// Any key in the namespace has the form `"{namespace}\0{key}"` and `\x01`
/// immediately follows `\0`, so `["{namespace}\0", "{namespace}\x01")`
/// captures exactly the keys of the namespace.
#[cfg(feature = "kv")]
fn namespace_range_end(namespace: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(namespace.len().saturating_add(1));
    buf.extend_from_slice(namespace.as_bytes());
    buf.push(1);
    buf
}

// ---------------------------------------------------------------------------
// Expiry envelope (persistent backends)
// ---------------------------------------------------------------------------

/// Length of the big-endian expiry header stored in front of every value.
#[cfg(feature = "kv")]
const ENVELOPE_HEADER_LEN: usize = 8;

/// Current wall-clock time in unix milliseconds.
#[cfg(feature = "kv")]
fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Absolute deadline for a TTL, in unix milliseconds.
#[cfg(feature = "kv")]
fn deadline_millis(ttl: Duration) -> u64 {
    let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    // 0 means "never expires"; a zero TTL still needs a real deadline.
    now_millis().saturating_add(ttl_ms).max(1)
}

/// Prefix `value` with its expiry deadline (`0` = never).
#[cfg(feature = "kv")]
fn encode_envelope(value: &[u8], expires_at_ms: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(value.len().saturating_add(ENVELOPE_HEADER_LEN));
    buf.extend_from_slice(&expires_at_ms.to_be_bytes());
    buf.extend_from_slice(value);
    buf
}

/// Split a stored envelope into `(expires_at_ms, payload)`.
#[cfg(feature = "kv")]
fn decode_envelope<'a>(key: &str, raw: &'a [u8]) -> StorageResult<(u64, &'a [u8])> {
    if raw.len() < ENVELOPE_HEADER_LEN {
        return Err(StorageError::Corrupt {
            key: key.to_string(),
            reason: format!("value is {} bytes, shorter than the expiry header", raw.len()),
        });
    }
    let (header, payload) = raw.split_at(ENVELOPE_HEADER_LEN);
    let mut deadline = [0u8; ENVELOPE_HEADER_LEN];
    deadline.copy_from_slice(header);
    Ok((u64::from_be_bytes(deadline), payload))
}

#[cfg(feature = "kv")]
fn is_expired(expires_at_ms: u64, now_ms: u64) -> bool {
    expires_at_ms != 0 && expires_at_ms <= now_ms
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A key-value entry with its namespace and key.
#[derive(Debug, Clone)]
pub struct KvEntry {
    /// The namespace this entry belongs to.
    pub namespace: String,
    /// The key within the namespace.
    pub key: String,
    /// The raw value bytes.
    pub value: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Raw key-value store trait.
///
/// Provides namespaced byte-level storage. All operations are scoped
/// to a namespace for isolation, and every single-key operation is atomic.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a live value by namespace and key.
    ///
    /// Returns `None` if the key does not exist or has expired.
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Set a value that never expires.
    ///
    /// Overwrites any existing value.
    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Set a value that becomes invisible once `ttl` has elapsed.
    ///
    /// Overwrites any existing value (and its expiry).
    async fn set_with_ttl(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> StorageResult<()>;

    /// Delete a key from a namespace.
    ///
    /// Returns `true` only if a live (unexpired) entry was removed by this
    /// call. Concurrent deletes of the same key see `true` at most once.
    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// Check if a live key exists in a namespace.
    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// List all live keys in a namespace.
    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>>;

    /// List all live entries in a namespace, in backend enumeration order.
    async fn list_entries(&self, namespace: &str) -> StorageResult<Vec<KvEntry>>;

    /// Delete all keys in a namespace.
    async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64>;

    /// Physically remove expired entries from a namespace.
    ///
    /// Returns the number of entries reclaimed.
    async fn purge_expired(&self, namespace: &str) -> StorageResult<u64>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (always available)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// In-memory key-value store for tests and ephemeral data.
///
/// Keys are stored as `"{namespace}\0{key}"` in a `HashMap`. Deletes run
/// under the write lock, so the existence check and the removal are one
/// atomic step.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    data: std::sync::RwLock<std::collections::HashMap<String, MemoryEntry>>,
}

impl MemoryKvStore {
    /// Create a new empty in-memory KV store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn full_key(namespace: &str, key: &str) -> String {
        format!("{namespace}\0{key}")
    }

    fn insert(&self, namespace: &str, key: &str, entry: MemoryEntry) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        data.insert(Self::full_key(namespace, key), entry);
        Ok(())
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        let now = Instant::now();
        Ok(data
            .get(&Self::full_key(namespace, key))
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.insert(
            namespace,
            key,
            MemoryEntry {
                value,
                expires_at: None,
            },
        )
    }

    async fn set_with_ttl(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> StorageResult<()> {
        let now = Instant::now();
        let deadline = now.checked_add(ttl);
        self.insert(
            namespace,
            key,
            MemoryEntry {
                value,
                expires_at: deadline,
            },
        )
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        let now = Instant::now();
        Ok(data
            .remove(&Self::full_key(namespace, key))
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        let now = Instant::now();
        Ok(data
            .get(&Self::full_key(namespace, key))
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .list_entries(namespace)
            .await?
            .into_iter()
            .map(|entry| entry.key)
            .collect())
    }

    async fn list_entries(&self, namespace: &str) -> StorageResult<Vec<KvEntry>> {
        validate_namespace(namespace)?;
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        let prefix = format!("{namespace}\0");
        let now = Instant::now();
        Ok(data
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .filter_map(|(k, entry)| {
                k.strip_prefix(&prefix).map(|key| KvEntry {
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                    value: entry.value.clone(),
                })
            })
            .collect())
    }

    async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64> {
        validate_namespace(namespace)?;
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        let prefix = format!("{namespace}\0");
        let before = data.len();
        data.retain(|k, _| !k.starts_with(&prefix));
        Ok(u64::try_from(before.saturating_sub(data.len())).unwrap_or(u64::MAX))
    }

    async fn purge_expired(&self, namespace: &str) -> StorageResult<u64> {
        validate_namespace(namespace)?;
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        let prefix = format!("{namespace}\0");
        let now = Instant::now();
        let before = data.len();
        data.retain(|k, entry| !k.starts_with(&prefix) || entry.is_live(now));
        Ok(u64::try_from(before.saturating_sub(data.len())).unwrap_or(u64::MAX))
    }
}

// ---------------------------------------------------------------------------
// SurrealKV implementation (behind `kv` feature)
// ---------------------------------------------------------------------------

/// Persistent key-value store backed by `SurrealKV`.
///
/// ACID-compliant embedded LSM-tree storage. Every value is stored behind an
/// 8-byte big-endian expiry header (unix milliseconds, `0` = never).
///
/// Mutations additionally pass through an in-process write mutex, so two
/// concurrent `delete` calls on the same key can never both observe the
/// entry and both report removal.
///
/// # Example
///
/// ```rust,ignore
/// use nexus_storage::kv::SurrealKvStore;
///
/// let store = SurrealKvStore::open("./data/kv")?;
/// store.set("nexus:approval", "a1b2c3d4", b"{}".to_vec()).await?;
/// ```
#[cfg(feature = "kv")]
pub struct SurrealKvStore {
    tree: surrealkv::Tree,
    write_lock: tokio::sync::Mutex<()>,
}

#[cfg(feature = "kv")]
impl std::fmt::Debug for SurrealKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurrealKvStore").finish_non_exhaustive()
    }
}

#[cfg(feature = "kv")]
impl SurrealKvStore {
    /// Open a persistent KV store at the given directory path.
    ///
    /// Creates the directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the store cannot be opened.
    pub fn open(path: impl AsRef<std::path::Path>) -> StorageResult<Self> {
        let tree = surrealkv::TreeBuilder::new()
            .with_path(path.as_ref().to_path_buf())
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        tracing::debug!(path = %path.as_ref().display(), "opened SurrealKV store");
        Ok(Self {
            tree,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Close the store, flushing any pending writes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if the flush fails.
    pub async fn close(&self) -> StorageResult<()> {
        self.tree
            .close()
            .await
            .map_err(|e| StorageError::Internal(e.to_string()))
    }

    async fn write(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        expires_at_ms: u64,
    ) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let ck = composite_key(namespace, key);
        let stored = encode_envelope(value, expires_at_ms);
        let _guard = self.write_lock.lock().await;
        let mut tx = self.tree.begin().map_err(|ref e| map_kv_err(e))?;
        tx.set(&ck, &stored).map_err(|ref e| map_kv_err(e))?;
        tx.commit().await.map_err(|ref e| map_kv_err(e))
    }

    /// Collect the raw composite keys of a namespace.
    fn raw_keys(&self, namespace: &str) -> StorageResult<Vec<Vec<u8>>> {
        let start = namespace_range_start(namespace);
        let end = namespace_range_end(namespace);
        let tx = self
            .tree
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(|ref e| map_kv_err(e))?;
        let mut iter = tx.range(&start, &end).map_err(|ref e| map_kv_err(e))?;
        iter.seek_first().map_err(|ref e| map_kv_err(e))?;

        let mut keys = Vec::new();
        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next().map_err(|ref e| map_kv_err(e))?;
        }
        Ok(keys)
    }
}

#[cfg(feature = "kv")]
fn map_kv_err(e: &surrealkv::Error) -> StorageError {
    StorageError::Internal(e.to_string())
}

#[cfg(feature = "kv")]
#[async_trait]
impl KvStore for SurrealKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let ck = composite_key(namespace, key);
        let tx = self
            .tree
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(|ref e| map_kv_err(e))?;
        let Some(raw) = tx.get(&ck).map_err(|ref e| map_kv_err(e))? else {
            return Ok(None);
        };
        let (expires_at, payload) = decode_envelope(key, &raw)?;
        if is_expired(expires_at, now_millis()) {
            return Ok(None);
        }
        Ok(Some(payload.to_vec()))
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.write(namespace, key, &value, 0).await
    }

    async fn set_with_ttl(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> StorageResult<()> {
        self.write(namespace, key, &value, deadline_millis(ttl)).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let ck = composite_key(namespace, key);
        let _guard = self.write_lock.lock().await;
        let mut tx = self.tree.begin().map_err(|ref e| map_kv_err(e))?;
        let Some(raw) = tx.get(&ck).map_err(|ref e| map_kv_err(e))? else {
            return Ok(false);
        };
        // A corrupt header still gets removed, but never counts as live.
        let live = decode_envelope(key, &raw)
            .map(|(expires_at, _)| !is_expired(expires_at, now_millis()))
            .unwrap_or(false);
        tx.delete(&ck).map_err(|ref e| map_kv_err(e))?;
        tx.commit().await.map_err(|ref e| map_kv_err(e))?;
        Ok(live)
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        Ok(self.get(namespace, key).await?.is_some())
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .list_entries(namespace)
            .await?
            .into_iter()
            .map(|entry| entry.key)
            .collect())
    }

    async fn list_entries(&self, namespace: &str) -> StorageResult<Vec<KvEntry>> {
        validate_namespace(namespace)?;
        let prefix_len = namespace.len().saturating_add(1); // namespace + \0
        let raw_keys = self.raw_keys(namespace)?;

        let tx = self
            .tree
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(|ref e| map_kv_err(e))?;
        let now = now_millis();
        let mut entries = Vec::with_capacity(raw_keys.len());
        for raw_key in raw_keys {
            let Some(key_bytes) = raw_key.get(prefix_len..) else {
                continue;
            };
            let Ok(key) = std::str::from_utf8(key_bytes) else {
                continue;
            };
            let Some(raw) = tx.get(&raw_key).map_err(|ref e| map_kv_err(e))? else {
                continue;
            };
            match decode_envelope(key, &raw) {
                Ok((expires_at, payload)) if !is_expired(expires_at, now) => {
                    entries.push(KvEntry {
                        namespace: namespace.to_string(),
                        key: key.to_string(),
                        value: payload.to_vec(),
                    });
                },
                Ok(_) => {},
                Err(e) => tracing::warn!(namespace, error = %e, "skipping corrupt KV entry"),
            }
        }
        Ok(entries)
    }

    async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64> {
        validate_namespace(namespace)?;
        let keys_to_delete = self.raw_keys(namespace)?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self.tree.begin().map_err(|ref e| map_kv_err(e))?;
        let count = u64::try_from(keys_to_delete.len()).unwrap_or(u64::MAX);
        for key in &keys_to_delete {
            tx.delete(key).map_err(|ref e| map_kv_err(e))?;
        }
        if count > 0 {
            tx.commit().await.map_err(|ref e| map_kv_err(e))?;
        }
        Ok(count)
    }

    async fn purge_expired(&self, namespace: &str) -> StorageResult<u64> {
        validate_namespace(namespace)?;
        let raw_keys = self.raw_keys(namespace)?;
        let now = now_millis();

        let _guard = self.write_lock.lock().await;
        let mut tx = self.tree.begin().map_err(|ref e| map_kv_err(e))?;
        let mut purged: u64 = 0;
        for raw_key in &raw_keys {
            let Some(raw) = tx.get(raw_key).map_err(|ref e| map_kv_err(e))? else {
                continue;
            };
            let expired = decode_envelope("<purge>", &raw)
                .map(|(expires_at, _)| is_expired(expires_at, now))
                .unwrap_or(false);
            if expired {
                tx.delete(raw_key).map_err(|ref e| map_kv_err(e))?;
                purged = purged.saturating_add(1);
            }
        }
        if purged > 0 {
            tx.commit().await.map_err(|ref e| map_kv_err(e))?;
        }
        Ok(purged)
    }
}

// ---------------------------------------------------------------------------
// Scoped store (namespace pre-bound)
// ---------------------------------------------------------------------------

/// A namespace-scoped view into a [`KvStore`].
///
/// Each gateway component receives a `ScopedKvStore` for its own namespace
/// and never handles namespaces directly.
///
/// # Example
///
/// ```rust,ignore
/// use nexus_storage::kv::{ScopedKvStore, MemoryKvStore};
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryKvStore::new());
/// let scoped = ScopedKvStore::new(store, "nexus:approval")?;
///
/// scoped.set("a1b2c3d4", b"{}".to_vec()).await?;
/// let val = scoped.get("a1b2c3d4").await?;
/// ```
#[derive(Clone)]
pub struct ScopedKvStore {
    inner: Arc<dyn KvStore>,
    namespace: String,
}

impl std::fmt::Debug for ScopedKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedKvStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl ScopedKvStore {
    /// Create a scoped view into the given store for `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the namespace is empty
    /// or contains null bytes.
    pub fn new(store: Arc<dyn KvStore>, namespace: impl Into<String>) -> StorageResult<Self> {
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        Ok(Self {
            inner: store,
            namespace,
        })
    }

    /// The namespace this store is scoped to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Get a raw byte value by key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the key is empty or invalid.
    pub async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        self.inner.get(&self.namespace, key).await
    }

    /// Set a raw byte value that never expires.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the key is empty or invalid.
    pub async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_key(key)?;
        self.inner.set(&self.namespace, key, value).await
    }

    /// Set a raw byte value that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the key is empty or invalid.
    pub async fn set_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> StorageResult<()> {
        validate_key(key)?;
        self.inner
            .set_with_ttl(&self.namespace, key, value, ttl)
            .await
    }

    /// Delete a key.
    ///
    /// Returns `true` if a live entry was removed by this call.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the key is empty or invalid.
    pub async fn delete(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        self.inner.delete(&self.namespace, key).await
    }

    /// Check if a key exists.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the key is empty or invalid.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        self.inner.exists(&self.namespace, key).await
    }

    /// List all keys in this namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store operation fails.
    pub async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.inner.list_keys(&self.namespace).await
    }

    /// List all live entries in this namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store operation fails.
    pub async fn list_entries(&self) -> StorageResult<Vec<KvEntry>> {
        self.inner.list_entries(&self.namespace).await
    }

    /// Delete all keys in this namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store operation fails.
    pub async fn clear(&self) -> StorageResult<u64> {
        self.inner.clear_namespace(&self.namespace).await
    }

    /// Reclaim expired entries in this namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store operation fails.
    pub async fn purge_expired(&self) -> StorageResult<u64> {
        self.inner.purge_expired(&self.namespace).await
    }

    // -- Typed convenience (JSON) --

    /// Deserialize a JSON value from the store.
    ///
    /// Returns `None` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if deserialization fails.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> StorageResult<Option<T>> {
        let bytes = self.get(key).await?;
        bytes
            .map(|b| {
                serde_json::from_slice(&b).map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .transpose()
    }

    /// Serialize a value as JSON and store it without expiry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if serialization fails.
    pub async fn set_json<T: serde::Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.set(key, bytes).await
    }

    /// Serialize a value as JSON and store it with an expiry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if serialization fails.
    pub async fn set_json_with_ttl<T: serde::Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> StorageResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.set_with_ttl(key, bytes, ttl).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    // -- MemoryKvStore tests --

    #[tokio::test]
    async fn test_memory_get_set() {
        let store = MemoryKvStore::new();
        store.set("ns1", "key1", b"hello".to_vec()).await.unwrap();
        let val = store.get("ns1", "key1").await.unwrap();
        assert_eq!(val, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_get_missing() {
        let store = MemoryKvStore::new();
        assert!(store.get("ns1", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_delete_reports_once() {
        let store = MemoryKvStore::new();
        store.set("ns1", "k", b"v".to_vec()).await.unwrap();
        assert!(store.delete("ns1", "k").await.unwrap());
        assert!(!store.delete("ns1", "k").await.unwrap());
        assert!(store.get("ns1", "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_namespace_isolation() {
        let store = MemoryKvStore::new();
        store.set("ns1", "k", b"v1".to_vec()).await.unwrap();
        store.set("ns2", "k", b"v2".to_vec()).await.unwrap();
        assert_eq!(store.get("ns1", "k").await.unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.get("ns2", "k").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_ttl_hides_expired_entries() {
        let store = MemoryKvStore::new();
        store
            .set_with_ttl("ns", "short", b"v".to_vec(), Duration::from_millis(40))
            .await
            .unwrap();
        store.set("ns", "forever", b"v".to_vec()).await.unwrap();
        assert!(store.exists("ns", "short").await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(store.get("ns", "short").await.unwrap().is_none());
        assert!(!store.exists("ns", "short").await.unwrap());
        assert_eq!(store.list_keys("ns").await.unwrap(), vec!["forever"]);
        // An expired entry can no longer be "consumed".
        assert!(!store.delete("ns", "short").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_purge_expired() {
        let store = MemoryKvStore::new();
        store
            .set_with_ttl("ns", "a", b"1".to_vec(), Duration::from_millis(10))
            .await
            .unwrap();
        store.set("ns", "b", b"2".to_vec()).await.unwrap();
        store
            .set_with_ttl("other", "c", b"3".to_vec(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.purge_expired("ns").await.unwrap(), 1);
        assert_eq!(store.purge_expired("ns").await.unwrap(), 0);
        assert_eq!(store.list_keys("ns").await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_memory_list_entries_and_clear() {
        let store = MemoryKvStore::new();
        store.set("ns1", "a", b"1".to_vec()).await.unwrap();
        store.set("ns1", "b", b"2".to_vec()).await.unwrap();
        store.set("ns2", "c", b"3".to_vec()).await.unwrap();

        let mut entries = store.list_entries("ns1").await.unwrap();
        entries.sort_by(|x, y| x.key.cmp(&y.key));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "a");
        assert_eq!(entries[1].value, b"2".to_vec());
        assert!(entries.iter().all(|e| e.namespace == "ns1"));

        assert_eq!(store.clear_namespace("ns1").await.unwrap(), 2);
        assert!(store.list_keys("ns1").await.unwrap().is_empty());
        assert_eq!(store.list_keys("ns2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_concurrent_delete_has_single_winner() {
        let store = Arc::new(MemoryKvStore::new());
        store.set("ns", "token", b"v".to_vec()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.delete("ns", "token").await.unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_memory_rejects_what_persistent_backends_reject() {
        let store = MemoryKvStore::new();
        assert!(store.set("ns", "", b"v".to_vec()).await.is_err());
        assert!(store.set("", "k", b"v".to_vec()).await.is_err());
        assert!(
            store
                .set_with_ttl("ns", "k\0x", b"v".to_vec(), Duration::from_secs(1))
                .await
                .is_err()
        );
        assert!(store.get("ns", "").await.is_err());
        assert!(store.delete("ns", "").await.is_err());
        assert!(store.exists("", "k").await.is_err());
        assert!(store.list_entries("").await.is_err());
        assert!(store.purge_expired("").await.is_err());
        assert!(store.clear_namespace("bad\0ns").await.is_err());
    }

    // -- Validation tests --

    #[test]
    fn test_validate_namespace_rejects_empty_and_null() {
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("ns\0bad").is_err());
    }

    #[test]
    fn test_validate_key_rejects_empty_and_null() {
        assert!(validate_key("").is_err());
        assert!(validate_key("k\0bad").is_err());
    }

    // -- ScopedKvStore tests --

    #[tokio::test]
    async fn test_scoped_isolation() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let a = ScopedKvStore::new(Arc::clone(&store), "nexus:approval").unwrap();
        let b = ScopedKvStore::new(Arc::clone(&store), "blacklist").unwrap();

        a.set("key", b"a-value".to_vec()).await.unwrap();
        b.set("key", b"b-value".to_vec()).await.unwrap();

        assert_eq!(a.get("key").await.unwrap(), Some(b"a-value".to_vec()));
        assert_eq!(b.get("key").await.unwrap(), Some(b"b-value".to_vec()));
    }

    #[tokio::test]
    async fn test_scoped_json_with_ttl() {
        let store = Arc::new(MemoryKvStore::new());
        let scoped = ScopedKvStore::new(store, "ns").unwrap();

        #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
        struct Record {
            name: String,
            hours: u32,
        }

        let record = Record {
            name: "ban_suspicious_ip".into(),
            hours: 2,
        };
        scoped
            .set_json_with_ttl("t", &record, Duration::from_secs(60))
            .await
            .unwrap();
        let loaded: Record = scoped.get_json("t").await.unwrap().unwrap();
        assert_eq!(loaded, record);

        let missing: Option<Record> = scoped.get_json("missing").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_scoped_rejects_empty_key() {
        let store = Arc::new(MemoryKvStore::new());
        let scoped = ScopedKvStore::new(store, "ns").unwrap();
        assert!(scoped.get("").await.is_err());
        assert!(scoped.delete("").await.is_err());
    }

    #[test]
    fn test_scoped_rejects_empty_namespace() {
        let store = Arc::new(MemoryKvStore::new());
        assert!(ScopedKvStore::new(store, "").is_err());
    }

    // -- SurrealKvStore tests (behind feature gate) --

    #[cfg(feature = "kv")]
    mod surreal_kv_tests {
        use super::*;

        fn make_store() -> (SurrealKvStore, tempfile::TempDir) {
            let dir = tempfile::tempdir().unwrap();
            let store = SurrealKvStore::open(dir.path()).unwrap();
            (store, dir)
        }

        #[test]
        fn test_envelope_layout() {
            let raw = encode_envelope(b"payload", 42);
            assert_eq!(raw.len(), ENVELOPE_HEADER_LEN + 7);
            let (deadline, payload) = decode_envelope("k", &raw).unwrap();
            assert_eq!(deadline, 42);
            assert_eq!(payload, b"payload");
            assert!(decode_envelope("k", b"short").is_err());
        }

        #[tokio::test]
        async fn test_surreal_get_set_delete() {
            let (store, _dir) = make_store();
            store.set("ns1", "k", b"v".to_vec()).await.unwrap();
            assert_eq!(store.get("ns1", "k").await.unwrap(), Some(b"v".to_vec()));
            assert!(store.delete("ns1", "k").await.unwrap());
            assert!(!store.delete("ns1", "k").await.unwrap());
            assert!(store.get("ns1", "k").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_surreal_ttl_expiry() {
            let (store, _dir) = make_store();
            store
                .set_with_ttl("ns", "k", b"v".to_vec(), Duration::from_millis(30))
                .await
                .unwrap();
            assert!(store.exists("ns", "k").await.unwrap());
            tokio::time::sleep(Duration::from_millis(80)).await;
            assert!(store.get("ns", "k").await.unwrap().is_none());
            assert!(store.list_entries("ns").await.unwrap().is_empty());
            assert!(!store.delete("ns", "k").await.unwrap());
        }

        #[tokio::test]
        async fn test_surreal_list_entries_and_purge() {
            let (store, _dir) = make_store();
            store.set("ns1", "a", b"1".to_vec()).await.unwrap();
            store
                .set_with_ttl("ns1", "b", b"2".to_vec(), Duration::from_millis(10))
                .await
                .unwrap();
            store.set("ns2", "c", b"3".to_vec()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(40)).await;

            let entries = store.list_entries("ns1").await.unwrap();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].key, "a");
            assert_eq!(entries[0].value, b"1".to_vec());

            assert_eq!(store.purge_expired("ns1").await.unwrap(), 1);
            assert_eq!(store.clear_namespace("ns1").await.unwrap(), 1);
            assert_eq!(store.list_keys("ns2").await.unwrap(), vec!["c"]);
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        async fn test_surreal_concurrent_delete_has_single_winner() {
            let dir = tempfile::tempdir().unwrap();
            let store = Arc::new(SurrealKvStore::open(dir.path()).unwrap());
            store
                .set_with_ttl("ns", "token", b"v".to_vec(), Duration::from_secs(60))
                .await
                .unwrap();

            let mut handles = Vec::new();
            for _ in 0..32 {
                let store = Arc::clone(&store);
                handles.push(tokio::spawn(async move {
                    store.delete("ns", "token").await.unwrap()
                }));
            }
            let mut winners = 0;
            for handle in handles {
                if handle.await.unwrap() {
                    winners += 1;
                }
            }
            assert_eq!(winners, 1);
            assert!(store.get("ns", "token").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_surreal_survives_reopen() {
            let dir = tempfile::tempdir().unwrap();
            {
                let store = SurrealKvStore::open(dir.path()).unwrap();
                store
                    .set_with_ttl("ns", "k", b"v".to_vec(), Duration::from_secs(60))
                    .await
                    .unwrap();
                store.close().await.unwrap();
            }
            let store = SurrealKvStore::open(dir.path()).unwrap();
            assert_eq!(store.get("ns", "k").await.unwrap(), Some(b"v".to_vec()));
        }
    }
}
