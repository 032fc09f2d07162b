//! Redis-backed key-value store (behind the `redis` feature).
//!
//! This is the store the Aegis rate limiter already reads, so a ban written
//! here is enforced at the edge without any extra plumbing. Keys are laid
//! out as `{namespace}:{key}`: the `blacklist` namespace yields exactly the
//! `blacklist:{ip}` keys the limiter checks.
//!
//! Expiry is native (`SET ... PX`), so values are stored raw and
//! [`KvStore::purge_expired`] has nothing to reclaim.
//!
//! The store also exposes the two stream commands the gateway needs to read
//! and append the `suspicious_traffic` stream Aegis publishes to.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::streams::StreamRangeReply;
use redis::{Client, RedisError};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::kv::{KvEntry, KvStore, validate_key, validate_namespace};

/// Keys fetched per `SCAN` round trip.
const SCAN_BATCH: usize = 500;

/// Reconnect attempts before an operation reports the backend unavailable.
const CONNECT_RETRIES: usize = 1;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// One entry read from a Redis stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Stream-assigned id, `{millis}-{seq}`.
    pub id: String,
    /// Field values, decoded as UTF-8 strings.
    pub fields: HashMap<String, String>,
}

/// Key-value store over a Redis server.
///
/// Construction only parses the URL. The connection is opened on first use
/// and re-established by the connection manager after a drop, so a Redis
/// outage surfaces as [`StorageError::Connection`] on the affected calls
/// rather than preventing the gateway from starting.
pub struct RedisKvStore {
    client: Client,
    conn: OnceCell<ConnectionManager>,
    endpoint: String,
}

impl std::fmt::Debug for RedisKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKvStore")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.conn.initialized())
            .finish_non_exhaustive()
    }
}

impl RedisKvStore {
    /// Prepare a store for `url` (`redis://[user:pass@]host:port[/db]`).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the URL cannot be parsed.
    pub fn open(url: &str) -> StorageResult<Self> {
        let client = Client::open(url)
            .map_err(|e| StorageError::Connection(format!("invalid redis url: {e}")))?;
        let endpoint = client.get_connection_info().addr.to_string();
        info!(endpoint = %endpoint, "redis store configured");
        Ok(Self {
            client,
            conn: OnceCell::new(),
            endpoint,
        })
    }

    /// Host and port this store talks to. Credentials are never included.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn connection(&self) -> StorageResult<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let config = ConnectionManagerConfig::new()
                    .set_number_of_retries(CONNECT_RETRIES)
                    .set_connection_timeout(CONNECT_TIMEOUT);
                let conn = ConnectionManager::new_with_config(self.client.clone(), config).await?;
                debug!(endpoint = %self.endpoint, "redis connection established");
                Ok::<_, RedisError>(conn)
            })
            .await
            .map_err(map_redis_error)?;
        Ok(conn.clone())
    }

    /// Up to `count` entries of `stream`, newest first (`XREVRANGE`).
    ///
    /// A missing stream reads as empty. Fields that are not valid UTF-8 are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if Redis is unreachable.
    pub async fn stream_rev_range(
        &self,
        stream: &str,
        count: usize,
    ) -> StorageResult<Vec<StreamEntry>> {
        validate_key(stream)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let reply: StreamRangeReply = redis::cmd("XREVRANGE")
            .arg(stream)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(reply
            .ids
            .into_iter()
            .map(|entry| {
                let fields = entry
                    .map
                    .keys()
                    .filter_map(|field| {
                        entry
                            .get::<String>(field)
                            .map(|value| (field.clone(), value))
                    })
                    .collect();
                StreamEntry {
                    id: entry.id,
                    fields,
                }
            })
            .collect())
    }

    /// Append `fields` to `stream` (`XADD`), trimming it to roughly
    /// `max_len` entries. Returns the assigned entry id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if Redis is unreachable.
    pub async fn stream_append(
        &self,
        stream: &str,
        fields: &[(&str, String)],
        max_len: usize,
    ) -> StorageResult<String> {
        validate_key(stream)?;
        if fields.is_empty() {
            return Err(StorageError::InvalidKey(
                "stream entry needs at least one field".into(),
            ));
        }
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream).arg("MAXLEN").arg("~").arg(max_len).arg("*");
        for (field, value) in fields {
            cmd.arg(*field).arg(value);
        }

        let mut conn = self.connection().await?;
        let id: String = cmd.query_async(&mut conn).await.map_err(map_redis_error)?;
        Ok(id)
    }

    async fn scan_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        let pattern = format!("{}:*", escape_glob(namespace));
        let mut conn = self.connection().await?;
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once.
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let full = full_key(namespace, key)?;
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(&full)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(value)
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let full = full_key(namespace, key)?;
        let mut conn = self.connection().await?;
        let () = redis::cmd("SET")
            .arg(&full)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn set_with_ttl(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> StorageResult<()> {
        let full = full_key(namespace, key)?;
        let mut conn = self.connection().await?;
        let () = redis::cmd("SET")
            .arg(&full)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        let full = full_key(namespace, key)?;
        let mut conn = self.connection().await?;
        // Redis executes commands one at a time: of several concurrent DELs
        // on a live key exactly one sees a count of 1.
        let removed: u64 = redis::cmd("DEL")
            .arg(&full)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(removed > 0)
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        let full = full_key(namespace, key)?;
        let mut conn = self.connection().await?;
        let found: u64 = redis::cmd("EXISTS")
            .arg(&full)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(found > 0)
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        validate_namespace(namespace)?;
        let prefix = key_prefix(namespace);
        Ok(self
            .scan_keys(namespace)
            .await?
            .into_iter()
            .filter_map(|full| full.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    async fn list_entries(&self, namespace: &str) -> StorageResult<Vec<KvEntry>> {
        validate_namespace(namespace)?;
        let full_keys = self.scan_keys(namespace).await?;
        if full_keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection().await?;
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(&full_keys)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        let prefix = key_prefix(namespace);
        Ok(full_keys
            .iter()
            .zip(values)
            // A key that expired between SCAN and MGET reads as nil.
            .filter_map(|(full, value)| {
                let key = full.strip_prefix(&prefix)?;
                Some(KvEntry {
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                    value: value?,
                })
            })
            .collect())
    }

    async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64> {
        validate_namespace(namespace)?;
        let full_keys = self.scan_keys(namespace).await?;
        let mut conn = self.connection().await?;
        let mut removed: u64 = 0;
        for chunk in full_keys.chunks(SCAN_BATCH) {
            let n: u64 = redis::cmd("DEL")
                .arg(chunk)
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;
            removed = removed.saturating_add(n);
        }
        Ok(removed)
    }

    async fn purge_expired(&self, namespace: &str) -> StorageResult<u64> {
        validate_namespace(namespace)?;
        Ok(0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn key_prefix(namespace: &str) -> String {
    format!("{namespace}:")
}

fn full_key(namespace: &str, key: &str) -> StorageResult<String> {
    validate_namespace(namespace)?;
    validate_key(key)?;
    Ok(format!("{namespace}:{key}"))
}

/// `PX` rejects zero, so sub-millisecond TTLs round up to 1ms.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Escape `SCAN MATCH` metacharacters so a namespace matches literally.
fn escape_glob(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn map_redis_error(err: RedisError) -> StorageError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        StorageError::Connection(err.to_string())
    } else {
        StorageError::Internal(err.to_string())
    }
}
