//! Nexus Storage - key-value persistence for the operator gateway.
//!
//! Pending approvals, the suspicious-traffic event log and the IP blocklist
//! all live in a [`KvStore`]. Every value may carry an expiry; expired
//! entries are invisible to reads, deletes and listings as soon as their
//! deadline passes, whether or not they have been physically removed yet.
//!
//! # Backends
//!
//! | Backend | Feature | Durability |
//! |---------|---------|------------|
//! | [`MemoryKvStore`] | always | process lifetime (tests, dev) |
//! | `SurrealKvStore` | `kv` | on disk, survives restarts |
//! | `RedisKvStore` | `redis` | shared with the rate limiter |
//!
//! # Atomicity
//!
//! Each single-key operation is atomic. [`KvStore::delete`] reports whether
//! it removed a live key, which lets callers use it as a consume-once
//! primitive. There are no multi-key transactions in the trait.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod kv;
#[cfg(feature = "redis")]
pub mod redis_kv;

pub use error::{StorageError, StorageResult};
pub use kv::{KvEntry, KvStore, MemoryKvStore, ScopedKvStore};

#[cfg(feature = "kv")]
pub use kv::SurrealKvStore;
#[cfg(feature = "redis")]
pub use redis_kv::{RedisKvStore, StreamEntry};
