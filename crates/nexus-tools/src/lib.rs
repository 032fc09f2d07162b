//! Nexus Tools - the concrete operations behind the approval interlock.
//!
//! - [`HealthMonitor`]: polls Aegis and Cryptex `/actuator/health`
//! - [`EventLog`]: suspicious-traffic events, newest first
//! - `RedisEventStream` (feature `redis`): the same events read from the
//!   rate limiter's `suspicious_traffic` stream
//! - [`Blocklist`]: time-limited IP bans read by the rate limiter
//! - [`AttackAnalyzer`]: LLM briefing over recent events
//! - [`ToolExecutor`]: the [`ActionExecutor`](nexus_approval::ActionExecutor)
//!   that ties them together

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod analysis;
pub mod blocklist;
pub mod error;
pub mod events;
pub mod executor;
pub mod health;
#[cfg(feature = "redis")]
pub mod stream;

pub use analysis::{AttackAnalyzer, NO_EVENTS_MESSAGE};
pub use blocklist::{BLOCKLIST_NAMESPACE, Blocklist};
pub use error::{ToolError, ToolResult};
pub use events::{
    DEFAULT_EVENTS_NAMESPACE, DEFAULT_MAX_EVENTS, EventLog, EventSource, NewSecurityEvent,
    SecurityEvent,
};
pub use executor::ToolExecutor;
pub use health::{DEFAULT_HEALTH_TIMEOUT, HealthMonitor, SystemHealth};
#[cfg(feature = "redis")]
pub use stream::{DEFAULT_TRAFFIC_STREAM, RedisEventStream};
