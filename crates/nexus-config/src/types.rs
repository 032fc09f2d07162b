//! Configuration types for the Nexus gateway.
//!
//! Every struct implements [`Default`] with the same values as the embedded
//! `defaults.toml`, so a bare `[section]` header in a config file produces a
//! working section.

use std::path::PathBuf;
use std::time::Duration;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration for the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RPC listener settings.
    pub gateway: GatewaySection,
    /// Approval interlock settings.
    pub approval: ApprovalSection,
    /// Key-value store backend.
    pub storage: StorageSection,
    /// Upstream Aegis and Cryptex services.
    pub services: ServicesSection,
    /// Language model used for attack analysis.
    pub model: ModelConfig,
    /// Security event log.
    pub events: EventsSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// GatewaySection
// ---------------------------------------------------------------------------

/// RPC listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Socket address the JSON-RPC server binds to.
    pub bind_addr: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8082".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// ApprovalSection
// ---------------------------------------------------------------------------

/// Approval interlock settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalSection {
    /// Lifetime of a pending action, in seconds.
    pub ttl_secs: u64,
    /// Random bytes per approval token (rendered as twice as many hex chars).
    pub token_bytes: usize,
    /// Store namespace holding pending actions.
    pub namespace: String,
    /// Tools that require human approval before they run.
    pub dangerous_tools: Vec<String>,
}

impl ApprovalSection {
    /// Pending-action lifetime as a [`Duration`].
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for ApprovalSection {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            token_bytes: 8,
            namespace: "nexus:approval".to_owned(),
            dangerous_tools: vec!["ban_suspicious_ip".to_owned()],
        }
    }
}

// ---------------------------------------------------------------------------
// StorageSection
// ---------------------------------------------------------------------------

/// Key-value store backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// `surrealkv` (persistent, the default), `redis` (shared with Aegis),
    /// or `memory` (lost on restart, for tests).
    pub backend: String,
    /// Data directory for the `surrealkv` backend. Falls back to the
    /// platform data directory when unset.
    pub path: Option<String>,
    /// Connection URL for the `redis` backend.
    pub redis_url: String,
    /// Upper bound on a single store operation, in seconds.
    pub timeout_secs: u64,
}

impl StorageSection {
    /// Store operation timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Directory for the persistent backend.
    ///
    /// Returns the configured `path`, or `<data dir>/nexus/store` when unset.
    /// `None` only if no path is configured and the platform has no data
    /// directory.
    #[must_use]
    pub fn data_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.path {
            return Some(PathBuf::from(path));
        }
        directories::ProjectDirs::from("", "", "nexus").map(|d| d.data_dir().join("store"))
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: "surrealkv".to_owned(),
            path: None,
            redis_url: "redis://127.0.0.1:6379".to_owned(),
            timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// ServicesSection
// ---------------------------------------------------------------------------

/// Upstream services polled by the health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesSection {
    /// Base URL of the Aegis gateway.
    pub aegis_url: String,
    /// Base URL of the Cryptex vault.
    pub cryptex_url: String,
    /// Per-probe timeout, in seconds.
    pub health_timeout_secs: u64,
}

impl ServicesSection {
    /// Per-probe timeout as a [`Duration`].
    #[must_use]
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

impl Default for ServicesSection {
    fn default() -> Self {
        Self {
            aegis_url: "http://localhost:8080".to_owned(),
            cryptex_url: "http://localhost:8081".to_owned(),
            health_timeout_secs: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// ModelConfig
// ---------------------------------------------------------------------------

/// Language model provider and endpoint.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Provider identifier: `ollama`, `openai` or `claude`.
    pub provider: String,
    /// Model name sent to the provider API.
    pub model: String,
    /// API key. Prefer environment variables over storing this in a file.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL for the provider API (overrides the default endpoint).
    pub api_url: Option<String>,
    /// Maximum tokens to request per completion.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Upper bound on one completion request, in seconds.
    pub timeout_secs: u64,
}

impl ModelConfig {
    /// Completion timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .field("api_url", &self.api_url)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Serialize for ModelConfig {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ModelConfig", 6)?;
        state.serialize_field("provider", &self.provider)?;
        state.serialize_field("model", &self.model)?;
        // api_key is omitted.
        state.serialize_field("api_url", &self.api_url)?;
        state.serialize_field("max_tokens", &self.max_tokens)?;
        state.serialize_field("temperature", &self.temperature)?;
        state.serialize_field("timeout_secs", &self.timeout_secs)?;
        state.end()
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_owned(),
            model: "llama3".to_owned(),
            api_key: None,
            api_url: Some("http://host.docker.internal:11434".to_owned()),
            max_tokens: 1024,
            temperature: 0.2,
            timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// EventsSection
// ---------------------------------------------------------------------------

/// Security event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsSection {
    /// Events returned when a caller omits `limit`.
    pub default_limit: u32,
    /// Largest `limit` a caller may request.
    pub max_limit: u32,
    /// Store namespace holding recorded events.
    pub namespace: String,
    /// Events retained in the store namespace before the oldest are trimmed.
    pub max_events: usize,
    /// Redis stream Aegis appends suspicious traffic to. Read only by the
    /// `redis` backend.
    pub stream_key: String,
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
            namespace: "nexus:events".to_owned(),
            max_events: 10_000,
            stream_key: "suspicious_traffic".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Base level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Output format (`pretty`, `compact`, `json`, `full`).
    pub format: String,
    /// Per-target overrides such as `nexus_approval=debug`.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
