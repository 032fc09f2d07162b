//! Bridge from `nexus_config::Config` to domain types.
//!
//! The config crate has no dependencies on other internal crates. This
//! module translates its plain sections into the store, provider, registry
//! and logging types the gateway is assembled from, so the conversion
//! happens exactly once.

use std::sync::Arc;

use nexus_approval::{ActionRegistry, ArgumentLimits, ToolName};
use nexus_config::Config;
use nexus_llm::{ClaudeProvider, LlmProvider, OpenAiCompatProvider, ProviderConfig};
use nexus_storage::{KvStore, MemoryKvStore, RedisKvStore, SurrealKvStore};
use nexus_telemetry::{LogConfig, LogFormat};
use nexus_tools::{EventLog, EventSource, RedisEventStream};
use tracing::info;

use crate::error::{GatewayError, GatewayResult};

/// Convert config to [`ProviderConfig`].
///
/// The API key already includes the env fallbacks applied by
/// [`Config::load`]. A missing key is passed through empty; hosted providers
/// report it on the first call.
#[must_use]
pub fn to_provider_config(cfg: &Config) -> ProviderConfig {
    let api_key = cfg.model.api_key.clone().unwrap_or_default();

    let mut provider = ProviderConfig::new(api_key, &cfg.model.model)
        .max_tokens(usize::try_from(cfg.model.max_tokens).unwrap_or(usize::MAX))
        .temperature(cfg.model.temperature)
        .timeout(cfg.model.timeout());

    if let Some(url) = &cfg.model.api_url {
        provider = provider.base_url(url);
    }
    provider
}

/// Build the configured model provider.
///
/// # Errors
///
/// Returns [`GatewayError::Config`] for an unknown provider, or
/// [`GatewayError::Llm`] if the HTTP client cannot be built.
pub fn build_provider(cfg: &Config) -> GatewayResult<Arc<dyn LlmProvider>> {
    let config = to_provider_config(cfg);
    let provider: Arc<dyn LlmProvider> = match cfg.model.provider.as_str() {
        "ollama" => Arc::new(OpenAiCompatProvider::ollama(config)?),
        "openai" => Arc::new(OpenAiCompatProvider::openai(config)?),
        "claude" => Arc::new(ClaudeProvider::new(config)?),
        other => {
            return Err(GatewayError::Config(format!(
                "unknown model provider '{other}'"
            )));
        },
    };
    Ok(provider)
}

/// Build the action registry from `[approval]` and `[events]`.
///
/// # Errors
///
/// Returns [`GatewayError::Config`] if `dangerous_tools` names an unknown
/// tool, or [`GatewayError::Approval`] if it names a meta tool.
pub fn to_registry(cfg: &Config) -> GatewayResult<ActionRegistry> {
    let dangerous = cfg
        .approval
        .dangerous_tools
        .iter()
        .map(|name| {
            name.parse::<ToolName>()
                .map_err(|e| GatewayError::Config(format!("approval.dangerous_tools: {e}")))
        })
        .collect::<GatewayResult<Vec<_>>>()?;

    Ok(ActionRegistry::new()
        .with_dangerous(dangerous)?
        .with_limits(ArgumentLimits {
            default_event_limit: cfg.events.default_limit,
            max_event_limit: cfg.events.max_limit,
        }))
}

/// Convert config to [`LogConfig`].
#[must_use]
pub fn to_log_config(cfg: &Config) -> LogConfig {
    let format = match cfg.logging.format.as_str() {
        "pretty" => LogFormat::Pretty,
        "json" => LogFormat::Json,
        "full" => LogFormat::Full,
        _ => LogFormat::Compact,
    };

    let mut log_config = LogConfig::new(&cfg.logging.level).with_format(format);
    for directive in &cfg.logging.directives {
        log_config = log_config.with_directive(directive);
    }
    log_config
}

/// The store and event source a gateway is assembled on.
pub struct Backend {
    /// Pending actions and the blocklist.
    pub store: Arc<dyn KvStore>,
    /// Where security events are read from and recorded to.
    pub events: Arc<dyn EventSource>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}

/// Open the configured store and event source.
///
/// - `surrealkv` (default): an on-disk store under `storage.data_path()`;
///   events go to a capped log in `events.namespace`
/// - `redis`: the store the rate limiter reads, so bans land on
///   `blacklist:{ip}`; events are read from the `events.stream_key` stream
/// - `memory`: both in process, for tests
///
/// # Errors
///
/// Returns [`GatewayError::Config`] for an unknown backend or a `surrealkv`
/// backend without a resolvable path, and [`GatewayError::Storage`] if the
/// database cannot be opened or the Redis URL is malformed.
pub fn open_backend(cfg: &Config) -> GatewayResult<Backend> {
    match cfg.storage.backend.as_str() {
        "memory" => {
            info!(
                backend = "memory",
                "using in-memory store; pending actions do not survive restarts"
            );
            event_log_backend(cfg, Arc::new(MemoryKvStore::new()))
        },
        "surrealkv" => {
            let path = cfg.storage.data_path().ok_or_else(|| {
                GatewayError::Config("storage.path is unset and no data directory is known".into())
            })?;
            // SurrealKV creates the leaf directory itself.
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            info!(backend = "surrealkv", path = %path.display(), "opening persistent store");
            event_log_backend(cfg, Arc::new(SurrealKvStore::open(&path)?))
        },
        "redis" => {
            let redis = Arc::new(RedisKvStore::open(&cfg.storage.redis_url)?);
            info!(
                backend = "redis",
                endpoint = %redis.endpoint(),
                stream = %cfg.events.stream_key,
                "using shared redis store"
            );
            let events = RedisEventStream::new(Arc::clone(&redis), &cfg.events.stream_key)
                .with_max_len(cfg.events.max_events);
            Ok(Backend {
                store: redis,
                events: Arc::new(events),
            })
        },
        other => Err(GatewayError::Config(format!(
            "unknown storage backend '{other}'"
        ))),
    }
}

fn event_log_backend(cfg: &Config, store: Arc<dyn KvStore>) -> GatewayResult<Backend> {
    let events = EventLog::new(Arc::clone(&store), &cfg.events.namespace)?
        .with_max_events(cfg.events.max_events);
    Ok(Backend {
        store,
        events: Arc::new(events),
    })
}
