//! Post-merge configuration validation.
//!
//! Checks that deserialized [`Config`](crate::Config) values are within
//! acceptable ranges and that cross-field invariants hold.

use std::net::SocketAddr;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Tools the gateway exposes.
const KNOWN_TOOLS: &[&str] = &[
    "check_system_health",
    "get_security_events",
    "analyze_attack_patterns",
    "ban_suspicious_ip",
    "approve_action",
    "list_pending_actions",
];

/// Tools that drive the interlock itself and can never require approval.
const META_TOOLS: &[&str] = &["approve_action", "list_pending_actions"];

/// Accepted token widths in bytes.
const TOKEN_BYTES_RANGE: std::ops::RangeInclusive<usize> = 4..=32;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_gateway(config)?;
    validate_approval(config)?;
    validate_storage(config)?;
    validate_services(config)?;
    validate_model(config)?;
    validate_events(config)?;
    validate_logging(config)?;
    Ok(())
}

fn validate_gateway(config: &Config) -> ConfigResult<()> {
    config
        .gateway
        .bind_addr
        .parse::<SocketAddr>()
        .map_err(|e| {
            ConfigError::invalid(
                "gateway.bind_addr",
                format!("'{}' is not a socket address: {e}", config.gateway.bind_addr),
            )
        })?;
    Ok(())
}

fn validate_approval(config: &Config) -> ConfigResult<()> {
    let a = &config.approval;

    if a.ttl_secs == 0 {
        return Err(ConfigError::invalid(
            "approval.ttl_secs",
            "ttl_secs must be greater than 0",
        ));
    }

    if !TOKEN_BYTES_RANGE.contains(&a.token_bytes) {
        return Err(ConfigError::invalid(
            "approval.token_bytes",
            format!(
                "token_bytes {} is out of range; must be between {} and {}",
                a.token_bytes,
                TOKEN_BYTES_RANGE.start(),
                TOKEN_BYTES_RANGE.end()
            ),
        ));
    }

    if a.namespace.trim().is_empty() {
        return Err(ConfigError::invalid(
            "approval.namespace",
            "namespace must not be empty",
        ));
    }

    for tool in &a.dangerous_tools {
        if !KNOWN_TOOLS.contains(&tool.as_str()) {
            return Err(ConfigError::invalid(
                "approval.dangerous_tools",
                format!(
                    "unknown tool '{tool}'; expected one of: {}",
                    KNOWN_TOOLS.join(", ")
                ),
            ));
        }
        if META_TOOLS.contains(&tool.as_str()) {
            return Err(ConfigError::invalid(
                "approval.dangerous_tools",
                format!("'{tool}' controls the approval flow and cannot require approval"),
            ));
        }
    }

    Ok(())
}

fn validate_storage(config: &Config) -> ConfigResult<()> {
    let s = &config.storage;

    if !matches!(s.backend.as_str(), "memory" | "surrealkv" | "redis") {
        return Err(ConfigError::invalid(
            "storage.backend",
            format!(
                "unsupported backend '{}'; expected one of: surrealkv, redis, memory",
                s.backend
            ),
        ));
    }

    if s.backend == "redis" {
        let parsed = url::Url::parse(&s.redis_url).map_err(|e| {
            ConfigError::invalid(
                "storage.redis_url",
                format!("'{}' is not a valid URL: {e}", s.redis_url),
            )
        })?;
        if !matches!(parsed.scheme(), "redis" | "rediss") {
            return Err(ConfigError::invalid(
                "storage.redis_url",
                format!("'{}' must use redis or rediss", s.redis_url),
            ));
        }
    }

    if s.path.as_deref().is_some_and(|p| p.trim().is_empty()) {
        return Err(ConfigError::invalid(
            "storage.path",
            "path must not be empty when set",
        ));
    }

    if s.timeout_secs == 0 {
        return Err(ConfigError::invalid(
            "storage.timeout_secs",
            "timeout_secs must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_services(config: &Config) -> ConfigResult<()> {
    let s = &config.services;
    validate_http_url("services.aegis_url", &s.aegis_url)?;
    validate_http_url("services.cryptex_url", &s.cryptex_url)?;

    if s.health_timeout_secs == 0 {
        return Err(ConfigError::invalid(
            "services.health_timeout_secs",
            "health_timeout_secs must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_model(config: &Config) -> ConfigResult<()> {
    let m = &config.model;

    if !matches!(m.provider.as_str(), "ollama" | "openai" | "claude") {
        return Err(ConfigError::invalid(
            "model.provider",
            format!(
                "unsupported provider '{}'; expected one of: ollama, openai, claude",
                m.provider
            ),
        ));
    }

    if m.model.trim().is_empty() {
        return Err(ConfigError::invalid("model.model", "model must not be empty"));
    }

    if let Some(api_url) = &m.api_url {
        validate_http_url("model.api_url", api_url)?;
    }

    if m.max_tokens == 0 {
        return Err(ConfigError::invalid(
            "model.max_tokens",
            "max_tokens must be greater than 0",
        ));
    }

    if !(0.0..=1.0).contains(&m.temperature) {
        return Err(ConfigError::invalid(
            "model.temperature",
            format!(
                "temperature {} is out of range; must be between 0.0 and 1.0",
                m.temperature
            ),
        ));
    }

    if m.timeout_secs == 0 {
        return Err(ConfigError::invalid(
            "model.timeout_secs",
            "timeout_secs must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_events(config: &Config) -> ConfigResult<()> {
    let e = &config.events;

    if e.max_limit == 0 {
        return Err(ConfigError::invalid(
            "events.max_limit",
            "max_limit must be greater than 0",
        ));
    }

    if e.default_limit == 0 || e.default_limit > e.max_limit {
        return Err(ConfigError::invalid(
            "events.default_limit",
            format!(
                "default_limit must be between 1 and max_limit ({})",
                e.max_limit
            ),
        ));
    }

    if e.namespace.trim().is_empty() {
        return Err(ConfigError::invalid(
            "events.namespace",
            "namespace must not be empty",
        ));
    }

    if e.max_events == 0 {
        return Err(ConfigError::invalid(
            "events.max_events",
            "max_events must be greater than 0",
        ));
    }

    if e.stream_key.trim().is_empty() {
        return Err(ConfigError::invalid(
            "events.stream_key",
            "stream_key must not be empty",
        ));
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;

    if !matches!(
        l.level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(ConfigError::invalid(
            "logging.level",
            format!(
                "unsupported level '{}'; expected one of: trace, debug, info, warn, error",
                l.level
            ),
        ));
    }

    if !matches!(l.format.as_str(), "pretty" | "compact" | "json" | "full") {
        return Err(ConfigError::invalid(
            "logging.format",
            format!(
                "unsupported format '{}'; expected one of: pretty, compact, json, full",
                l.format
            ),
        ));
    }

    Ok(())
}

fn validate_http_url(field: &str, raw: &str) -> ConfigResult<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ConfigError::invalid(field, format!("'{raw}' is not a valid URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            field,
            format!("'{raw}' must use http or https"),
        ));
    }
    Ok(())
}
