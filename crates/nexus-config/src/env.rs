//! Environment variable fallback and `${VAR}` reference resolution.
//!
//! Environment variables are a **fallback**: they only fill fields that no
//! config file set. A value that came from the embedded defaults still counts
//! as unset.

use std::collections::HashMap;
use std::fmt::Write as _;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources};

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
}

/// Supported `NEXUS_*` variables plus the provider SDK key variables.
///
/// Earlier entries win when two variables target the same field.
const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "NEXUS_BIND_ADDR",
        field_path: "gateway.bind_addr",
    },
    EnvMapping {
        var_name: "NEXUS_APPROVAL_TTL_SECS",
        field_path: "approval.ttl_secs",
    },
    EnvMapping {
        var_name: "NEXUS_TOKEN_BYTES",
        field_path: "approval.token_bytes",
    },
    EnvMapping {
        var_name: "NEXUS_STORAGE_BACKEND",
        field_path: "storage.backend",
    },
    EnvMapping {
        var_name: "NEXUS_STORAGE_PATH",
        field_path: "storage.path",
    },
    EnvMapping {
        var_name: "NEXUS_REDIS_URL",
        field_path: "storage.redis_url",
    },
    EnvMapping {
        var_name: "NEXUS_AEGIS_URL",
        field_path: "services.aegis_url",
    },
    EnvMapping {
        var_name: "NEXUS_CRYPTEX_URL",
        field_path: "services.cryptex_url",
    },
    EnvMapping {
        var_name: "NEXUS_MODEL_PROVIDER",
        field_path: "model.provider",
    },
    EnvMapping {
        var_name: "NEXUS_MODEL",
        field_path: "model.model",
    },
    EnvMapping {
        var_name: "NEXUS_MODEL_API_KEY",
        field_path: "model.api_key",
    },
    EnvMapping {
        var_name: "NEXUS_MODEL_API_URL",
        field_path: "model.api_url",
    },
    EnvMapping {
        var_name: "NEXUS_MODEL_TIMEOUT_SECS",
        field_path: "model.timeout_secs",
    },
    EnvMapping {
        var_name: "NEXUS_LOG_LEVEL",
        field_path: "logging.level",
    },
    // Standard provider SDK env vars.
    EnvMapping {
        var_name: "OPENAI_API_KEY",
        field_path: "model.api_key",
    },
    EnvMapping {
        var_name: "ANTHROPIC_API_KEY",
        field_path: "model.api_key",
    },
];

/// Apply environment variable fallbacks to fields that were **not** set by
/// any config file layer.
///
/// Returns the number of env vars applied.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        let already_set = sources
            .get(mapping.field_path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults);
        if already_set {
            continue;
        }

        if let Some(val) = env_vars.get(mapping.var_name) {
            debug!(
                var = mapping.var_name,
                field = mapping.field_path,
                "applying env var fallback"
            );

            set_field_from_string(merged, mapping.field_path, val);
            sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
            count = count.saturating_add(1);
        }
    }

    count
}

/// Resolve `${VAR}` references within string values in the config tree.
///
/// References that don't resolve are left as-is.
pub fn resolve_env_references<S: ::std::hash::BuildHasher>(
    val: &mut toml::Value,
    env_vars: &HashMap<String, String, S>,
) {
    match val {
        toml::Value::String(s) => {
            *s = resolve_string_refs(s, env_vars);
        },
        toml::Value::Table(table) => {
            for (_, child) in table.iter_mut() {
                resolve_env_references(child, env_vars);
            }
        },
        toml::Value::Array(arr) => {
            for child in arr.iter_mut() {
                resolve_env_references(child, env_vars);
            }
        },
        _ => {},
    }
}

/// Replace `${VAR}` references in a string with their env var values.
fn resolve_string_refs<S: ::std::hash::BuildHasher>(
    input: &str,
    env_vars: &HashMap<String, String, S>,
) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }
        chars.next();

        let mut var_name = String::new();
        let mut closed = false;
        for ch in chars.by_ref() {
            if ch == '}' {
                closed = true;
                break;
            }
            var_name.push(ch);
        }

        if closed && !var_name.is_empty() {
            if let Some(val) = env_vars.get(&var_name) {
                result.push_str(val);
            } else {
                debug!(var = var_name, "unresolved env var reference in config");
                let _ = write!(result, "${{{var_name}}}");
            }
        } else {
            // Malformed reference.
            result.push_str("${");
            result.push_str(&var_name);
        }
    }

    result
}

/// Set a field in the TOML tree from a string value, creating intermediate
/// tables as needed.
fn set_field_from_string(root: &mut toml::Value, path: &str, val: &str) {
    let toml_val = coerce_to_toml_value(path, val);

    let Some((parents, leaf)) = path.rsplit_once('.') else {
        if let Some(table) = root.as_table_mut() {
            table.insert(path.to_owned(), toml_val);
        }
        return;
    };

    let mut current = root;
    for segment in parents.split('.') {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment.to_owned())
            .or_insert(toml::Value::Table(toml::map::Map::new()));
    }

    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), toml_val);
    }
}

/// Coerce a string env var value to the TOML type of the target field.
///
/// Values that fail to parse stay strings and are rejected later with a
/// precise deserialization error.
fn coerce_to_toml_value(path: &str, val: &str) -> toml::Value {
    if matches!(path, "model.temperature")
        && let Ok(f) = val.parse::<f64>()
    {
        return toml::Value::Float(f);
    }

    if matches!(
        path,
        "approval.ttl_secs"
            | "approval.token_bytes"
            | "storage.timeout_secs"
            | "services.health_timeout_secs"
            | "model.max_tokens"
            | "model.timeout_secs"
            | "events.default_limit"
            | "events.max_limit"
    ) && let Ok(i) = val.trim().parse::<i64>()
    {
        return toml::Value::Integer(i);
    }

    toml::Value::String(val.to_owned())
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}
