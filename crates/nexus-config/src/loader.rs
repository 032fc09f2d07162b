//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge `<config dir>/nexus/config.toml` (user)
//! 3. Merge the explicit file (`--config` or `NEXUS_CONFIG`)
//! 4. Apply env var fallbacks for fields no file set
//! 5. Resolve `${VAR}` references
//! 6. Deserialize merged tree → `Config`
//! 7. Validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars, resolve_env_references};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::show::ResolvedConfig;
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Env var naming an explicit config file.
pub const CONFIG_PATH_VAR: &str = "NEXUS_CONFIG";

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Load the configuration with layered file precedence.
///
/// `explicit` is the `--config` argument; when `None`, `NEXUS_CONFIG` is
/// consulted. An explicit file must exist, while a missing user config is
/// skipped.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, or if the
/// final merged configuration fails validation.
pub fn load(explicit: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    let user_path = directories::ProjectDirs::from("", "", "nexus")
        .map(|dirs| dirs.config_dir().join("config.toml"));
    load_with(user_path.as_deref(), explicit, &collect_env_vars())
}

/// Load with an explicit user config path and environment.
///
/// [`load`] delegates here; tests call it directly to stay independent of
/// the host machine.
///
/// # Errors
///
/// See [`load`].
pub fn load_with<S: ::std::hash::BuildHasher>(
    user_path: Option<&Path>,
    explicit: Option<&Path>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<ResolvedConfig> {
    // 1. Embedded defaults.
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);

    // 2. User config.
    if let Some(path) = user_path
        && let Some(overlay) = try_load_file(path)?
    {
        deep_merge_tracking(
            &mut merged,
            &overlay,
            "",
            &ConfigLayer::User,
            &mut field_sources,
        );
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "loaded user config");
    }

    // 3. Explicit file.
    let explicit = explicit
        .map(Path::to_path_buf)
        .or_else(|| env_vars.get(CONFIG_PATH_VAR).map(PathBuf::from));
    if let Some(path) = explicit {
        let overlay = try_load_file(&path)?.ok_or_else(|| ConfigError::ReadError {
            path: path.display().to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        deep_merge_tracking(
            &mut merged,
            &overlay,
            "",
            &ConfigLayer::File,
            &mut field_sources,
        );
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "loaded config file");
    }

    // 4. Env var fallbacks.
    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    // 5-6. Resolve ${VAR} references, then deserialize.
    resolve_env_references(&mut merged, env_vars);
    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    // 7. Validate.
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Try to load a file, returning `None` if the file doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len(),
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}
