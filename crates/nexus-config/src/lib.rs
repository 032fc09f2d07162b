//! Layered configuration for the Nexus gateway.
//!
//! # Usage
//!
//! ```rust,no_run
//! use nexus_config::Config;
//!
//! let resolved = Config::load(None).unwrap();
//! println!("binding to {}", resolved.config.gateway.bind_addr);
//! ```
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Explicit file** (`--config` or `NEXUS_CONFIG`)
//! 2. **User** (`<config dir>/nexus/config.toml`)
//! 3. **Environment variables** (`NEXUS_*`, `OPENAI_API_KEY`,
//!    `ANTHROPIC_API_KEY`), fallback only
//! 4. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! String values may reference the environment as `${VAR}`.
//!
//! This crate has no dependencies on other Nexus crates; the gateway converts
//! config sections into domain types at startup.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Environment variable fallback resolution.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Layered configuration merging.
pub mod merge;
/// Resolved configuration display.
pub mod show;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use merge::ConfigLayer;
pub use show::{ResolvedConfig, ShowFormat};
pub use types::*;

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// See [`loader::load`] for the algorithm.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the final
    /// configuration fails validation.
    pub fn load(explicit: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(explicit)
    }

    /// Validate this configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::ValidationError`] found.
    pub fn validate(&self) -> ConfigResult<()> {
        validate::validate(self)
    }
}
