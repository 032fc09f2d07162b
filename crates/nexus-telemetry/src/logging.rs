//! Logging configuration and setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{TelemetryError, TelemetryResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// File rotation strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    /// Rotate daily.
    #[default]
    Daily,
    /// Rotate hourly.
    Hourly,
    /// Never rotate.
    Never,
}

impl From<FileRotation> for Rotation {
    fn from(rotation: FileRotation) -> Self {
        match rotation {
            FileRotation::Daily => Rotation::DAILY,
            FileRotation::Hourly => Rotation::HOURLY,
            FileRotation::Never => Rotation::NEVER,
        }
    }
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line format.
    Pretty,
    /// Compact single-line format (default).
    #[default]
    Compact,
    /// JSON lines for log shippers.
    Json,
    /// The default `tracing-subscriber` format with all fields.
    Full,
}

/// Log output target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Log to stdout.
    Stdout,
    /// Log to stderr.
    #[default]
    Stderr,
    /// Log to rolling files in a directory.
    File(PathBuf),
}

/// Rolling-file settings, used when the target is [`LogTarget::File`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLogConfig {
    /// File name prefix (`nexus` produces `nexus.2026-10-19`).
    #[serde(default = "default_file_prefix")]
    pub prefix: String,
    /// Rotation strategy.
    #[serde(default)]
    pub rotation: FileRotation,
}

fn default_file_prefix() -> String {
    "nexus".to_string()
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            prefix: default_file_prefix(),
            rotation: FileRotation::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Base level filter (e.g. `info`, `debug`).
    #[serde(default = "default_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Output target.
    #[serde(default)]
    pub target: LogTarget,
    /// Rolling-file settings.
    #[serde(default)]
    pub file: FileLogConfig,
    /// Include timestamps.
    #[serde(default = "default_true")]
    pub timestamps: bool,
    /// Include file and line of the call site.
    #[serde(default)]
    pub file_info: bool,
    /// Use ANSI colors.
    #[serde(default = "default_true")]
    pub ansi: bool,
    /// Per-target overrides such as `nexus_approval=debug`.
    #[serde(default)]
    pub directives: Vec<String>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            file: FileLogConfig::default(),
            timestamps: true,
            file_info: false,
            ansi: true,
            directives: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Create a new log config with the specified level.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    /// Set the log format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the log target.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Log to rolling files in `directory`.
    #[must_use]
    pub fn with_file_logging(
        mut self,
        directory: impl Into<PathBuf>,
        rotation: FileRotation,
    ) -> Self {
        self.target = LogTarget::File(directory.into());
        self.file.rotation = rotation;
        self.ansi = false;
        self
    }

    /// Add a directive override.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Disable timestamps.
    #[must_use]
    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    /// Disable ANSI colors.
    #[must_use]
    pub fn without_ansi(mut self) -> Self {
        self.ansi = false;
        self
    }

    /// Build the env filter from config.
    fn build_filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| TelemetryError::ConfigError(e.to_string()))?;

        for directive in &self.directives {
            filter = filter.add_directive(directive.parse().map_err(
                |e: tracing_subscriber::filter::ParseError| {
                    TelemetryError::ConfigError(format!("invalid directive '{directive}': {e}"))
                },
            )?);
        }

        Ok(filter)
    }

    /// Build the formatting layer for `writer`.
    fn format_layer<W>(&self, writer: W) -> BoxedLayer
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let base = fmt::layer()
            .with_writer(writer)
            .with_ansi(self.ansi)
            .with_file(self.file_info)
            .with_line_number(self.file_info);

        match (self.format, self.timestamps) {
            (LogFormat::Json, true) => base.json().boxed(),
            (LogFormat::Json, false) => base.json().without_time().boxed(),
            (LogFormat::Pretty, true) => base.pretty().boxed(),
            (LogFormat::Pretty, false) => base.pretty().without_time().boxed(),
            (LogFormat::Compact, true) => base.compact().boxed(),
            (LogFormat::Compact, false) => base.compact().without_time().boxed(),
            (LogFormat::Full, true) => base.boxed(),
            (LogFormat::Full, false) => base.without_time().boxed(),
        }
    }
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns an error if the filter is invalid, the log directory cannot be
/// created, or a global subscriber is already installed.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.build_filter()?;

    let layer = match &config.target {
        LogTarget::Stdout => config.format_layer(std::io::stdout),
        LogTarget::Stderr => config.format_layer(std::io::stderr),
        LogTarget::File(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender =
                RollingFileAppender::new(config.file.rotation.into(), dir, &config.file.prefix);
            config.format_layer(appender)
        },
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| TelemetryError::InitError(e.to_string()))
}

/// Set up default logging (info level, stderr, compact format).
///
/// # Errors
///
/// Returns an error if logging cannot be initialized.
pub fn setup_default_logging() -> TelemetryResult<()> {
    setup_logging(&LogConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.target, LogTarget::Stderr);
        assert!(config.timestamps);
    }

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new("debug")
            .with_format(LogFormat::Json)
            .without_timestamps()
            .with_directive("nexus_approval=trace");

        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.timestamps);
        assert_eq!(config.directives, vec!["nexus_approval=trace"]);
    }

    #[test]
    fn test_file_logging_disables_ansi() {
        let config = LogConfig::default().with_file_logging("/var/log/nexus", FileRotation::Hourly);
        assert_eq!(config.target, LogTarget::File("/var/log/nexus".into()));
        assert_eq!(config.file.rotation, FileRotation::Hourly);
        assert!(!config.ansi);
    }

    #[test]
    fn test_log_config_deserializes_partial() {
        let parsed: LogConfig =
            serde_json::from_str(r#"{"level":"warn","format":"json"}"#).unwrap();
        assert_eq!(parsed.level, "warn");
        assert_eq!(parsed.format, LogFormat::Json);
        assert!(parsed.ansi);
        assert_eq!(parsed.file.prefix, "nexus");
    }

    #[test]
    fn test_build_filter() {
        let config = LogConfig::new("debug").with_directive("nexus_gateway=trace");
        assert!(config.build_filter().is_ok());
    }

    #[test]
    fn test_build_filter_invalid() {
        let config = LogConfig::new("debug").with_directive("[invalid=syntax");
        assert!(matches!(
            config.build_filter(),
            Err(TelemetryError::ConfigError(_))
        ));
    }

    #[test]
    fn test_every_format_builds_a_layer() {
        for format in [
            LogFormat::Pretty,
            LogFormat::Compact,
            LogFormat::Json,
            LogFormat::Full,
        ] {
            let config = LogConfig::default().with_format(format);
            let _layer = config.format_layer(std::io::sink);
            let _layer = config.without_timestamps().format_layer(std::io::sink);
        }
    }
}
