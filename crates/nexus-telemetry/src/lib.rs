//! Nexus Telemetry - logging and per-call tracing context.
//!
//! This crate provides:
//! - Configurable logging setup (pretty, compact, JSON, full; stderr,
//!   stdout or rolling files)
//! - [`RequestContext`] for correlating the log lines of one tool call
//!
//! # Example
//!
//! ```rust,no_run
//! use nexus_telemetry::{LogConfig, LogFormat, setup_logging, RequestContext};
//!
//! # fn main() -> Result<(), nexus_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("nexus_approval=debug");
//! setup_logging(&config)?;
//!
//! let ctx = RequestContext::new("rpc").with_operation("ban_suspicious_ip");
//! let span = ctx.span();
//! let _guard = span.enter();
//! tracing::info!("handling tool call");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod context;
mod error;
mod logging;

pub use context::RequestContext;
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging,
    setup_logging,
};
