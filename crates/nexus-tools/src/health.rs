//! Upstream health polling.
//!
//! Aegis and Cryptex are Spring services exposing `/actuator/health`. A probe
//! that answers 200 contributes its body verbatim; anything else is reported
//! as `DOWN` with a short reason. Nexus reports itself `UP`, since the probe
//! is running.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::ToolResult;

/// Default per-probe timeout.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

const HEALTH_PATH: &str = "/actuator/health";

/// Aggregated health of the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    /// Aegis actuator body, or a `DOWN` record.
    pub aegis: Value,
    /// Cryptex actuator body, or a `DOWN` record.
    pub cryptex: Value,
    /// This gateway.
    pub nexus: Value,
}

impl SystemHealth {
    /// Whether every component reports `UP`.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        [&self.aegis, &self.cryptex, &self.nexus]
            .into_iter()
            .all(|c| c.get("status").and_then(Value::as_str) == Some("UP"))
    }
}

/// Polls the upstream services.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    client: Client,
    aegis_url: String,
    cryptex_url: String,
    timeout: Duration,
}

impl HealthMonitor {
    /// Create a monitor for the given service base URLs.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        aegis_url: impl Into<String>,
        cryptex_url: impl Into<String>,
        timeout: Duration,
    ) -> ToolResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            aegis_url: aegis_url.into(),
            cryptex_url: cryptex_url.into(),
            timeout,
        })
    }

    /// Probe Aegis and Cryptex concurrently.
    pub async fn system_health(&self) -> SystemHealth {
        let (aegis, cryptex) = tokio::join!(
            self.probe("aegis", &self.aegis_url),
            self.probe("cryptex", &self.cryptex_url),
        );
        SystemHealth {
            aegis,
            cryptex,
            nexus: json!({ "status": "UP" }),
        }
    }

    /// Probe one service. Never fails; failures become `DOWN` records.
    pub async fn probe(&self, service: &str, base_url: &str) -> Value {
        let url = format!("{}{HEALTH_PATH}", base_url.trim_end_matches('/'));
        let started = Instant::now();

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("timed out after {}s", self.timeout.as_secs())
                } else {
                    e.to_string()
                };
                warn!(service, url = %url, error = %reason, "health check failed");
                return down(reason);
            },
        };

        let status = response.status();
        if status.as_u16() != 200 {
            warn!(service, url = %url, status = status.as_u16(), "health check returned non-200");
            return down(format!("HTTP {}", status.as_u16()));
        }

        match response.json::<Value>().await {
            Ok(body) => {
                debug!(
                    service,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "health check ok"
                );
                body
            },
            Err(e) => {
                warn!(service, url = %url, error = %e, "health check returned invalid JSON");
                down(format!("invalid health payload: {e}"))
            },
        }
    }
}

fn down(reason: impl Into<String>) -> Value {
    json!({ "status": "DOWN", "error": reason.into() })
}
