//! Typed operator actions.
//!
//! [`ToolName`] is the closed set of operations the gateway exposes.
//! [`Action`] is a fully validated, executable request: the registry turns a
//! raw argument map into one, so executors never see unparsed JSON.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every operation the gateway knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Probe upstream services.
    CheckSystemHealth,
    /// Read recent suspicious-traffic events.
    GetSecurityEvents,
    /// Summarize recent events with the language model.
    AnalyzeAttackPatterns,
    /// Add an address to the blocklist.
    BanSuspiciousIp,
    /// Consume a pending-action token.
    ApproveAction,
    /// Show actions waiting for approval.
    ListPendingActions,
}

impl ToolName {
    /// All tools, in listing order.
    pub const ALL: [Self; 6] = [
        Self::CheckSystemHealth,
        Self::GetSecurityEvents,
        Self::AnalyzeAttackPatterns,
        Self::BanSuspiciousIp,
        Self::ApproveAction,
        Self::ListPendingActions,
    ];

    /// Wire name of the tool.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CheckSystemHealth => "check_system_health",
            Self::GetSecurityEvents => "get_security_events",
            Self::AnalyzeAttackPatterns => "analyze_attack_patterns",
            Self::BanSuspiciousIp => "ban_suspicious_ip",
            Self::ApproveAction => "approve_action",
            Self::ListPendingActions => "list_pending_actions",
        }
    }

    /// Meta tools drive the interlock itself and can never be deferred.
    #[must_use]
    pub fn is_meta(self) -> bool {
        matches!(self, Self::ApproveAction | Self::ListPendingActions)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known tool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tool: {0}")]
pub struct UnknownToolName(pub String);

impl FromStr for ToolName {
    type Err = UnknownToolName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| UnknownToolName(s.to_string()))
    }
}

/// A validated, executable action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "tool")]
pub enum Action {
    /// Probe Aegis and Cryptex.
    CheckSystemHealth,
    /// Read up to `limit` most recent events.
    GetSecurityEvents {
        /// Maximum number of events.
        limit: u32,
    },
    /// Analyze up to `limit` most recent events.
    AnalyzeAttackPatterns {
        /// Maximum number of events fed to the model.
        limit: u32,
    },
    /// Ban `ip` for `hours` hours.
    BanSuspiciousIp {
        /// Address to ban.
        ip: IpAddr,
        /// Ban duration in hours.
        hours: u32,
    },
}

impl Action {
    /// The tool this action belongs to.
    #[must_use]
    pub fn tool(&self) -> ToolName {
        match self {
            Self::CheckSystemHealth => ToolName::CheckSystemHealth,
            Self::GetSecurityEvents { .. } => ToolName::GetSecurityEvents,
            Self::AnalyzeAttackPatterns { .. } => ToolName::AnalyzeAttackPatterns,
            Self::BanSuspiciousIp { .. } => ToolName::BanSuspiciousIp,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CheckSystemHealth => write!(f, "check system health"),
            Self::GetSecurityEvents { limit } => write!(f, "get last {limit} security events"),
            Self::AnalyzeAttackPatterns { limit } => {
                write!(f, "analyze last {limit} security events")
            },
            Self::BanSuspiciousIp { ip, hours } => write!(f, "ban {ip} for {hours}h"),
        }
    }
}
