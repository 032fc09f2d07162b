//! Action registry: classification, descriptions and argument validation.
//!
//! The registry is built once at startup and never changes afterwards.
//!
//! # Submission Check Order
//!
//! 1. Does the name resolve to a [`ToolName`]? Otherwise `UnknownOperation`
//! 2. Is `arguments` a JSON object (or null)? Otherwise `Validation`
//! 3. Does each [`ArgumentRule`] pass, in order? Otherwise `Validation`
//! 4. Is the tool in the dangerous set? -> defer behind a token
//! 5. Otherwise -> execute immediately

use std::collections::BTreeSet;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::action::{Action, ToolName};
use crate::error::{ApprovalError, ApprovalResult};

/// Longest accepted ban, one year.
pub const MAX_BAN_HOURS: u64 = 8760;
/// Ban duration when `hours` is omitted.
pub const DEFAULT_BAN_HOURS: u32 = 1;

/// Whether a tool runs immediately or waits for approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Executes on submit.
    Safe,
    /// Deferred behind an approval token.
    Dangerous,
}

/// Numeric bounds used by the `limit` validator and default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgumentLimits {
    /// `limit` used when the caller omits it.
    pub default_event_limit: u32,
    /// Largest accepted `limit`.
    pub max_event_limit: u32,
}

impl Default for ArgumentLimits {
    fn default() -> Self {
        Self {
            default_event_limit: 10,
            max_event_limit: 100,
        }
    }
}

/// Predicate applied to a present argument value.
type Check = fn(&Value, &ArgumentLimits) -> Result<(), String>;

/// One argument validator.
#[derive(Debug, Clone, Copy)]
pub struct ArgumentRule {
    /// Argument name.
    pub argument: &'static str,
    /// Whether the argument must be present.
    pub required: bool,
    check: Check,
}

impl ArgumentRule {
    fn apply(&self, arguments: &Map<String, Value>, limits: &ArgumentLimits) -> ApprovalResult<()> {
        match arguments.get(self.argument) {
            None | Some(Value::Null) if self.required => Err(ApprovalError::validation(
                self.argument,
                format!("'{}' is required.", self.argument),
            )),
            None | Some(Value::Null) => Ok(()),
            Some(value) => (self.check)(value, limits)
                .map_err(|msg| ApprovalError::validation(self.argument, msg)),
        }
    }
}

fn check_ip(value: &Value, _: &ArgumentLimits) -> Result<(), String> {
    match value.as_str() {
        Some(s) if s.parse::<IpAddr>().is_ok() => Ok(()),
        Some(s) => Err(format!("'{s}' is not a valid IP address.")),
        None => Err(format!("'{value}' is not a valid IP address.")),
    }
}

fn check_hours(value: &Value, _: &ArgumentLimits) -> Result<(), String> {
    match value.as_u64() {
        Some(h) if (1..=MAX_BAN_HOURS).contains(&h) => Ok(()),
        _ => Err(format!(
            "'hours' must be an integer between 1 and {MAX_BAN_HOURS}, got {value}."
        )),
    }
}

fn check_limit(value: &Value, limits: &ArgumentLimits) -> Result<(), String> {
    match value.as_u64() {
        Some(l) if l >= 1 && l <= u64::from(limits.max_event_limit) => Ok(()),
        _ => Err(format!(
            "'limit' must be an integer between 1 and {}, got {value}.",
            limits.max_event_limit
        )),
    }
}

fn check_token(value: &Value, _: &ArgumentLimits) -> Result<(), String> {
    if value.is_string() {
        Ok(())
    } else {
        Err(format!("'token' must be a string, got {value}."))
    }
}

const NO_RULES: &[ArgumentRule] = &[];

const LIMIT_RULES: &[ArgumentRule] = &[ArgumentRule {
    argument: "limit",
    required: false,
    check: check_limit,
}];

const BAN_RULES: &[ArgumentRule] = &[
    ArgumentRule {
        argument: "ip",
        required: true,
        check: check_ip,
    },
    ArgumentRule {
        argument: "hours",
        required: false,
        check: check_hours,
    },
];

const TOKEN_RULES: &[ArgumentRule] = &[ArgumentRule {
    argument: "token",
    required: true,
    check: check_token,
}];

/// Static description of a tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    /// The tool.
    pub name: ToolName,
    /// One-line description shown to callers.
    pub description: &'static str,
    /// Validators, applied in order.
    pub rules: &'static [ArgumentRule],
}

/// Look up the static spec of a tool.
#[must_use]
pub fn tool_spec(name: ToolName) -> ToolSpec {
    let (description, rules): (&'static str, &'static [ArgumentRule]) = match name {
        ToolName::CheckSystemHealth => (
            "Checks the health of all Titan Grid services (Aegis, Cryptex, Nexus).",
            NO_RULES,
        ),
        ToolName::GetSecurityEvents => (
            "Retrieves recent suspicious activity logs (blocked IPs) from Aegis.",
            LIMIT_RULES,
        ),
        ToolName::AnalyzeAttackPatterns => (
            "Fetches security events and uses AI to analyze patterns and recommend actions.",
            LIMIT_RULES,
        ),
        ToolName::BanSuspiciousIp => (
            "Bans a specific IP address in Aegis. REQUIRES HUMAN APPROVAL.",
            BAN_RULES,
        ),
        ToolName::ApproveAction => (
            "Executes a pending dangerous action using the provided security token.",
            TOKEN_RULES,
        ),
        ToolName::ListPendingActions => (
            "Lists all security actions currently waiting for human approval.",
            NO_RULES,
        ),
    };
    ToolSpec {
        name,
        description,
        rules,
    }
}

/// A tool as presented to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Wire name.
    pub name: ToolName,
    /// Description.
    pub description: String,
    /// Safe or dangerous under the current registry.
    pub classification: Classification,
    /// JSON schema of the arguments.
    pub input_schema: Value,
}

/// Classification and validation table for every tool.
///
/// # Example
///
/// ```
/// use nexus_approval::{ActionRegistry, Classification, ToolName};
///
/// let registry = ActionRegistry::new();
/// assert_eq!(registry.classify(ToolName::BanSuspiciousIp), Classification::Dangerous);
/// assert_eq!(registry.classify(ToolName::CheckSystemHealth), Classification::Safe);
/// ```
#[derive(Debug, Clone)]
pub struct ActionRegistry {
    dangerous: BTreeSet<ToolName>,
    limits: ArgumentLimits,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistry {
    /// Registry with the default dangerous set `{ban_suspicious_ip}`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dangerous: BTreeSet::from([ToolName::BanSuspiciousIp]),
            limits: ArgumentLimits::default(),
        }
    }

    /// Mark additional tools as dangerous.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::Validation`] if a meta tool is named.
    pub fn with_dangerous(
        mut self,
        tools: impl IntoIterator<Item = ToolName>,
    ) -> ApprovalResult<Self> {
        for tool in tools {
            if tool.is_meta() {
                return Err(ApprovalError::validation(
                    "dangerous_tools",
                    format!("'{tool}' drives the approval interlock and cannot require approval"),
                ));
            }
            self.dangerous.insert(tool);
        }
        Ok(self)
    }

    /// Replace the event-limit bounds.
    #[must_use]
    pub fn with_limits(mut self, limits: ArgumentLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Current event-limit bounds.
    #[must_use]
    pub fn limits(&self) -> ArgumentLimits {
        self.limits
    }

    /// Resolve a caller-supplied name.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::UnknownOperation`] for names not in the table.
    pub fn resolve(&self, name: &str) -> ApprovalResult<ToolName> {
        name.parse().map_err(|_| ApprovalError::UnknownOperation {
            name: name.to_string(),
        })
    }

    /// Classify a tool.
    #[must_use]
    pub fn classify(&self, tool: ToolName) -> Classification {
        if self.dangerous.contains(&tool) {
            Classification::Dangerous
        } else {
            Classification::Safe
        }
    }

    /// Whether `tool` is deferred behind approval.
    #[must_use]
    pub fn is_dangerous(&self, tool: ToolName) -> bool {
        self.classify(tool) == Classification::Dangerous
    }

    /// The dangerous set, sorted.
    #[must_use]
    pub fn dangerous_tools(&self) -> Vec<ToolName> {
        self.dangerous.iter().copied().collect()
    }

    /// Normalize a raw argument value into an object map.
    ///
    /// `null` is treated as "no arguments".
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::Validation`] for any non-object value.
    pub fn normalize_arguments(arguments: &Value) -> ApprovalResult<Map<String, Value>> {
        match arguments {
            Value::Null => Ok(Map::new()),
            Value::Object(map) => Ok(map.clone()),
            other => Err(ApprovalError::validation(
                "arguments",
                format!("arguments must be a JSON object, got {other}."),
            )),
        }
    }

    /// Run the tool's validators in order.
    ///
    /// # Errors
    ///
    /// Returns the first [`ApprovalError::Validation`] encountered.
    pub fn validate(&self, tool: ToolName, arguments: &Map<String, Value>) -> ApprovalResult<()> {
        tool_spec(tool)
            .rules
            .iter()
            .try_for_each(|rule| rule.apply(arguments, &self.limits))
    }

    /// Validate and convert arguments into an executable [`Action`].
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::Validation`] on bad arguments, or
    /// [`ApprovalError::Internal`] for meta tools, which have no action form.
    pub fn parse_action(
        &self,
        tool: ToolName,
        arguments: &Map<String, Value>,
    ) -> ApprovalResult<Action> {
        self.validate(tool, arguments)?;
        let limit = || {
            arguments
                .get("limit")
                .and_then(Value::as_u64)
                .and_then(|l| u32::try_from(l).ok())
                .unwrap_or(self.limits.default_event_limit)
        };
        match tool {
            ToolName::CheckSystemHealth => Ok(Action::CheckSystemHealth),
            ToolName::GetSecurityEvents => Ok(Action::GetSecurityEvents { limit: limit() }),
            ToolName::AnalyzeAttackPatterns => {
                Ok(Action::AnalyzeAttackPatterns { limit: limit() })
            },
            ToolName::BanSuspiciousIp => {
                let ip = arguments
                    .get("ip")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<IpAddr>().ok())
                    .ok_or_else(|| ApprovalError::validation("ip", "'ip' is required."))?;
                let hours = arguments
                    .get("hours")
                    .and_then(Value::as_u64)
                    .and_then(|h| u32::try_from(h).ok())
                    .unwrap_or(DEFAULT_BAN_HOURS);
                Ok(Action::BanSuspiciousIp { ip, hours })
            },
            ToolName::ApproveAction | ToolName::ListPendingActions => Err(
                ApprovalError::Internal(format!("{tool} is handled by the interlock itself")),
            ),
        }
    }

    /// JSON schema for a tool's arguments.
    #[must_use]
    pub fn input_schema(&self, tool: ToolName) -> Value {
        let limit = json!({
            "type": "integer",
            "default": self.limits.default_event_limit,
            "minimum": 1,
            "maximum": self.limits.max_event_limit,
        });
        match tool {
            ToolName::CheckSystemHealth | ToolName::ListPendingActions => {
                json!({ "type": "object", "properties": {} })
            },
            ToolName::GetSecurityEvents | ToolName::AnalyzeAttackPatterns => {
                json!({ "type": "object", "properties": { "limit": limit } })
            },
            ToolName::BanSuspiciousIp => json!({
                "type": "object",
                "properties": {
                    "ip": {
                        "type": "string",
                        "description": "The IP address to ban (e.g., 1.2.3.4)"
                    },
                    "hours": {
                        "type": "integer",
                        "default": DEFAULT_BAN_HOURS,
                        "minimum": 1,
                        "maximum": MAX_BAN_HOURS,
                        "description": "Duration of the ban in hours."
                    }
                },
                "required": ["ip"]
            }),
            ToolName::ApproveAction => json!({
                "type": "object",
                "properties": {
                    "token": {
                        "type": "string",
                        "description": "The hex token returned when the action was deferred."
                    }
                },
                "required": ["token"]
            }),
        }
    }

    /// Every tool, in listing order, as presented to callers.
    #[must_use]
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        ToolName::ALL
            .into_iter()
            .map(|tool| ToolDescriptor {
                name: tool,
                description: tool_spec(tool).description.to_string(),
                classification: self.classify(tool),
                input_schema: self.input_schema(tool),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        ActionRegistry::normalize_arguments(&value).unwrap()
    }

    #[test]
    fn test_default_classification() {
        let registry = ActionRegistry::new();
        assert_eq!(registry.dangerous_tools(), vec![ToolName::BanSuspiciousIp]);
        for tool in ToolName::ALL {
            assert_eq!(registry.is_dangerous(tool), tool == ToolName::BanSuspiciousIp);
        }
    }

    #[test]
    fn test_with_dangerous_extends_set() {
        let registry = ActionRegistry::new()
            .with_dangerous([ToolName::AnalyzeAttackPatterns])
            .unwrap();
        assert!(registry.is_dangerous(ToolName::AnalyzeAttackPatterns));
        assert!(registry.is_dangerous(ToolName::BanSuspiciousIp));
    }

    #[test]
    fn test_meta_tools_cannot_be_dangerous() {
        let err = ActionRegistry::new()
            .with_dangerous([ToolName::ApproveAction])
            .unwrap_err();
        assert!(matches!(err, ApprovalError::Validation { .. }));
    }

    #[test]
    fn test_resolve_unknown() {
        let err = ActionRegistry::new().resolve("rm_rf").unwrap_err();
        assert!(matches!(err, ApprovalError::UnknownOperation { name } if name == "rm_rf"));
    }

    #[test]
    fn test_ip_validation() {
        let registry = ActionRegistry::new();
        assert!(
            registry
                .validate(ToolName::BanSuspiciousIp, &args(json!({"ip": "1.2.3.4"})))
                .is_ok()
        );
        assert!(
            registry
                .validate(ToolName::BanSuspiciousIp, &args(json!({"ip": "2001:db8::1"})))
                .is_ok()
        );

        let err = registry
            .validate(ToolName::BanSuspiciousIp, &args(json!({"ip": "not-an-ip"})))
            .unwrap_err();
        match err {
            ApprovalError::Validation { argument, message } => {
                assert_eq!(argument, "ip");
                assert_eq!(message, "'not-an-ip' is not a valid IP address.");
            },
            other => panic!("unexpected error: {other}"),
        }

        assert!(
            registry
                .validate(ToolName::BanSuspiciousIp, &args(json!({})))
                .is_err()
        );
    }

    #[test]
    fn test_hours_bounds() {
        let registry = ActionRegistry::new();
        for bad in [json!(0), json!(8761), json!(-1), json!(1.5), json!("2")] {
            assert!(
                registry
                    .validate(
                        ToolName::BanSuspiciousIp,
                        &args(json!({"ip": "1.2.3.4", "hours": bad}))
                    )
                    .is_err()
            );
        }
        assert!(
            registry
                .validate(
                    ToolName::BanSuspiciousIp,
                    &args(json!({"ip": "1.2.3.4", "hours": 8760}))
                )
                .is_ok()
        );
    }

    #[test]
    fn test_limit_bounds_follow_config() {
        let registry = ActionRegistry::new().with_limits(ArgumentLimits {
            default_event_limit: 5,
            max_event_limit: 20,
        });
        assert!(
            registry
                .validate(ToolName::GetSecurityEvents, &args(json!({"limit": 21})))
                .is_err()
        );
        assert_eq!(
            registry
                .parse_action(ToolName::GetSecurityEvents, &args(json!({})))
                .unwrap(),
            Action::GetSecurityEvents { limit: 5 }
        );
    }

    #[test]
    fn test_non_object_arguments_rejected() {
        assert!(ActionRegistry::normalize_arguments(&json!([1, 2])).is_err());
        assert!(ActionRegistry::normalize_arguments(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_parse_ban_defaults_hours() {
        let action = ActionRegistry::new()
            .parse_action(ToolName::BanSuspiciousIp, &args(json!({"ip": "10.0.0.9"})))
            .unwrap();
        assert_eq!(
            action,
            Action::BanSuspiciousIp {
                ip: "10.0.0.9".parse().unwrap(),
                hours: 1
            }
        );
    }

    #[test]
    fn test_meta_tools_have_no_action() {
        let registry = ActionRegistry::new();
        assert!(
            registry
                .parse_action(ToolName::ListPendingActions, &Map::new())
                .is_err()
        );
    }

    #[test]
    fn test_descriptors_cover_every_tool() {
        let descriptors = ActionRegistry::new().descriptors();
        assert_eq!(descriptors.len(), ToolName::ALL.len());
        let ban = descriptors
            .iter()
            .find(|d| d.name == ToolName::BanSuspiciousIp)
            .unwrap();
        assert_eq!(ban.classification, Classification::Dangerous);
        assert_eq!(ban.input_schema["required"], json!(["ip"]));
    }
}
