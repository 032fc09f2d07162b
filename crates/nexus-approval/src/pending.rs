//! Pending-action records and interlock outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::action::ToolName;
use crate::executor::ToolOutput;
use crate::token::ApprovalToken;

/// A dangerous action waiting for approval.
///
/// Stored as JSON under `{namespace}/{token}`. `created_at` and
/// `expires_at` are informational; the store enforces the TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    /// The deferred operation.
    pub name: ToolName,
    /// Arguments exactly as submitted (after validation).
    pub arguments: Map<String, Value>,
    /// When the action was deferred.
    pub created_at: DateTime<Utc>,
    /// Unique audit identifier.
    pub request_id: Uuid,
    /// When the token stops resolving.
    pub expires_at: DateTime<Utc>,
}

impl PendingAction {
    /// Create a record that expires `ttl` from now.
    #[must_use]
    pub fn new(name: ToolName, arguments: Map<String, Value>, ttl: chrono::Duration) -> Self {
        let created_at = Utc::now();
        Self {
            name,
            arguments,
            created_at,
            request_id: Uuid::new_v4(),
            expires_at: created_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

/// A pending action together with the token that unlocks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEntry {
    /// Approval token.
    pub token: ApprovalToken,
    /// The deferred action.
    pub action: PendingAction,
}

/// Result of [`ApprovalInterlock::submit`](crate::ApprovalInterlock::submit)
/// and [`ApprovalInterlock::approve`](crate::ApprovalInterlock::approve).
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The action ran.
    Executed(ToolOutput),
    /// The action was deferred; `token` unlocks it once.
    PendingApproval {
        /// Token to pass to `approve_action`.
        token: ApprovalToken,
        /// The stored record.
        action: PendingAction,
    },
    /// The token is absent, expired, malformed, or already used.
    InvalidToken,
    /// Actions currently awaiting approval, oldest first.
    Pending(Vec<PendingEntry>),
}

impl Outcome {
    /// Whether the action ran.
    #[must_use]
    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed(_))
    }

    /// The token, if the action was deferred.
    #[must_use]
    pub fn token(&self) -> Option<&ApprovalToken> {
        match self {
            Self::PendingApproval { token, .. } => Some(token),
            _ => None,
        }
    }
}
