//! Nexus Approval - the human-approval interlock for operator actions.
//!
//! Operator tools fall into two classes. Safe tools (health checks, event
//! reads, analysis) run as soon as they are called. Dangerous tools (IP
//! bans) are parked in the store behind a single-use token with a bounded
//! lifetime, and run only when a human hands that token back.
//!
//! # Components
//!
//! - [`ToolName`] / [`Action`]: the closed set of operations and their
//!   validated, executable form
//! - [`ActionRegistry`]: classification, descriptions and argument rules
//! - [`TokenGenerator`]: CSPRNG-backed hex tokens
//! - [`ApprovalInterlock`]: `submit`, `approve`, `list_pending`,
//!   `purge_expired`
//! - [`ActionExecutor`]: the seam to concrete tools
//!
//! # Example
//!
//! ```rust,ignore
//! use nexus_approval::{ApprovalInterlock, Outcome};
//! use nexus_storage::MemoryKvStore;
//! use serde_json::json;
//!
//! let interlock = ApprovalInterlock::new(Arc::new(MemoryKvStore::new()), executor);
//! let outcome = interlock
//!     .submit("ban_suspicious_ip", &json!({"ip": "203.0.113.7", "hours": 2}))
//!     .await?;
//! let token = outcome.token().expect("ban is dangerous");
//!
//! // Later, a human approves.
//! let outcome = interlock.approve(token.as_str()).await?;
//! assert!(outcome.is_executed());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod action;
/// Error types and results for the approval interlock.
pub mod error;
pub mod executor;
pub mod interlock;
pub mod pending;
pub mod registry;
pub mod token;

pub use action::{Action, ToolName, UnknownToolName};
pub use error::{ApprovalError, ApprovalResult};
pub use executor::{ActionExecutor, ExecutorError, ToolOutput};
pub use interlock::ApprovalInterlock;
pub use pending::{Outcome, PendingAction, PendingEntry};
pub use registry::{ActionRegistry, ArgumentLimits, Classification, ToolDescriptor};
pub use token::{ApprovalToken, TokenGenerator};
