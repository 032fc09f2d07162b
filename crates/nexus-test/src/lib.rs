//! Nexus Test - shared test utilities for the Nexus gateway.
//!
//! Add to a crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! nexus-test.workspace = true
//! ```
//!
//! Then in tests:
//!
//! ```rust,ignore
//! use nexus_test::{RecordingExecutor, memory_store, ban_args};
//! use nexus_approval::ApprovalInterlock;
//!
//! #[tokio::test]
//! async fn ban_waits_for_approval() {
//!     let executor = RecordingExecutor::new();
//!     let interlock = ApprovalInterlock::new(memory_store(), executor.handle());
//!     let outcome = interlock
//!         .submit("ban_suspicious_ip", &ban_args("10.0.0.1", 1))
//!         .await
//!         .unwrap();
//!     assert!(outcome.token().is_some());
//!     assert_eq!(executor.call_count(), 0);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod harness;
pub mod mock_llm;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mock_llm::*;
pub use mocks::*;
