//! Nexus LLM - text-completion providers.
//!
//! Attack analysis treats the model as a black box: a system prompt and a
//! user prompt go in, prose comes out. Providers:
//!
//! - [`ClaudeProvider`]: Anthropic Messages API
//! - [`OpenAiCompatProvider`]: `OpenAI`, or Ollama through its
//!   `OpenAI`-compatible endpoint
//!
//! Every request is bounded by [`ProviderConfig::timeout`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod claude;
mod error;
mod openai_compat;
mod provider;

pub use claude::ClaudeProvider;
pub use error::{LlmError, LlmResult};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{DEFAULT_TIMEOUT, LlmProvider, ProviderConfig};
