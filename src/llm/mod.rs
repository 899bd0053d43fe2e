//! Provider routing for chat completions.
//!
//! This module translates one logical chat turn into a call against one of
//! the supported backends (OpenAI, Anthropic, or a local OpenAI-compatible
//! server) and returns the reply as plain text.
//!
//! ## Example
//!
//! ```rust,ignore
//! use llm_relay::llm::{ChatBackend, ProviderRequest, ProviderRouter, RouterConfig};
//! use llm_relay::ContextMessage;
//!
//! let router = ProviderRouter::new(RouterConfig::new().with_openai_key("sk-..."));
//!
//! let request = ProviderRequest::new("openai", "And in French?")
//!     .with_context(vec![
//!         ContextMessage::user("Say hello"),
//!         ContextMessage::assistant("Hello!"),
//!     ])
//!     .with_system_prompt("You are a translator.");
//!
//! let reply = router.dispatch(request).await?;
//! ```

mod client;
mod probe;
mod types;
mod wire;

pub use client::{ChatBackend, ProviderRouter, RouterConfig, DEFAULT_ANTHROPIC_SYSTEM_PROMPT};
pub use probe::{probe_providers, ProbeOutcome, ProbeReport, PROBE_MESSAGE, PROBE_SYSTEM_PROMPT};
pub use types::{model_catalogue, PreparedCall, Provider, ProviderRequest};
