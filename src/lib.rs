//! # llm-relay
//!
//! A session-aware chat relay over interchangeable LLM providers.
//!
//! ## Core Components
//!
//! - **Session**: Bounded, expiring per-session turn history
//! - **LLM**: Provider routing for OpenAI, Anthropic and a local model server
//! - **Chat**: The coordinator that records turns around each dispatch
//! - **Server**: HTTP routes for chat, catalogue, health and admin
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use llm_relay::{ChatService, ChatTurn, ProviderRouter, RouterConfig, SessionStore};
//!
//! let router = ProviderRouter::new(RouterConfig::new().with_openai_key("sk-..."));
//! let chat = ChatService::new(Arc::new(SessionStore::new()), Arc::new(router));
//!
//! let reply = chat.handle(ChatTurn::new("openai", "Hello")).await?;
//! println!("{} -> {}", reply.session_id, reply.response);
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod message;
pub mod server;
pub mod session;

// Re-exports for convenience
pub use chat::{ChatReply, ChatService, ChatTurn};
pub use config::{AppConfig, LogFormat};
pub use error::{Error, ErrorKind, Result};
pub use llm::{
    model_catalogue, probe_providers, ChatBackend, ProbeReport, Provider, ProviderRequest,
    ProviderRouter, RouterConfig,
};
pub use message::{ContextMessage, Role};
pub use server::{AppState, RateLimits};
pub use session::{
    generate_session_id, JsonFileSnapshots, Session, SessionLimits, SessionStats, SessionStore,
    SessionSweeper, SnapshotStore, Turn,
};
