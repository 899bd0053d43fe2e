//! Chat coordinator: the only code that knows both the session store and the
//! provider router.
//!
//! One turn is: validate, append the user message, read the preceding
//! context, dispatch, append the reply. A failed dispatch leaves the user
//! turn in place and never appends an assistant turn.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::llm::{ChatBackend, Provider, ProviderRequest};
use crate::message::Role;
use crate::session::{generate_session_id, SessionStore, SnapshotStore, DEFAULT_CONTEXT_WINDOW};

const LOG_PREVIEW_CHARS: usize = 100;

/// An inbound chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Existing session, or `None` to start a new one
    pub session_id: Option<String>,
    /// Stable seed for new session ids, usually the client address
    pub client_seed: String,
    pub message: String,
    pub provider: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
}

impl ChatTurn {
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: None,
            client_seed: "anonymous".to_string(),
            message: message.into(),
            provider: provider.into(),
            model: None,
            system_prompt: None,
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn from_client(mut self, seed: impl Into<String>) -> Self {
        self.client_seed = seed.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// A successful reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    #[serde(rename = "conversationId")]
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub provider: Provider,
    pub model: Option<String>,
}

/// Composes the session store with a chat backend.
pub struct ChatService {
    store: Arc<SessionStore>,
    backend: Arc<dyn ChatBackend>,
    context_window: usize,
    snapshots: Option<Arc<dyn SnapshotStore>>,
}

impl ChatService {
    pub fn new(store: Arc<SessionStore>, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            store,
            backend,
            context_window: DEFAULT_CONTEXT_WINDOW,
            snapshots: None,
        }
    }

    /// Number of prior turns sent as context.
    pub fn with_context_window(mut self, window: usize) -> Self {
        self.context_window = window;
        self
    }

    /// Enable best-effort snapshots.
    pub fn with_snapshots(mut self, snapshots: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    /// Relay one turn and record both sides of it.
    pub async fn handle(&self, turn: ChatTurn) -> Result<ChatReply> {
        if turn.message.trim().is_empty() {
            return Err(Error::invalid_input("Message is required"));
        }
        // Configuration errors must not touch the session
        let provider: Provider = turn.provider.parse()?;

        let session_id = turn
            .session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| generate_session_id(&turn.client_seed));

        self.resume(&session_id).await;

        let preview: String = turn.message.chars().take(LOG_PREVIEW_CHARS).collect();
        info!(session_id = %session_id, provider = %provider, message = %preview, "Incoming message");

        let context = self.store.append_with_context(
            &session_id,
            Role::User,
            turn.message.as_str(),
            self.context_window,
        );

        let request = ProviderRequest {
            provider: turn.provider,
            message: turn.message,
            context,
            system_prompt: turn.system_prompt,
            model: turn.model.clone(),
        };

        let response = match self.backend.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(session_id = %session_id, provider = %provider, "Chat error: {}", e);
                return Err(e);
            }
        };

        self.store
            .append(&session_id, Role::Assistant, response.as_str());
        self.snapshot(&session_id);

        Ok(ChatReply {
            response,
            session_id,
            timestamp: Utc::now(),
            provider,
            model: turn.model,
        })
    }

    /// Load a snapshot for a session the store does not know.
    async fn resume(&self, session_id: &str) {
        let Some(snapshots) = &self.snapshots else {
            return;
        };
        if self.store.contains(session_id) {
            return;
        }

        match snapshots.load(session_id).await {
            Ok(Some(session)) if session.id != session_id => {
                warn!(
                    session_id = %session_id,
                    snapshot_id = %session.id,
                    "Ignoring snapshot stored under a different id"
                );
            }
            Ok(Some(session)) => {
                if self.store.restore(session) {
                    debug!(session_id = %session_id, "Resumed session from snapshot");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(session_id = %session_id, "Failed to load session snapshot: {}", e),
        }
    }

    /// Save the session on a detached task.
    fn snapshot(&self, session_id: &str) {
        let Some(snapshots) = self.snapshots.clone() else {
            return;
        };
        let Some(session) = self.store.get(session_id) else {
            return;
        };

        tokio::spawn(async move {
            if let Err(e) = snapshots.save(&session).await {
                warn!(session_id = %session.id, "Failed to save session snapshot: {}", e);
            }
        });
    }
}
