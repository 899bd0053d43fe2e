//! Chat and model catalogue routes.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;

use super::rate_limit::client_key;
use super::{ApiError, AppState};
use crate::chat::{ChatReply, ChatTurn};
use crate::llm::{model_catalogue, Provider};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/chat/models", get(models))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    /// Anything other than a string is treated as missing
    #[serde(default)]
    message: Option<Value>,
    provider: Option<String>,
    model: Option<String>,
    system_prompt: Option<String>,
    conversation_id: Option<String>,
}

/// POST /api/chat
async fn chat(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let message = match body.message {
        Some(Value::String(message)) => message,
        _ => String::new(),
    };

    let turn = ChatTurn {
        session_id: body.conversation_id,
        client_seed: client_key(connect.as_ref()),
        message,
        provider: body
            .provider
            .unwrap_or_else(|| Provider::OpenAI.as_str().to_string()),
        model: body.model,
        system_prompt: body.system_prompt,
    };

    let reply = state.chat.handle(turn).await?;
    Ok(Json(reply))
}

/// GET /api/chat/models
async fn models() -> Json<Value> {
    Json(serde_json::json!(model_catalogue()))
}
