//! Admin routes: statistics, session inspection, cleanup, provider probe.

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{ApiError, AppState};
use crate::llm::{probe_providers, ProbeReport};
use crate::session::{Session, SessionPage};

const ADMIN_KEY_HEADER: &str = "x-admin-key";

pub(super) fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/api/admin/stats", get(stats))
        .route("/api/admin/conversations", get(list_sessions))
        .route(
            "/api/admin/conversations/:id",
            get(get_session).delete(delete_session),
        )
        .route("/api/admin/cleanup", post(cleanup))
        .route("/api/admin/test-providers", post(test_providers))
        .route_layer(middleware::from_fn_with_state(state, require_admin_key));

    Router::new()
        .route("/api/admin/health", get(health))
        .merge(protected)
}

#[derive(Debug, Default, Deserialize)]
struct AdminKeyQuery {
    #[serde(rename = "adminKey")]
    admin_key: Option<String>,
}

async fn require_admin_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Option<Query<AdminKeyQuery>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query.and_then(|Query(q)| q.admin_key));

    match (&state.admin_key, provided) {
        (Some(expected), Some(provided)) if provided == expected.as_ref() => {
            Ok(next.run(request).await)
        }
        _ => {
            warn!(path = %request.uri().path(), "Rejected admin request");
            Err(ApiError::unauthorized())
        }
    }
}

/// GET /api/admin/stats
async fn stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "system": {
            "uptime": state.uptime().as_secs_f64(),
            "version": env!("CARGO_PKG_VERSION"),
            "platform": std::env::consts::OS,
        },
        "conversations": state.chat.store().stats(),
        "timestamp": Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<String>,
    limit: Option<String>,
}

/// Lenient integer parse; anything unusable becomes zero and takes the default.
fn page_param(value: Option<&str>) -> usize {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// GET /api/admin/conversations
async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<PageQuery>,
) -> Json<SessionPage> {
    let page = page_param(params.page.as_deref());
    let limit = page_param(params.limit.as_deref());
    Json(state.chat.store().list(page, limit))
}

/// GET /api/admin/conversations/:id
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    state
        .chat
        .store()
        .get(&id)
        .filter(|s| !s.is_empty())
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Conversation not found"))
}

/// DELETE /api/admin/conversations/:id
async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.chat.store().remove(&id) {
        return Err(ApiError::not_found("Conversation not found"));
    }

    info!(session_id = %id, "Deleted session");
    Ok(Json(json!({
        "message": "Conversation deleted successfully",
        "id": id,
    })))
}

/// POST /api/admin/cleanup
async fn cleanup(State(state): State<AppState>) -> Json<Value> {
    let removed = state.chat.store().expire_sweep();
    Json(json!({
        "message": "Cleanup completed",
        "conversationsRemoved": removed,
    }))
}

/// POST /api/admin/test-providers
async fn test_providers(State(state): State<AppState>) -> Json<ProbeReport> {
    Json(probe_providers(state.chat.backend().as_ref()).await)
}

/// GET /api/admin/health
async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "timestamp": Utc::now(),
            "uptime": state.uptime().as_secs_f64(),
            "connections": state.chat.store().stats().total_sessions,
        })),
    )
}
