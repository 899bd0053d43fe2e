//! HTTP surface: chat, model catalogue, health and admin routes.
//!
//! Every `/api` route shares the general per-client limit; the chat routes
//! carry a second, tighter limit. Admin routes other than `/api/admin/health`
//! require the shared admin key.

mod admin;
mod chat;
pub mod rate_limit;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::chat::ChatService;
use crate::error::Error;

pub use rate_limit::RateLimiter;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub admin_key: Option<Arc<str>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(chat: Arc<ChatService>) -> Self {
        Self {
            chat,
            admin_key: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_admin_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.admin_key = Some(key.into());
        self
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Request budgets per client.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub general: u32,
    pub chat: u32,
    pub window: Duration,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            general: crate::config::DEFAULT_GENERAL_RATE_LIMIT,
            chat: crate::config::DEFAULT_CHAT_RATE_LIMIT,
            window: Duration::from_secs(crate::config::DEFAULT_RATE_LIMIT_WINDOW_SECS),
        }
    }
}

/// Build the full application router.
pub fn router(state: AppState, limits: RateLimits) -> Router {
    let general = Arc::new(RateLimiter::new(limits.general, limits.window));
    let chat_limiter = Arc::new(RateLimiter::new(limits.chat, limits.window));

    let chat_routes = chat::routes().route_layer(middleware::from_fn_with_state(
        chat_limiter,
        rate_limit::enforce,
    ));

    Router::new()
        .route("/api/health", get(health))
        .merge(chat_routes)
        .merge(admin::routes(state.clone()))
        .layer(middleware::from_fn_with_state(general, rate_limit::enforce))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /api/health
async fn health() -> Json<Value> {
    Json(json!({
        "status": "Server is running!",
        "timestamp": Utc::now(),
    }))
}

/// Error response with a JSON body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized access")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(message) => Self::new(StatusCode::BAD_REQUEST, message),
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: json!({
                    "error": "Failed to get chat response",
                    "details": other.to_string(),
                }),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Result;
    use crate::llm::{ChatBackend, ProviderRequest};
    use crate::session::SessionStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    pub(crate) struct EchoBackend;

    #[async_trait]
    impl ChatBackend for EchoBackend {
        async fn dispatch(&self, request: ProviderRequest) -> Result<String> {
            match request.provider.as_str() {
                "anthropic" => Err(Error::missing_credential("Anthropic")),
                _ => Ok(format!("echo: {}", request.message)),
            }
        }
    }

    pub(crate) fn test_state() -> AppState {
        let chat = ChatService::new(Arc::new(SessionStore::new()), Arc::new(EchoBackend));
        AppState::new(Arc::new(chat)).with_admin_key("secret")
    }

    pub(crate) fn test_app(state: AppState) -> Router {
        router(state, RateLimits::default())
    }

    pub(crate) async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub(crate) fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub(crate) fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(test_state());
        let (status, body) = send(&app, get("/api/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Server is running!");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_general_limit_applies_to_all_routes() {
        let limits = RateLimits {
            general: 2,
            chat: 10,
            window: Duration::from_secs(60),
        };
        let app = router(test_state(), limits);

        assert_eq!(send(&app, get("/api/health")).await.0, StatusCode::OK);
        assert_eq!(send(&app, get("/api/chat/models")).await.0, StatusCode::OK);

        let (status, body) = send(&app, get("/api/health")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            body["error"],
            "Too many requests from this IP, please try again later."
        );
        assert_eq!(body["retryAfter"], 60);
    }

    #[tokio::test]
    async fn test_rate_limit_headers_report_tightest_budget() {
        let limits = RateLimits {
            general: 5,
            chat: 2,
            window: Duration::from_secs(60),
        };
        let app = router(test_state(), limits);

        let response = app.clone().oneshot(get("/api/health")).await.unwrap();
        let headers = response.headers();
        assert_eq!(headers["ratelimit-limit"], "5");
        assert_eq!(headers["ratelimit-remaining"], "4");
        assert!(headers.contains_key("ratelimit-reset"));

        let response = app
            .clone()
            .oneshot(post_json("/api/chat", json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["ratelimit-limit"], "2");
        assert_eq!(response.headers()["ratelimit-remaining"], "1");
    }

    #[test]
    fn test_error_mapping() {
        let err = ApiError::from(Error::invalid_input("Message is required"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.body, json!({"error": "Message is required"}));

        let err = ApiError::from(Error::upstream("OpenAI", "quota exceeded"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.body,
            json!({
                "error": "Failed to get chat response",
                "details": "OpenAI API Error: quota exceeded",
            })
        );
    }
}
