//! Fixed-window request counters keyed by client address.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dashmap::DashMap;
use serde_json::json;
use tokio::time::Instant;
use tracing::warn;

/// Past this many tracked clients, stale windows are dropped on the next check.
const PRUNE_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Result of counting one request. `reset` is the time left in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u32, reset: Duration },
    Limited { reset: Duration },
}

/// Per-client request limit over a fixed window.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    counters: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            counters: DashMap::new(),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one request from `client`.
    pub fn check(&self, client: &str) -> Admission {
        let now = Instant::now();
        if self.counters.len() > PRUNE_THRESHOLD {
            self.prune(now);
        }

        let mut entry = self.counters.entry(client.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        let reset = self.window.saturating_sub(now.duration_since(entry.started));
        if entry.count >= self.limit {
            return Admission::Limited { reset };
        }

        entry.count += 1;
        Admission::Allowed {
            remaining: self.limit - entry.count,
            reset,
        }
    }

    fn prune(&self, now: Instant) {
        let window = self.window;
        self.counters
            .retain(|_, w| now.duration_since(w.started) < window);
    }

    /// Number of clients currently tracked.
    pub fn tracked(&self) -> usize {
        self.counters.len()
    }
}

/// Key used for a request: the peer IP, or `anonymous` when unknown.
pub fn client_key(connect: Option<&ConnectInfo<SocketAddr>>) -> String {
    connect
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Set `RateLimit-*` headers unless an inner limiter already did.
fn set_headers(response: &mut Response, limit: u32, remaining: u32, reset: Duration) {
    let headers = response.headers_mut();
    for (name, value) in [
        ("ratelimit-limit", limit as u64),
        ("ratelimit-remaining", remaining as u64),
        ("ratelimit-reset", reset.as_secs()),
    ] {
        headers
            .entry(name)
            .or_insert_with(|| HeaderValue::from(value));
    }
}

/// Middleware rejecting requests over the limiter's budget with 429.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_key(connect.as_ref());

    match limiter.check(&client) {
        Admission::Allowed { remaining, reset } => {
            let mut response = next.run(request).await;
            set_headers(&mut response, limiter.limit(), remaining, reset);
            response
        }
        Admission::Limited { reset } => {
            warn!(client = %client, path = %request.uri().path(), "Rate limit exceeded");
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Too many requests from this IP, please try again later.",
                    "retryAfter": limiter.window().as_secs(),
                })),
            )
                .into_response();
            set_headers(&mut response, limiter.limit(), 0, reset);
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_limit_within_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));

        let window = Duration::from_secs(60);

        assert_eq!(
            limiter.check("a"),
            Admission::Allowed { remaining: 1, reset: window }
        );
        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(
            limiter.check("a"),
            Admission::Allowed {
                remaining: 0,
                reset: Duration::from_secs(45)
            }
        );
        assert_eq!(
            limiter.check("a"),
            Admission::Limited {
                reset: Duration::from_secs(45)
            }
        );
        // Other clients have their own budget
        assert_eq!(
            limiter.check("b"),
            Admission::Allowed { remaining: 1, reset: window }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));

        assert!(matches!(limiter.check("a"), Admission::Allowed { .. }));
        assert!(matches!(limiter.check("a"), Admission::Limited { .. }));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(matches!(limiter.check("a"), Admission::Allowed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_windows_are_pruned() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        for i in 0..=PRUNE_THRESHOLD {
            limiter.check(&format!("client-{}", i));
        }
        assert_eq!(limiter.tracked(), PRUNE_THRESHOLD + 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        limiter.check("fresh");
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn test_client_key() {
        let addr: SocketAddr = "10.1.2.3:5555".parse().unwrap();
        assert_eq!(client_key(Some(&ConnectInfo(addr))), "10.1.2.3");
        assert_eq!(client_key(None), "anonymous");
    }
}
