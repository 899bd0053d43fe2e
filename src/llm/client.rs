//! Provider router: one dispatch per logical chat turn.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::{Error, Result};

use super::types::{PreparedCall, Provider, ProviderRequest};
use super::wire;

/// Default system prompt sent to Anthropic when the caller gives none.
pub const DEFAULT_ANTHROPIC_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Answer questions directly, clearly and honestly.";

/// Anything that can turn a [`ProviderRequest`] into reply text.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one request and return the reply text.
    async fn dispatch(&self, request: ProviderRequest) -> Result<String>;
}

/// Credentials, endpoints and transport settings for the router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// OpenAI API key
    pub openai_api_key: Option<String>,
    /// Anthropic API key
    pub anthropic_api_key: Option<String>,
    /// OpenAI base URL
    pub openai_base_url: String,
    /// Anthropic base URL
    pub anthropic_base_url: String,
    /// Local model server base URL
    pub local_base_url: String,
    /// System prompt Anthropic falls back to
    pub anthropic_default_system: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            anthropic_api_key: None,
            openai_base_url: RouterConfig::DEFAULT_OPENAI_BASE_URL.to_string(),
            anthropic_base_url: RouterConfig::DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            local_base_url: RouterConfig::DEFAULT_LOCAL_BASE_URL.to_string(),
            anthropic_default_system: DEFAULT_ANTHROPIC_SYSTEM_PROMPT.to_string(),
            timeout_secs: 120,
        }
    }
}

impl RouterConfig {
    pub const DEFAULT_OPENAI_BASE_URL: &'static str = "https://api.openai.com";
    pub const DEFAULT_ANTHROPIC_BASE_URL: &'static str = "https://api.anthropic.com";
    pub const DEFAULT_LOCAL_BASE_URL: &'static str = "http://localhost:11434";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_openai_key(mut self, key: impl Into<String>) -> Self {
        self.openai_api_key = Some(key.into());
        self
    }

    pub fn with_anthropic_key(mut self, key: impl Into<String>) -> Self {
        self.anthropic_api_key = Some(key.into());
        self
    }

    pub fn with_openai_base_url(mut self, url: impl Into<String>) -> Self {
        self.openai_base_url = url.into();
        self
    }

    pub fn with_anthropic_base_url(mut self, url: impl Into<String>) -> Self {
        self.anthropic_base_url = url.into();
        self
    }

    pub fn with_local_base_url(mut self, url: impl Into<String>) -> Self {
        self.local_base_url = url.into();
        self
    }

    pub fn with_anthropic_default_system(mut self, prompt: impl Into<String>) -> Self {
        self.anthropic_default_system = prompt.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn base_url(&self, provider: Provider) -> &str {
        let url = match provider {
            Provider::OpenAI => &self.openai_base_url,
            Provider::Anthropic => &self.anthropic_base_url,
            Provider::Local => &self.local_base_url,
        };
        url.trim_end_matches('/')
    }

    /// Configured, non-empty credential for `provider`.
    fn credential(&self, provider: Provider) -> Option<&str> {
        let key = match provider {
            Provider::OpenAI => self.openai_api_key.as_deref(),
            Provider::Anthropic => self.anthropic_api_key.as_deref(),
            Provider::Local => None,
        };
        key.filter(|k| !k.is_empty())
    }
}

fn build_http_client(timeout_secs: u64) -> Client {
    let timeout = Duration::from_secs(timeout_secs);

    // Some sandboxed macOS environments can panic during proxy auto-detection
    // in reqwest's default client builder. Fall back to no-proxy in that case.
    match catch_unwind(AssertUnwindSafe(|| Client::builder().timeout(timeout).build())) {
        Ok(Ok(client)) => client,
        Ok(Err(_)) | Err(_) => Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new()),
    }
}

/// Routes a chat request to exactly one backend and normalizes the reply.
///
/// Each call makes a single attempt; there is no retry.
pub struct ProviderRouter {
    config: RouterConfig,
    http: Client,
}

impl ProviderRouter {
    const ANTHROPIC_VERSION: &'static str = "2023-06-01";

    pub fn new(config: RouterConfig) -> Self {
        let http = build_http_client(config.timeout_secs);
        Self { config, http }
    }

    /// Validate the provider and build the outbound call without sending it.
    pub fn prepare(&self, request: &ProviderRequest) -> Result<PreparedCall> {
        let provider: Provider = request.provider.parse()?;

        let credential = if provider.requires_credential() {
            Some(
                self.config
                    .credential(provider)
                    .ok_or_else(|| Error::missing_credential(provider.label()))?,
            )
        } else {
            None
        };

        let base = self.config.base_url(provider);
        let (url, mut headers) = match provider {
            Provider::OpenAI | Provider::Local => {
                let mut headers = Vec::new();
                if let Some(key) = credential {
                    headers.push(("authorization", format!("Bearer {}", key)));
                }
                (format!("{}/v1/chat/completions", base), headers)
            }
            Provider::Anthropic => {
                let mut headers = vec![(
                    "anthropic-version",
                    Self::ANTHROPIC_VERSION.to_string(),
                )];
                if let Some(key) = credential {
                    headers.push(("x-api-key", key.to_string()));
                }
                (format!("{}/v1/messages", base), headers)
            }
        };
        headers.push(("content-type", "application/json".to_string()));

        let body = wire::build_body(provider, request, &self.config.anthropic_default_system)?;

        Ok(PreparedCall {
            provider,
            url,
            headers,
            body,
        })
    }

    async fn send(&self, call: PreparedCall) -> Result<String> {
        let provider = call.provider;
        let label = provider.label();

        debug!(
            provider = %provider,
            url = %call.url,
            model = call.body["model"].as_str().unwrap_or_default(),
            "Dispatching chat request"
        );

        let mut builder = self.http.post(&call.url);
        for (name, value) in &call.headers {
            builder = builder.header(*name, value);
        }

        let response = builder
            .json(&call.body)
            .send()
            .await
            .map_err(|e| Error::upstream(label, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::upstream(label, format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let detail = wire::error_detail(&body)
                .unwrap_or_else(|| format!("Request failed with status {}: {}", status, body));
            return Err(Error::upstream(label, detail));
        }

        wire::parse_reply(provider, &body)
    }
}

#[async_trait]
impl ChatBackend for ProviderRouter {
    async fn dispatch(&self, request: ProviderRequest) -> Result<String> {
        let call = self.prepare(&request)?;
        self.send(call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::message::ContextMessage;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn header_value<'a>(call: &'a PreparedCall, name: &str) -> Option<&'a str> {
        call.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_router_config_builder() {
        let config = RouterConfig::new()
            .with_openai_key("sk-test")
            .with_local_base_url("http://gpu-box:11434/")
            .with_timeout(30);

        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.base_url(Provider::Local), "http://gpu-box:11434");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.anthropic_default_system, DEFAULT_ANTHROPIC_SYSTEM_PROMPT);
    }

    #[test]
    fn test_prepare_openai() {
        let router = ProviderRouter::new(RouterConfig::new().with_openai_key("sk-test"));
        let call = router
            .prepare(&ProviderRequest::new("openai", "hi"))
            .unwrap();

        assert_eq!(call.provider, Provider::OpenAI);
        assert_eq!(call.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(header_value(&call, "authorization"), Some("Bearer sk-test"));
    }

    #[test]
    fn test_prepare_anthropic_headers() {
        let router = ProviderRouter::new(RouterConfig::new().with_anthropic_key("ak-test"));
        let call = router
            .prepare(&ProviderRequest::new("anthropic", "hi"))
            .unwrap();

        assert_eq!(call.url, "https://api.anthropic.com/v1/messages");
        assert_eq!(header_value(&call, "x-api-key"), Some("ak-test"));
        assert_eq!(header_value(&call, "anthropic-version"), Some("2023-06-01"));
        assert_eq!(header_value(&call, "authorization"), None);
    }

    #[test]
    fn test_prepare_local_needs_no_credential() {
        let router = ProviderRouter::new(RouterConfig::new());
        let call = router.prepare(&ProviderRequest::new("local", "hi")).unwrap();

        assert_eq!(call.url, "http://localhost:11434/v1/chat/completions");
        assert_eq!(header_value(&call, "authorization"), None);
    }

    #[test]
    fn test_prepare_missing_credential() {
        let router = ProviderRouter::new(RouterConfig::new().with_openai_key(""));

        let err = router
            .prepare(&ProviderRequest::new("openai", "hi"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_string(), "OpenAI API key not configured");

        let err = router
            .prepare(&ProviderRequest::new("anthropic", "hi"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Anthropic API key not configured");
    }

    #[tokio::test]
    async fn test_unsupported_provider_fails_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let router = ProviderRouter::new(
            RouterConfig::new()
                .with_openai_key("sk")
                .with_openai_base_url(server.uri())
                .with_local_base_url(server.uri()),
        );

        let err = router
            .dispatch(ProviderRequest::new("bogus", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedProvider(ref p) if p == "bogus"));
        assert!(err.to_string().to_lowercase().contains("unsupported provider"));
    }

    #[tokio::test]
    async fn test_dispatch_openai_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4",
                "messages": [
                    {"role": "system", "content": "terse"},
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"},
                    {"role": "user", "content": "how are you?"},
                ],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-1",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Fine."}}],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let router = ProviderRouter::new(
            RouterConfig::new()
                .with_openai_key("sk-test")
                .with_openai_base_url(server.uri()),
        );

        let request = ProviderRequest::new("openai", "how are you?")
            .with_context(vec![
                ContextMessage::user("hi"),
                ContextMessage::assistant("hello"),
            ])
            .with_system_prompt("terse")
            .with_model("gpt-4");

        assert_eq!(router.dispatch(request).await.unwrap(), "Fine.");
    }

    #[tokio::test]
    async fn test_dispatch_anthropic_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "ak-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(json!({
                "system": DEFAULT_ANTHROPIC_SYSTEM_PROMPT,
                "messages": [{"role": "user", "content": "hi"}],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "type": "message",
                "content": [{"type": "text", "text": "Hello!"}],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let router = ProviderRouter::new(
            RouterConfig::new()
                .with_anthropic_key("ak-test")
                .with_anthropic_base_url(server.uri()),
        );

        let reply = router
            .dispatch(ProviderRequest::new("anthropic", "hi"))
            .await
            .unwrap();
        assert_eq!(reply, "Hello!");
    }

    #[tokio::test]
    async fn test_dispatch_surfaces_backend_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let router = ProviderRouter::new(
            RouterConfig::new()
                .with_openai_key("sk-bad")
                .with_openai_base_url(server.uri()),
        );

        let err = router
            .dispatch(ProviderRequest::new("openai", "hi"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(err.to_string(), "OpenAI API Error: Incorrect API key provided");
    }

    #[tokio::test]
    async fn test_dispatch_non_json_error_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let router = ProviderRouter::new(RouterConfig::new().with_local_base_url(server.uri()));

        let err = router
            .dispatch(ProviderRequest::new("local", "hi"))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Local LLM API Error:"));
        assert!(message.contains("502"));
        assert!(message.contains("bad gateway"));
    }

    #[tokio::test]
    async fn test_dispatch_malformed_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"unexpected\":true}"))
            .mount(&server)
            .await;

        let router = ProviderRouter::new(RouterConfig::new().with_local_base_url(server.uri()));

        let err = router
            .dispatch(ProviderRequest::new("local", "hi"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[tokio::test]
    async fn test_dispatch_transport_error() {
        // Nothing listens on port 9 (discard) in the test environment
        let router = ProviderRouter::new(
            RouterConfig::new()
                .with_local_base_url("http://127.0.0.1:9")
                .with_timeout(5),
        );

        let err = router
            .dispatch(ProviderRequest::new("local", "hi"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(err.to_string().contains("HTTP request failed"));
    }
}
