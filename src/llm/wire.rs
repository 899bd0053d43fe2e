//! Per-provider request bodies and response envelopes.

use serde::{Deserialize, Serialize};

use super::types::{Provider, ProviderRequest};
use crate::error::{Error, Result};
use crate::message::Role;

// Shared message shape
#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

// OpenAI-style chat completions (also served by the local backend)
#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<LocalOptions>,
}

#[derive(Debug, Serialize)]
struct LocalOptions {
    num_ctx: u32,
    num_predict: u32,
    repeat_penalty: f64,
    top_k: u32,
    top_p: f64,
}

impl LocalOptions {
    fn defaults(max_tokens: u32) -> Self {
        Self {
            num_ctx: 2048,
            num_predict: max_tokens,
            repeat_penalty: 1.1,
            top_k: 40,
            top_p: 0.9,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<ChatCompletionsChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsChoice {
    message: ChatCompletionsMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsMessage {
    content: Option<String>,
}

// Anthropic messages API
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<MessagesContent>,
}

#[derive(Debug, Deserialize)]
struct MessagesContent {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    text: Option<String>,
}

// Error envelope shared by all three backends
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Context turns oldest first, then the new user message.
fn turn_sequence(request: &ProviderRequest) -> impl Iterator<Item = WireMessage<'_>> {
    request
        .context
        .iter()
        .map(|m| WireMessage {
            role: m.role.as_str(),
            content: &m.content,
        })
        .chain(std::iter::once(WireMessage {
            role: Role::User.as_str(),
            content: &request.message,
        }))
}

/// Build the JSON body for `provider`.
///
/// `default_system` is only consulted by providers that keep system
/// instructions outside the message list.
pub(crate) fn build_body(
    provider: Provider,
    request: &ProviderRequest,
    default_system: &str,
) -> Result<serde_json::Value> {
    let model = request.model_for(provider);
    let max_tokens = provider.max_tokens();
    let temperature = provider.temperature();

    let body = match provider {
        Provider::OpenAI | Provider::Local => {
            let mut messages = Vec::with_capacity(request.context.len() + 2);
            if let Some(system) = request.system() {
                messages.push(WireMessage {
                    role: "system",
                    content: system,
                });
            }
            messages.extend(turn_sequence(request));

            let options = matches!(provider, Provider::Local)
                .then(|| LocalOptions::defaults(max_tokens));

            serde_json::to_value(ChatCompletionsRequest {
                model,
                messages,
                max_tokens,
                temperature,
                stream: false,
                options,
            })?
        }
        Provider::Anthropic => serde_json::to_value(MessagesRequest {
            model,
            max_tokens,
            temperature,
            system: request.system().unwrap_or(default_system),
            messages: turn_sequence(request).collect(),
        })?,
    };

    Ok(body)
}

/// Extract the single reply text from a successful response body.
pub(crate) fn parse_reply(provider: Provider, body: &str) -> Result<String> {
    let malformed = |detail: String| {
        Error::upstream(provider.label(), format!("Malformed response: {}", detail))
    };

    match provider {
        Provider::OpenAI | Provider::Local => {
            let response: ChatCompletionsResponse =
                serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
            response
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| malformed("no choices in response".to_string()))
        }
        Provider::Anthropic => {
            let response: MessagesResponse =
                serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
            response
                .content
                .into_iter()
                .find_map(|c| c.text)
                .ok_or_else(|| malformed("no text content in response".to_string()))
        }
    }
}

/// The backend's own error message, if the body carries one.
pub(crate) fn error_detail(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|e| e.error.message)
}
