//! Provider selector, logical request and static model catalogue.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::message::ContextMessage;

/// Supported chat backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI chat completions
    OpenAI,
    /// Anthropic messages API
    Anthropic,
    /// Local OpenAI-compatible server (e.g. Ollama)
    Local,
}

impl Provider {
    /// Every supported provider, in catalogue order.
    pub const ALL: [Provider; 3] = [Provider::OpenAI, Provider::Anthropic, Provider::Local];

    /// Selector string accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Local => "local",
        }
    }

    /// Human-readable backend name used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Local => "Local LLM",
        }
    }

    /// Model used when the caller does not name one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-3.5-turbo",
            Self::Anthropic => "claude-3-sonnet-20240229",
            Self::Local => "deepseek-r1:8b",
        }
    }

    /// Fixed maximum output length.
    pub fn max_tokens(&self) -> u32 {
        match self {
            Self::OpenAI | Self::Anthropic => 4000,
            Self::Local => 1000,
        }
    }

    /// Fixed sampling temperature.
    pub fn temperature(&self) -> f64 {
        0.7
    }

    /// Whether a credential must be configured before calling this backend.
    pub fn requires_credential(&self) -> bool {
        !matches!(self, Self::Local)
    }

    /// Whether system instructions travel inside the message list.
    pub fn inlines_system(&self) -> bool {
        !matches!(self, Self::Anthropic)
    }

    /// Advertised model names.
    pub fn models(&self) -> &'static [&'static str] {
        match self {
            Self::OpenAI => &["gpt-4", "gpt-4-turbo", "gpt-3.5-turbo"],
            Self::Anthropic => &[
                "claude-3-opus-20240229",
                "claude-3-sonnet-20240229",
                "claude-3-haiku-20240307",
            ],
            Self::Local => &[
                "deepseek-r1:8b",
                "dolphin-llama3:8b",
                "llama2",
                "codellama",
                "mistral",
            ],
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "local" => Ok(Self::Local),
            other => Err(Error::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Provider name -> advertised model names.
pub fn model_catalogue() -> BTreeMap<Provider, Vec<&'static str>> {
    Provider::ALL
        .iter()
        .map(|p| (*p, p.models().to_vec()))
        .collect()
}

/// Provider-agnostic chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Provider selector; validated at dispatch
    pub provider: String,
    /// New user message
    pub message: String,
    /// Prior turns, oldest first
    pub context: Vec<ContextMessage>,
    /// System instructions
    pub system_prompt: Option<String>,
    /// Model override
    pub model: Option<String>,
}

impl ProviderRequest {
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
            context: Vec::new(),
            system_prompt: None,
            model: None,
        }
    }

    pub fn with_context(mut self, context: Vec<ContextMessage>) -> Self {
        self.context = context;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// System prompt, treating an empty string as absent.
    pub fn system(&self) -> Option<&str> {
        self.system_prompt.as_deref().filter(|s| !s.is_empty())
    }

    /// Model to send: the override if non-empty, otherwise the provider default.
    pub fn model_for(&self, provider: Provider) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| provider.default_model())
    }
}

/// A fully built outbound call, before any network I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCall {
    pub provider: Provider,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: serde_json::Value,
}
