//! Connectivity check across all providers.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use super::client::ChatBackend;
use super::types::{Provider, ProviderRequest};

/// Message sent to every provider during a probe.
pub const PROBE_MESSAGE: &str =
    "Hello, this is a test message. Please respond with 'Test successful'.";

/// System prompt used during a probe.
pub const PROBE_SYSTEM_PROMPT: &str = "You are a test assistant. Keep responses brief.";

const PROBE_PREVIEW_CHARS: usize = 100;

/// Outcome of probing one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProbeOutcome {
    Success {
        response: String,
        #[serde(rename = "responseTime")]
        response_time_ms: u64,
    },
    Error {
        error: String,
    },
}

/// Results of probing every provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub test_message: String,
    pub results: BTreeMap<Provider, ProbeOutcome>,
    pub timestamp: DateTime<Utc>,
}

fn preview(text: &str) -> String {
    if text.chars().count() > PROBE_PREVIEW_CHARS {
        let head: String = text.chars().take(PROBE_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

async fn probe_one(backend: &dyn ChatBackend, provider: Provider) -> (Provider, ProbeOutcome) {
    let request =
        ProviderRequest::new(provider.as_str(), PROBE_MESSAGE).with_system_prompt(PROBE_SYSTEM_PROMPT);

    let start = Instant::now();
    let outcome = match backend.dispatch(request).await {
        Ok(response) => ProbeOutcome::Success {
            response: preview(&response),
            response_time_ms: start.elapsed().as_millis() as u64,
        },
        Err(e) => ProbeOutcome::Error {
            error: e.to_string(),
        },
    };

    (provider, outcome)
}

/// Send a short test message to every provider concurrently.
pub async fn probe_providers(backend: &dyn ChatBackend) -> ProbeReport {
    let results = join_all(Provider::ALL.iter().map(|p| probe_one(backend, *p)))
        .await
        .into_iter()
        .collect();

    ProbeReport {
        test_message: PROBE_MESSAGE.to_string(),
        results,
        timestamp: Utc::now(),
    }
}
