//! Process configuration read from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::llm::{RouterConfig, DEFAULT_ANTHROPIC_SYSTEM_PROMPT};
use crate::session::{
    SessionLimits, DEFAULT_CONTEXT_WINDOW, DEFAULT_MAX_AGE_SECS, DEFAULT_MAX_TURNS,
    DEFAULT_SWEEP_INTERVAL,
};

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CHAT_RATE_LIMIT: u32 = 50;
pub const DEFAULT_GENERAL_RATE_LIMIT: u32 = 200;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;

/// Upper bound for `SESSION_MAX_AGE_SECS` (about 100 years).
pub const MAX_SESSION_AGE_SECS: i64 = 100 * 365 * 24 * 60 * 60;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        }
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::Config(format!("unknown log format: {}", other))),
        }
    }
}

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_base_url: String,
    pub anthropic_base_url: String,
    pub local_base_url: String,
    pub anthropic_default_system: String,
    pub http_timeout_secs: u64,

    pub max_turns: usize,
    pub max_age_secs: i64,
    pub context_window: usize,
    pub sweep_interval_secs: u64,
    /// Directory for session snapshots; `None` disables them
    pub snapshot_dir: Option<PathBuf>,

    pub port: u16,
    /// Shared admin key; `None` rejects every admin request
    pub admin_key: Option<String>,
    pub chat_rate_limit: u32,
    pub general_rate_limit: u32,
    pub rate_limit_window_secs: u64,

    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            anthropic_api_key: None,
            openai_base_url: RouterConfig::DEFAULT_OPENAI_BASE_URL.to_string(),
            anthropic_base_url: RouterConfig::DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            local_base_url: RouterConfig::DEFAULT_LOCAL_BASE_URL.to_string(),
            anthropic_default_system: DEFAULT_ANTHROPIC_SYSTEM_PROMPT.to_string(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            max_turns: DEFAULT_MAX_TURNS,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            context_window: DEFAULT_CONTEXT_WINDOW,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
            snapshot_dir: None,
            port: DEFAULT_PORT,
            admin_key: None,
            chat_rate_limit: DEFAULT_CHAT_RATE_LIMIT,
            general_rate_limit: DEFAULT_GENERAL_RATE_LIMIT,
            rate_limit_window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Non-empty value for `key`.
fn text(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parsed value for `key`, or `default` when unset or unparseable.
fn number<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    text(lookup, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            openai_api_key: text(&lookup, "OPENAI_API_KEY"),
            anthropic_api_key: text(&lookup, "ANTHROPIC_API_KEY"),
            openai_base_url: text(&lookup, "OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            anthropic_base_url: text(&lookup, "ANTHROPIC_BASE_URL")
                .unwrap_or(defaults.anthropic_base_url),
            local_base_url: text(&lookup, "LOCAL_LLM_URL").unwrap_or(defaults.local_base_url),
            anthropic_default_system: text(&lookup, "ANTHROPIC_DEFAULT_SYSTEM_PROMPT")
                .unwrap_or(defaults.anthropic_default_system),
            http_timeout_secs: number(&lookup, "HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
            max_turns: number(&lookup, "SESSION_MAX_TURNS", defaults.max_turns),
            max_age_secs: number(&lookup, "SESSION_MAX_AGE_SECS", defaults.max_age_secs),
            context_window: number(&lookup, "CONTEXT_WINDOW", defaults.context_window),
            sweep_interval_secs: number(
                &lookup,
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            ),
            snapshot_dir: text(&lookup, "SNAPSHOT_DIR").map(PathBuf::from),
            port: number(&lookup, "PORT", defaults.port),
            admin_key: text(&lookup, "ADMIN_KEY"),
            chat_rate_limit: number(&lookup, "CHAT_RATE_LIMIT", defaults.chat_rate_limit),
            general_rate_limit: number(&lookup, "GENERAL_RATE_LIMIT", defaults.general_rate_limit),
            rate_limit_window_secs: number(
                &lookup,
                "RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window_secs,
            ),
            log_level: text(&lookup, "LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: text(&lookup, "LOG_FORMAT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.log_format),
        }
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("SESSION_MAX_TURNS", self.max_turns as u64),
            ("CONTEXT_WINDOW", self.context_window as u64),
            ("SWEEP_INTERVAL_SECS", self.sweep_interval_secs),
            ("HTTP_TIMEOUT_SECS", self.http_timeout_secs),
            ("RATE_LIMIT_WINDOW_SECS", self.rate_limit_window_secs),
            ("CHAT_RATE_LIMIT", self.chat_rate_limit as u64),
            ("GENERAL_RATE_LIMIT", self.general_rate_limit as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than zero", key)));
            }
        }

        if self.max_age_secs <= 0 {
            return Err(Error::Config(
                "SESSION_MAX_AGE_SECS must be greater than zero".to_string(),
            ));
        }
        if self.max_age_secs > MAX_SESSION_AGE_SECS {
            return Err(Error::Config(format!(
                "SESSION_MAX_AGE_SECS must be at most {}",
                MAX_SESSION_AGE_SECS
            )));
        }

        Ok(())
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            openai_api_key: self.openai_api_key.clone(),
            anthropic_api_key: self.anthropic_api_key.clone(),
            openai_base_url: self.openai_base_url.clone(),
            anthropic_base_url: self.anthropic_base_url.clone(),
            local_base_url: self.local_base_url.clone(),
            anthropic_default_system: self.anthropic_default_system.clone(),
            timeout_secs: self.http_timeout_secs,
        }
    }

    /// Session limits; an out-of-range age keeps the default.
    pub fn session_limits(&self) -> SessionLimits {
        let defaults = SessionLimits::default();
        let max_age = chrono::Duration::try_seconds(self.max_age_secs).unwrap_or(defaults.max_age);
        defaults
            .with_max_turns(self.max_turns)
            .with_max_age(max_age)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}
