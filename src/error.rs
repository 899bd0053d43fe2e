//! Error types for llm-relay.

use thiserror::Error;

/// Result type alias using llm-relay's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while relaying a chat turn.
#[derive(Error, Debug)]
pub enum Error {
    /// Provider selector is not one of the supported backends
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Credential for a hosted provider is not configured
    #[error("{provider} API key not configured")]
    MissingCredential { provider: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream provider failed (transport, non-2xx or malformed body)
    #[error("{provider} API Error: {message}")]
    Upstream { provider: String, message: String },

    /// Caller input was rejected before any work was done
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot file I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unsupported provider, missing credential, bad configuration.
    Configuration,
    /// The backend failed or could not be reached.
    Upstream,
    /// The caller sent something unusable.
    Input,
    /// Local plumbing (serialization, file I/O).
    Internal,
}

impl Error {
    /// Create an upstream error.
    pub fn upstream(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a missing credential error.
    pub fn missing_credential(provider: impl Into<String>) -> Self {
        Self::MissingCredential {
            provider: provider.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedProvider(_) | Self::MissingCredential { .. } | Self::Config(_) => {
                ErrorKind::Configuration
            }
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::InvalidInput(_) => ErrorKind::Input,
            Self::Serialization(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }
}
