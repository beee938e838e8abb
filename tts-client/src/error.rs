use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TtsError {
    #[error(
        "API key not found for {provider}. Set {env_var} environment variable or add to config."
    )]
    MissingApiKey { provider: String, env_var: String },

    #[error("API key rejected by {provider}")]
    InvalidApiKey { provider: String },

    #[error("Rate limit exceeded{}", .retry_after.map(|s| format!(". Retry after {} seconds", s)).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("API error{}: {message}", status_code.map(|c| format!(" (HTTP {})", c)).unwrap_or_default())]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Request failed: {0}")]
    Network(String),

    #[error("Cannot synthesize empty text")]
    EmptyText,

    #[error("Text of {len} characters exceeds the {provider} limit of {limit}")]
    TextTooLong {
        provider: String,
        len: usize,
        limit: usize,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl TtsError {
    /// Whether a later attempt with the same input may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ServerError { .. } | Self::Network(_)
        )
    }

    /// Server-requested wait before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TtsError>;
