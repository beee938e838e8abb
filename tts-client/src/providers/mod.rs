//! TTS provider implementations

mod elevenlabs;
pub mod mock;
mod openai;

pub use elevenlabs::ElevenLabsProvider;
pub use mock::MockProvider;
pub use openai::OpenAiProvider;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;

use crate::config::ProviderConfig;
use crate::error::{Result, TtsError};
use crate::provider::TtsProvider;

/// Supported provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    ElevenLabs,
    Mock,
}

impl ProviderKind {
    /// Parse provider kind from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" | "open-ai" | "open_ai" => Ok(Self::OpenAi),
            "elevenlabs" | "eleven-labs" | "eleven_labs" | "11labs" => Ok(Self::ElevenLabs),
            "mock" => Ok(Self::Mock),
            _ => Err(TtsError::ConfigError(format!("Unknown provider: {}", s))),
        }
    }

    /// Canonical name, as used for config table keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::ElevenLabs => "elevenlabs",
            Self::Mock => "mock",
        }
    }

    /// Name for messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::ElevenLabs => "ElevenLabs",
            Self::Mock => "Mock",
        }
    }

    /// Get the environment variable name for this provider's API key
    pub fn env_var(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::ElevenLabs => Some("ELEVENLABS_API_KEY"),
            Self::Mock => None,
        }
    }
}

/// Create a provider instance for `kind` with optional config
pub fn get_provider(
    kind: ProviderKind,
    provider_config: Option<&ProviderConfig>,
) -> Result<Box<dyn TtsProvider>> {
    let config = provider_config.cloned().unwrap_or_default();

    match kind {
        ProviderKind::OpenAi => {
            let api_key = get_api_key(&config, kind)?;
            Ok(Box::new(OpenAiProvider::new(api_key, &config)?))
        }
        ProviderKind::ElevenLabs => {
            let api_key = get_api_key(&config, kind)?;
            Ok(Box::new(ElevenLabsProvider::new(api_key, &config)?))
        }
        ProviderKind::Mock => {
            let mut provider = MockProvider::always_succeeds();
            if let Some(limit) = config.max_chunk_size {
                provider = provider.with_max_chunk_size(limit);
            }
            Ok(Box::new(provider))
        }
    }
}

/// Get API key from config or the kind's environment variable
fn get_api_key(config: &ProviderConfig, kind: ProviderKind) -> Result<String> {
    // Check config first
    if let Some(key) = config.api_key.clone() {
        return Ok(key);
    }

    let env_var = kind.env_var().ok_or_else(|| {
        TtsError::ConfigError(format!("{} does not use an API key", kind.display_name()))
    })?;

    // Fall back to environment variable
    std::env::var(env_var).map_err(|_| TtsError::MissingApiKey {
        provider: kind.display_name().to_string(),
        env_var: env_var.to_string(),
    })
}

/// Reject text a provider cannot accept before spending a request on it.
fn check_text(provider: &str, text: &str, limit: usize) -> Result<()> {
    if text.trim().is_empty() {
        return Err(TtsError::EmptyText);
    }

    let len = text.chars().count();
    if len > limit {
        return Err(TtsError::TextTooLong {
            provider: provider.to_string(),
            len,
            limit,
        });
    }

    Ok(())
}

// Both providers wrap error details in a JSON object; the field names differ.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<ErrorDetail>,
    #[serde(default)]
    detail: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message { message: String },
    Text(String),
}

fn extract_error_message(body: &str) -> String {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.detail));

    match detail {
        Some(ErrorDetail::Message { message }) => message,
        Some(ErrorDetail::Text(text)) => text,
        None => body.trim().to_string(),
    }
}

/// Map a non-success HTTP response to a typed error.
fn error_from_status(provider: &str, status: StatusCode, headers: &HeaderMap, body: &str) -> TtsError {
    let message = extract_error_message(body);

    match status.as_u16() {
        401 | 403 => TtsError::InvalidApiKey {
            provider: provider.to_string(),
        },
        429 => TtsError::RateLimited {
            retry_after: headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok()),
        },
        code @ 500..=599 => TtsError::ServerError {
            status: code,
            message,
        },
        code => TtsError::ApiError {
            message,
            status_code: Some(code),
        },
    }
}
