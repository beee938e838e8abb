use std::time::Duration;

use async_trait::async_trait;
use log::warn;

use crate::error::Result;

/// Base delay for exponential backoff between retries
const BASE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Longest computed backoff; a server's Retry-After is used as given
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Per-request synthesis options
#[derive(Debug, Clone, Default)]
pub struct SpeechOptions {
    /// Provider voice name or id (provider default when unset)
    pub voice: Option<String>,
    /// Provider model id (provider default when unset)
    pub model: Option<String>,
    /// Playback speed multiplier, where the provider supports it
    pub speed: Option<f32>,
}

impl SpeechOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the speed, clamped to the 0.25-4.0 range providers accept.
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = Some(speed.clamp(0.25, 4.0));
        self
    }
}

/// Trait for TTS providers
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Synthesize one piece of text, returning the encoded audio bytes
    async fn generate_speech(&self, text: &str, options: &SpeechOptions) -> Result<Vec<u8>>;

    /// Largest text length (in characters) a single request may carry
    fn max_chunk_size(&self) -> usize;

    /// Check the configured credentials against the provider
    ///
    /// Returns `Ok(false)` when the provider rejects the key, and an error
    /// when the check itself could not be carried out.
    async fn validate_api_key(&self) -> Result<bool>;

    /// Get the provider name for display
    fn name(&self) -> &'static str;
}

/// Synthesize with retries for transient failures.
///
/// Rate limits honour the server's `Retry-After`; other retryable errors back
/// off exponentially from 500ms, capped at 30s. Non-retryable errors return
/// immediately.
pub async fn generate_with_retry(
    provider: &dyn TtsProvider,
    text: &str,
    options: &SpeechOptions,
    max_retries: u32,
) -> Result<Vec<u8>> {
    let mut attempt = 0;

    loop {
        match provider.generate_speech(text, options).await {
            Ok(audio) => return Ok(audio),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = e.retry_after().unwrap_or_else(|| backoff_delay(attempt));
                warn!(
                    "{} request failed (attempt {}/{}): {}. Retrying in {:?}",
                    provider.name(),
                    attempt + 1,
                    max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Exponential backoff for the given zero-based retry attempt.
fn backoff_delay(attempt: u32) -> Duration {
    BASE_RETRY_DELAY
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_RETRY_DELAY)
}
