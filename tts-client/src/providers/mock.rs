//! Mock TTS provider for testing
//!
//! Produces silent PCM WAV clips whose length follows the input text, and can
//! simulate failures for retry tests.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::check_text;
use crate::error::{Result, TtsError};
use crate::provider::{SpeechOptions, TtsProvider};

/// Sample rate of generated clips
pub const MOCK_SAMPLE_RATE: u32 = 16_000;

const DEFAULT_MAX_CHUNK_SIZE: usize = 1000;

/// Roughly how long a spoken word lasts
const MS_PER_WORD: u32 = 300;

/// A mock provider for testing retry and orchestration behavior
pub struct MockProvider {
    /// Number of times to fail before succeeding (0 = always succeed)
    fail_count: AtomicUsize,
    /// Current call count
    call_count: AtomicUsize,
    /// Error to return on failure (None = always succeed)
    fail_with: Mutex<Option<TtsError>>,
    /// Texts received, in call order
    received: Mutex<Vec<String>>,
    max_chunk_size: usize,
}

impl MockProvider {
    /// Create a provider that fails `n` times with the given error, then succeeds
    pub fn fails_then_succeeds(n: usize, error: TtsError) -> Self {
        Self {
            fail_count: AtomicUsize::new(n),
            call_count: AtomicUsize::new(0),
            fail_with: Mutex::new(Some(error)),
            received: Mutex::new(Vec::new()),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }

    /// Create a provider that always fails with the given error
    pub fn always_fails(error: TtsError) -> Self {
        Self::fails_then_succeeds(usize::MAX, error)
    }

    /// Create a provider that always succeeds
    pub fn always_succeeds() -> Self {
        Self {
            fail_count: AtomicUsize::new(0),
            call_count: AtomicUsize::new(0),
            fail_with: Mutex::new(None),
            received: Mutex::new(Vec::new()),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }

    /// Set the per-request text limit this provider advertises
    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    /// Get the number of times generate_speech() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Texts passed to successful and failed calls alike, in order
    pub fn received(&self) -> Vec<String> {
        self.received
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TtsProvider for MockProvider {
    async fn generate_speech(&self, text: &str, _options: &SpeechOptions) -> Result<Vec<u8>> {
        let call_num = self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut received) = self.received.lock() {
            received.push(text.to_string());
        }

        if call_num < self.fail_count.load(Ordering::SeqCst) {
            if let Ok(error) = self.fail_with.lock() {
                if let Some(err) = error.as_ref() {
                    return Err(clone_error(err));
                }
            }
        }

        check_text(self.name(), text, self.max_chunk_size)?;

        let words = text.split_whitespace().count() as u32;
        Ok(silent_wav(words.max(1) * MS_PER_WORD))
    }

    fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    async fn validate_api_key(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Build a 16-bit mono PCM WAV file of silence.
pub fn silent_wav(duration_ms: u32) -> Vec<u8> {
    let samples = MOCK_SAMPLE_RATE / 1000 * duration_ms;
    let data_len = samples * 2;
    let mut wav = Vec::with_capacity(44 + data_len as usize);

    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&MOCK_SAMPLE_RATE.to_le_bytes());
    wav.extend_from_slice(&(MOCK_SAMPLE_RATE * 2).to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.resize(44 + data_len as usize, 0);

    wav
}

/// Clone a TtsError (needed because TtsError doesn't implement Clone)
fn clone_error(err: &TtsError) -> TtsError {
    match err {
        TtsError::MissingApiKey { provider, env_var } => TtsError::MissingApiKey {
            provider: provider.clone(),
            env_var: env_var.clone(),
        },
        TtsError::InvalidApiKey { provider } => TtsError::InvalidApiKey {
            provider: provider.clone(),
        },
        TtsError::RateLimited { retry_after } => TtsError::RateLimited {
            retry_after: *retry_after,
        },
        TtsError::ServerError { status, message } => TtsError::ServerError {
            status: *status,
            message: message.clone(),
        },
        TtsError::ApiError {
            message,
            status_code,
        } => TtsError::ApiError {
            message: message.clone(),
            status_code: *status_code,
        },
        TtsError::Network(s) => TtsError::Network(s.clone()),
        TtsError::EmptyText => TtsError::EmptyText,
        TtsError::TextTooLong {
            provider,
            len,
            limit,
        } => TtsError::TextTooLong {
            provider: provider.clone(),
            len: *len,
            limit: *limit,
        },
        TtsError::ConfigError(s) => TtsError::ConfigError(s.clone()),
    }
}
