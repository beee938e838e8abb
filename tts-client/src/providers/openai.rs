//! OpenAI speech provider
//!
//! Direct HTTP implementation for the `/v1/audio/speech` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{check_text, error_from_status};
use crate::config::ProviderConfig;
use crate::error::{Result, TtsError};
use crate::provider::{SpeechOptions, TtsProvider};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "tts-1";
const DEFAULT_VOICE: &str = "alloy";

/// The speech endpoint rejects inputs longer than this many characters.
const MAX_INPUT_CHARS: usize = 4096;

/// Provider for the OpenAI speech API
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    max_chunk_size: usize,
    client: Client,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider
    pub fn new(api_key: String, config: &ProviderConfig) -> Result<Self> {
        let client = Client::new();

        Ok(Self {
            api_key,
            base_url: config.base_url_or(OPENAI_API_URL),
            max_chunk_size: config
                .max_chunk_size
                .unwrap_or(MAX_INPUT_CHARS)
                .min(MAX_INPUT_CHARS),
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f32>,
}

#[async_trait]
impl TtsProvider for OpenAiProvider {
    async fn generate_speech(&self, text: &str, options: &SpeechOptions) -> Result<Vec<u8>> {
        check_text(self.name(), text, self.max_chunk_size)?;

        let request = SpeechRequest {
            model: options.model.as_deref().unwrap_or(DEFAULT_MODEL),
            input: text,
            voice: options.voice.as_deref().unwrap_or(DEFAULT_VOICE),
            response_format: "mp3",
            speed: options.speed,
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TtsError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_status(self.name(), status, &headers, &body));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| TtsError::Network(format!("Failed to read audio body: {}", e)))?;

        Ok(audio.to_vec())
    }

    fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    async fn validate_api_key(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| TtsError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        match error_from_status(self.name(), status, &headers, &body) {
            TtsError::InvalidApiKey { .. } => Ok(false),
            other => Err(other),
        }
    }

    fn name(&self) -> &'static str {
        "OpenAI"
    }
}
