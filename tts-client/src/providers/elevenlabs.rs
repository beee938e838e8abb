//! ElevenLabs speech provider

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{check_text, error_from_status};
use crate::config::ProviderConfig;
use crate::error::{Result, TtsError};
use crate::provider::{SpeechOptions, TtsProvider};

const ELEVENLABS_API_URL: &str = "https://api.elevenlabs.io/v1";
const DEFAULT_MODEL: &str = "eleven_multilingual_v2";
// "Rachel", one of the stock voices available to every account
const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";
const OUTPUT_FORMAT: &str = "mp3_44100_128";

const MAX_INPUT_CHARS: usize = 5000;

/// Provider for the ElevenLabs text-to-speech API
pub struct ElevenLabsProvider {
    api_key: String,
    base_url: String,
    max_chunk_size: usize,
    client: Client,
}

impl ElevenLabsProvider {
    pub fn new(api_key: String, config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            api_key,
            base_url: config.base_url_or(ELEVENLABS_API_URL),
            max_chunk_size: config
                .max_chunk_size
                .unwrap_or(MAX_INPUT_CHARS)
                .min(MAX_INPUT_CHARS),
            client: Client::new(),
        })
    }
}

#[derive(Debug, Serialize)]
struct TextToSpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_settings: Option<VoiceSettings>,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    speed: f32,
}

#[async_trait]
impl TtsProvider for ElevenLabsProvider {
    async fn generate_speech(&self, text: &str, options: &SpeechOptions) -> Result<Vec<u8>> {
        check_text(self.name(), text, self.max_chunk_size)?;

        let voice_id = options.voice.as_deref().unwrap_or(DEFAULT_VOICE_ID);
        let request = TextToSpeechRequest {
            text,
            model_id: options.model.as_deref().unwrap_or(DEFAULT_MODEL),
            // ElevenLabs accepts a narrower speed range than the options allow
            voice_settings: options.speed.map(|speed| VoiceSettings {
                speed: speed.clamp(0.7, 1.2),
            }),
        };

        let response = self
            .client
            .post(format!("{}/text-to-speech/{}", self.base_url, voice_id))
            .query(&[("output_format", OUTPUT_FORMAT)])
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
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
            .get(format!("{}/user", self.base_url))
            .header("xi-api-key", &self.api_key)
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
        "ElevenLabs"
    }
}
