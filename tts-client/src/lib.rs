//! Text-to-speech provider clients for the gen-speech workspace
//!
//! Provides a unified interface for hosted TTS providers:
//! - OpenAI (`/v1/audio/speech`)
//! - ElevenLabs (`/v1/text-to-speech`)
//! - Mock (offline, deterministic audio for tests and dry runs)

pub mod config;
pub mod error;
pub mod provider;
pub mod providers;

pub use config::ProviderConfig;
pub use error::{Result, TtsError};
pub use provider::{SpeechOptions, TtsProvider, generate_with_retry};
pub use providers::{MockProvider, ProviderKind, get_provider};
