//! gen-speech configuration management.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tts_client::{ProviderConfig, ProviderKind};

use crate::convert::DEFAULT_MAX_RETRIES;
use crate::storage::default_data_dir;

const DEFAULT_PROVIDER: &str = "openai";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenSpeechConfig {
    /// Provider used when none is given on the command line
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Default voice (provider default when unset)
    #[serde(default)]
    pub voice: Option<String>,

    /// Default model (provider default when unset)
    #[serde(default)]
    pub model: Option<String>,

    /// Chunk size cap in characters; never exceeds the provider's limit
    #[serde(default)]
    pub max_chunk_size: Option<usize>,

    /// Where conversions and audio are stored
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Retries per chunk for rate limits, timeouts and server errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// ffmpeg binary; searched on PATH when unset
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// ffprobe binary; searched on PATH when unset
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,

    /// Per-provider settings, keyed by provider name
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for GenSpeechConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            voice: None,
            model: None,
            max_chunk_size: None,
            data_dir: None,
            max_retries: default_max_retries(),
            ffmpeg_path: None,
            ffprobe_path: None,
            providers: BTreeMap::new(),
        }
    }
}

impl GenSpeechConfig {
    /// Get the config file path: ~/.config/cli-programs/gen-speech.toml
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("cli-programs")
            .join("gen-speech.toml"))
    }

    /// Load config from file, returning default if file doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: GenSpeechConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Provider to use, `override_name` taking precedence over the config.
    pub fn provider_kind(&self, override_name: Option<&str>) -> Result<ProviderKind> {
        let name = override_name.unwrap_or(&self.provider);
        Ok(ProviderKind::from_str(name)?)
    }

    /// Settings table for a provider, if any.
    pub fn provider_config(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.get(kind.as_str())
    }

    /// Configured data directory, or the platform default.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GenSpeechConfig::default();
        assert_eq!(config.provider, "openai");
        assert!(config.voice.is_none());
        assert!(config.max_chunk_size.is_none());
        assert!(config.providers.is_empty());
        assert_eq!(config.provider_kind(None).unwrap(), ProviderKind::OpenAi);
    }

    #[test]
    fn test_config_path() {
        let path = GenSpeechConfig::config_path();
        assert!(path.is_ok());
        let path = path.unwrap();
        assert!(path.ends_with("cli-programs/gen-speech.toml"));
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
provider = "elevenlabs"
voice = "Rachel"
max_chunk_size = 2000
data_dir = "/var/lib/gen-speech"
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"

[providers.elevenlabs]
api_key = "xi-test"

[providers.openai]
base_url = "https://proxy.example.com/v1"
"#;
        let config: GenSpeechConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.voice.as_deref(), Some("Rachel"));
        assert_eq!(config.max_chunk_size, Some(2000));
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/var/lib/gen-speech"));
        assert_eq!(config.ffmpeg_path, Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")));
        assert!(config.ffprobe_path.is_none());

        let kind = config.provider_kind(None).unwrap();
        assert_eq!(kind, ProviderKind::ElevenLabs);
        assert_eq!(
            config.provider_config(kind).and_then(|p| p.api_key.as_deref()),
            Some("xi-test")
        );
        assert!(config.provider_config(ProviderKind::Mock).is_none());
    }

    #[test]
    fn test_parse_empty_config() {
        let config: GenSpeechConfig = toml::from_str("").unwrap();
        assert_eq!(config.provider, "openai");
        assert!(config.model.is_none());
        assert_eq!(config.max_retries, 3);

        let config: GenSpeechConfig = toml::from_str("max_retries = 0").unwrap();
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_provider_override() {
        let config = GenSpeechConfig::default();
        assert_eq!(config.provider_kind(Some("mock")).unwrap(), ProviderKind::Mock);
        assert!(config.provider_kind(Some("nope")).is_err());
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let mut config = GenSpeechConfig::default();
        config.voice = Some("nova".to_string());
        config.providers.insert(
            "openai".to_string(),
            ProviderConfig {
                api_key: Some("sk-test".to_string()),
                ..Default::default()
            },
        );

        let content = toml::to_string_pretty(&config).unwrap();
        let parsed: GenSpeechConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed.voice.as_deref(), Some("nova"));
        assert_eq!(
            parsed.provider_config(ProviderKind::OpenAi).and_then(|p| p.api_key.as_deref()),
            Some("sk-test")
        );
    }
}
