//! Layered CLI configuration: defaults, optional TOML file, then `CADENCE__*` environment.

use cadence_core::SequenceSettings;
use cadence_voice::{AlarmSound, SpeechSettings};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "config/cadence.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct CadenceConfig {
    /// Directory holding the routine store.
    pub storage_path: String,
    pub speech_api_url: String,
    /// Falls back to SPEECH_API_KEY / OPENAI_API_KEY when unset.
    #[serde(default)]
    pub speech_api_key: Option<String>,
    pub tts_model: String,
    pub tts_voice: String,
    pub stt_model: String,
    pub alarm_sound: AlarmSound,
    pub alarm_volume: f32,
    pub voice_volume: f32,
    pub buffer_seconds: u32,
}

impl CadenceConfig {
    /// Load config. Precedence: env `CADENCE__*` > file at `CADENCE_CONFIG` (or `config/cadence.toml`) > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = std::env::var("CADENCE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load with an explicit file path; a missing file is skipped.
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .set_default("storage_path", "./data")?
            .set_default("speech_api_url", "https://api.openai.com/v1")?
            .set_default("tts_model", "tts-1")?
            .set_default("tts_voice", "alloy")?
            .set_default("stt_model", "whisper-1")?
            .set_default("alarm_sound", "bell")?
            .set_default("alarm_volume", 0.8)?
            .set_default("voice_volume", 1.0)?
            .set_default("buffer_seconds", 0_i64)?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("CADENCE").separator("__"))
            .build()?;

        built.try_deserialize()
    }

    pub fn storage_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage_path)
    }

    pub fn speech_settings(&self) -> SpeechSettings {
        let env = SpeechSettings::from_env();
        SpeechSettings {
            base_url: self.speech_api_url.clone(),
            api_key: self
                .speech_api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .or(env.api_key),
            tts_model: self.tts_model.clone(),
            voice: self.tts_voice.clone(),
            stt_model: self.stt_model.clone(),
        }
    }

    /// Settings for ad-hoc runs, before command-line overrides.
    pub fn sequence_defaults(&self) -> SequenceSettings {
        SequenceSettings {
            alarm_sound: self.alarm_sound,
            alarm_volume: self.alarm_volume,
            buffer_seconds: self.buffer_seconds,
            voice_volume: self.voice_volume,
        }
    }
}
