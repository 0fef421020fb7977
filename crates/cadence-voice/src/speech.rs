//! **Speech Service**: announcement synthesis and step-name transcription.
//!
//! [`SpeechService`] is the seam the sequencing engine talks to. [`OpenAiSpeech`] targets any
//! OpenAI-compatible API (`/audio/speech` with raw PCM output, `/audio/transcriptions`) and applies
//! the retry policies from [`crate::retry`] internally. [`PlaceholderSpeech`] keeps the pipeline
//! running offline with short silent clips.

use crate::audio::SPEECH_SAMPLE_RATE;
use crate::error::{SynthesisError, TranscriptionError};
use crate::phrases::{step_announcement, COMPLETION_ANNOUNCEMENT};
use crate::retry::{retry_with_backoff, RetryPolicy};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Remote (or local) speech backend.
///
/// Synthesis returns raw PCM16 LE mono at 24 kHz, ready for
/// [`decode_pcm16`](crate::audio::decode_pcm16).
#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Announce a step by name and human-readable duration.
    async fn synthesize_step_announcement(
        &self,
        step_name: &str,
        duration_seconds: u32,
    ) -> Result<Vec<u8>, SynthesisError>;

    /// Fixed closing phrase after the last step.
    async fn synthesize_completion_announcement(&self) -> Result<Vec<u8>, SynthesisError>;

    /// Short transcription used to name a step by voice.
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, TranscriptionError>;
}

/// Connection settings for [`OpenAiSpeech`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechSettings {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    /// Bearer API key. `None` selects the placeholder backend.
    pub api_key: Option<String>,
    /// TTS model: tts-1 or tts-1-hd.
    pub tts_model: String,
    /// Voice id (alloy, echo, fable, onyx, nova, shimmer).
    pub voice: String,
    /// Transcription model, e.g. whisper-1.
    pub stt_model: String,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            tts_model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            stt_model: "whisper-1".to_string(),
        }
    }
}

impl SpeechSettings {
    /// Build from environment: SPEECH_API_URL, SPEECH_API_KEY (or OPENAI_API_KEY), TTS_MODEL, TTS_VOICE, STT_MODEL.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            base_url: var("SPEECH_API_URL").unwrap_or(defaults.base_url),
            api_key: var("SPEECH_API_KEY").or_else(|| var("OPENAI_API_KEY")),
            tts_model: var("TTS_MODEL").unwrap_or(defaults.tts_model),
            voice: var("TTS_VOICE").unwrap_or(defaults.voice),
            stt_model: var("STT_MODEL").unwrap_or(defaults.stt_model),
        }
    }
}

/// OpenAI-compatible speech backend (OpenAI, OpenRouter, local servers with the same API).
#[derive(Debug, Clone)]
pub struct OpenAiSpeech {
    base_url: String,
    api_key: String,
    tts_model: String,
    voice: String,
    stt_model: String,
    client: reqwest::Client,
}

impl OpenAiSpeech {
    pub fn new(settings: &SpeechSettings) -> Result<Self, SynthesisError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| SynthesisError::Config("speech requires an API key".to_string()))?;
        // Per-attempt limits come from RetryPolicy; the client itself has no timeout.
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SynthesisError::Config(e.to_string()))?;
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            tts_model: settings.tts_model.clone(),
            voice: settings.voice.clone(),
            stt_model: settings.stt_model.clone(),
            client,
        })
    }

    pub fn from_env() -> Result<Self, SynthesisError> {
        Self::new(&SpeechSettings::from_env())
    }

    async fn synthesize_once(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let url = format!("{}/audio/speech", self.base_url);
        let body = serde_json::json!({
            "model": self.tts_model,
            "input": text,
            "voice": self.voice,
            "response_format": "pcm",
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(SynthesisError::Api { status, body });
        }
        let bytes = res.bytes().await?;
        if bytes.len() < 2 {
            return Err(SynthesisError::EmptyAudio);
        }
        Ok(bytes.to_vec())
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        debug!(text, "synthesizing announcement");
        retry_with_backoff(&RetryPolicy::SYNTHESIS, "synthesize", |_| {
            self.synthesize_once(text)
        })
        .await
        .map_err(|e| SynthesisError::Exhausted {
            attempts: e.attempts,
            last: Box::new(e.last),
        })
    }

    async fn transcribe_once(&self, audio: &[u8], mime_type: &str) -> Result<String, TranscriptionError> {
        let url = format!("{}/audio/transcriptions", self.base_url);
        let ext = mime_guess::get_mime_extensions_str(mime_type)
            .and_then(|exts| exts.first().copied())
            .unwrap_or("bin");
        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(format!("recording.{}", ext))
            .mime_str(mime_type)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.stt_model.clone());
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(TranscriptionError::Api { status, body });
        }
        let json: serde_json::Value = res.json().await?;
        let text = json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if text.is_empty() {
            return Err(TranscriptionError::Empty);
        }
        Ok(text)
    }
}

#[async_trait]
impl SpeechService for OpenAiSpeech {
    async fn synthesize_step_announcement(
        &self,
        step_name: &str,
        duration_seconds: u32,
    ) -> Result<Vec<u8>, SynthesisError> {
        self.synthesize(&step_announcement(step_name, duration_seconds))
            .await
    }

    async fn synthesize_completion_announcement(&self) -> Result<Vec<u8>, SynthesisError> {
        self.synthesize(COMPLETION_ANNOUNCEMENT).await
    }

    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, TranscriptionError> {
        if audio.is_empty() {
            return Err(TranscriptionError::Empty);
        }
        retry_with_backoff(&RetryPolicy::TRANSCRIPTION, "transcribe", |_| {
            self.transcribe_once(audio, mime_type)
        })
        .await
        .map_err(|e| TranscriptionError::Exhausted {
            attempts: e.attempts,
            last: Box::new(e.last),
        })
    }
}

/// Offline backend: half a second of silence per announcement, no transcription.
#[derive(Debug, Default, Clone)]
pub struct PlaceholderSpeech;

impl PlaceholderSpeech {
    const CLIP_SAMPLES: usize = (SPEECH_SAMPLE_RATE / 2) as usize;

    fn silent_clip() -> Vec<u8> {
        vec![0u8; Self::CLIP_SAMPLES * 2]
    }
}

#[async_trait]
impl SpeechService for PlaceholderSpeech {
    async fn synthesize_step_announcement(
        &self,
        step_name: &str,
        duration_seconds: u32,
    ) -> Result<Vec<u8>, SynthesisError> {
        debug!(
            text = %step_announcement(step_name, duration_seconds),
            "placeholder speech"
        );
        Ok(Self::silent_clip())
    }

    async fn synthesize_completion_announcement(&self) -> Result<Vec<u8>, SynthesisError> {
        Ok(Self::silent_clip())
    }

    async fn transcribe(&self, _audio: &[u8], _mime_type: &str) -> Result<String, TranscriptionError> {
        Err(TranscriptionError::Unavailable(
            "no speech API key configured".to_string(),
        ))
    }
}

/// Pick the best available backend: OpenAI-compatible API when a key is set, else the placeholder.
pub fn create_speech_service(settings: &SpeechSettings) -> Arc<dyn SpeechService> {
    if settings.api_key.is_some() {
        match OpenAiSpeech::new(settings) {
            Ok(speech) => {
                info!(base_url = %speech.base_url, voice = %speech.voice, "🗣️ Speech service ready");
                return Arc::new(speech);
            }
            Err(e) => warn!(error = %e, "speech backend unavailable, using placeholder"),
        }
    } else {
        info!("No speech API key configured; announcements will be silent");
    }
    Arc::new(PlaceholderSpeech)
}
