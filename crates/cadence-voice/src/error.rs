//! Error types for speech and audio output

use std::time::Duration;
use thiserror::Error;

/// A single attempt exceeded its time budget.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("attempt timed out after {0:?}")]
pub struct AttemptTimedOut(pub Duration);

/// Failures while turning an announcement descriptor into audio bytes.
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Speech request failed: {0}")]
    Request(String),

    #[error("Speech API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Speech service returned no audio")]
    EmptyAudio,

    #[error("Speech request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Speech service not configured: {0}")]
    Config(String),

    #[error("Speech synthesis failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<SynthesisError>,
    },
}

impl From<AttemptTimedOut> for SynthesisError {
    fn from(err: AttemptTimedOut) -> Self {
        SynthesisError::Timeout(err.0)
    }
}

impl From<reqwest::Error> for SynthesisError {
    fn from(err: reqwest::Error) -> Self {
        SynthesisError::Request(err.to_string())
    }
}

/// Malformed or truncated audio bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Audio payload contains no samples ({0} bytes)")]
    Empty(usize),
}

/// Failures while transcribing recorded audio into text.
#[derive(Error, Debug)]
pub enum TranscriptionError {
    #[error("Transcription request failed: {0}")]
    Request(String),

    #[error("Transcription API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Transcription returned no text")]
    Empty,

    #[error("Transcription timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transcription unavailable: {0}")]
    Unavailable(String),

    #[error("Transcription failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<TranscriptionError>,
    },
}

impl From<AttemptTimedOut> for TranscriptionError {
    fn from(err: AttemptTimedOut) -> Self {
        TranscriptionError::Timeout(err.0)
    }
}

impl From<reqwest::Error> for TranscriptionError {
    fn from(err: reqwest::Error) -> Self {
        TranscriptionError::Request(err.to_string())
    }
}

/// Audio device or playback failures.
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Audio playback error: {0}")]
    Sink(String),
}

impl From<rodio::StreamError> for PlaybackError {
    fn from(err: rodio::StreamError) -> Self {
        PlaybackError::Device(err.to_string())
    }
}

impl From<rodio::PlayError> for PlaybackError {
    fn from(err: rodio::PlayError) -> Self {
        PlaybackError::Sink(err.to_string())
    }
}
