//! # Cadence Voice - Announcements and Alarms
//!
//! External collaborators of the sequencing engine:
//!
//! - **Speech Service** ([`SpeechService`]): synthesizes step and completion announcements as raw
//!   24 kHz PCM and transcribes short recordings into step names.
//! - **Audio Output Service** ([`AudioOutput`]): decodes PCM into [`AudioBuffer`]s, plays them at a
//!   volume with a single-resolution [`Playback`] handle, and plays the four fixed alarm patterns.
//!
//! ```text
//!  step name ──► SpeechService ──► PCM bytes ──► AudioOutput::decode ──► AudioBuffer
//!                                                                          │
//!                       Completion ◄── Playback ◄── AudioOutput::play ◄────┘
//!                       StopHandle ──► stop()
//! ```

pub mod alarm;
pub mod audio;
pub mod error;
pub mod output;
pub mod phrases;
pub mod playback;
pub mod retry;
pub mod speech;

pub use alarm::AlarmSound;
pub use audio::{decode_pcm16, AudioBuffer, SPEECH_SAMPLE_RATE};
pub use error::{AttemptTimedOut, DecodeError, PlaybackError, SynthesisError, TranscriptionError};
pub use output::{AudioContext, AudioOutput, PlayRecord, RodioOutput, SimulatedOutput};
pub use phrases::{clean_transcript, format_duration, step_announcement, COMPLETION_ANNOUNCEMENT};
pub use playback::{Completion, Playback, StopHandle};
pub use retry::{retry_with_backoff, Exhausted, RetryPolicy};
pub use speech::{
    create_speech_service, OpenAiSpeech, PlaceholderSpeech, SpeechService, SpeechSettings,
};
