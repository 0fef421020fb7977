//! Error types for the sequencing engine

use cadence_voice::{DecodeError, PlaybackError, SynthesisError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SequenceError {
    /// The only unrecoverable input: a run needs at least one step.
    #[error("Cannot start a sequence with no steps")]
    EmptySequence,

    #[error("Invalid sequence settings: {0}")]
    InvalidSettings(String),

    #[error("Sequence has exited")]
    Exited,

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}
