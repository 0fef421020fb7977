//! Decoded announcement audio.
//!
//! The speech service returns raw little-endian 16-bit signed PCM, mono, at 24 kHz.
//! [`decode_pcm16`] turns that payload into an [`AudioBuffer`] of normalized `f32`
//! samples that any [`AudioOutput`](crate::output::AudioOutput) can play.

use crate::error::DecodeError;
use std::sync::Arc;
use std::time::Duration;

/// Sample rate of synthesized speech (Hz).
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

/// Immutable mono sample buffer. Cloning shares the samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length at the buffer's sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Decode raw PCM16 LE mono bytes at [`SPEECH_SAMPLE_RATE`].
///
/// A trailing odd byte is dropped. Samples are scaled by 1/32768 into [-1.0, 1.0).
pub fn decode_pcm16(bytes: &[u8]) -> Result<AudioBuffer, DecodeError> {
    let samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();
    if samples.is_empty() {
        return Err(DecodeError::Empty(bytes.len()));
    }
    Ok(AudioBuffer::new(samples, SPEECH_SAMPLE_RATE))
}
