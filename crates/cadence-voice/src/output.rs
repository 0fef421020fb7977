//! **Audio Output Service**: decode, play and stop announcement clips and alarms.
//!
//! [`AudioContext`] owns the process-wide output device: open it once in `main`, hand
//! [`RodioOutput`]s to whoever needs to play, drop it on exit. [`SimulatedOutput`] plays nothing
//! but honours the same timing and stop contracts, for silent runs and tests.

use crate::alarm::AlarmSound;
use crate::audio::{decode_pcm16, AudioBuffer};
use crate::error::{DecodeError, PlaybackError};
use crate::playback::{Playback, StopHandle};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Sample rate used when rendering alarm tones.
pub const ALARM_SAMPLE_RATE: u32 = 44_100;

/// Playback backend injected into the sequencing engine.
pub trait AudioOutput: Send + Sync {
    /// Interpret speech service bytes as a playable buffer.
    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer, DecodeError> {
        decode_pcm16(bytes)
    }

    /// Start playing immediately at `volume` (0.0..=1.0).
    fn play(&self, buffer: &AudioBuffer, volume: f32) -> Result<Playback, PlaybackError>;

    /// Start an alarm; its completion resolves after [`AlarmSound::duration`].
    fn play_alarm(&self, sound: AlarmSound, volume: f32) -> Result<Playback, PlaybackError>;
}

/// Process-wide audio device state.
pub struct AudioContext {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl AudioContext {
    /// Open the default output device.
    pub fn open_default() -> Result<Self, PlaybackError> {
        let (stream, handle) = OutputStream::try_default()?;
        info!("🔊 AudioContext: default output device opened");
        Ok(Self {
            _stream: stream,
            handle,
        })
    }

    /// Playback backend bound to this device. Valid while the context is alive.
    pub fn output(&self) -> RodioOutput {
        RodioOutput {
            handle: self.handle.clone(),
        }
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        info!("AudioContext: output device closed");
    }
}

/// Plays through a rodio `Sink` per request, so every playback can be stopped on its own.
#[derive(Clone)]
pub struct RodioOutput {
    handle: OutputStreamHandle,
}

impl RodioOutput {
    fn play_samples(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
        volume: f32,
    ) -> Result<Playback, PlaybackError> {
        let sink = Arc::new(Sink::try_new(&self.handle)?);
        sink.set_volume(volume.clamp(0.0, 1.0));
        sink.append(SamplesBuffer::new(1, sample_rate, samples));

        let stop_sink = Arc::clone(&sink);
        let playback = Playback::new(move || stop_sink.stop());
        let finisher = playback.stop.clone();
        tokio::task::spawn_blocking(move || {
            sink.sleep_until_end();
            finisher.mark_finished();
        });
        Ok(playback)
    }
}

impl AudioOutput for RodioOutput {
    fn play(&self, buffer: &AudioBuffer, volume: f32) -> Result<Playback, PlaybackError> {
        debug!(samples = buffer.len(), volume, "playing announcement");
        self.play_samples(buffer.samples().to_vec(), buffer.sample_rate(), volume)
    }

    fn play_alarm(&self, sound: AlarmSound, volume: f32) -> Result<Playback, PlaybackError> {
        debug!(%sound, volume, "playing alarm");
        self.play_samples(sound.render(ALARM_SAMPLE_RATE), ALARM_SAMPLE_RATE, volume)
    }
}

/// One request observed by [`SimulatedOutput`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlayRecord {
    Voice { samples: usize, volume: f32 },
    Alarm { sound: AlarmSound, volume: f32 },
}

#[derive(Default)]
struct SimulatedState {
    records: Vec<PlayRecord>,
    handles: Vec<StopHandle>,
}

/// Device-free output: each playback lasts as long as the real audio would, on tokio time.
#[derive(Clone, Default)]
pub struct SimulatedOutput {
    state: Arc<Mutex<SimulatedState>>,
    fail_voice: bool,
    fail_alarms: bool,
    keep_records: bool,
}

impl SimulatedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep a [`PlayRecord`] per request, readable through [`records`](Self::records).
    pub fn with_records(mut self) -> Self {
        self.keep_records = true;
        self
    }

    /// Every `play` call fails with a device error.
    pub fn with_failing_voice(mut self) -> Self {
        self.fail_voice = true;
        self
    }

    /// Every `play_alarm` call fails with a device error.
    pub fn with_failing_alarms(mut self) -> Self {
        self.fail_alarms = true;
        self
    }

    /// Requests seen so far, in order. Empty unless built [`with_records`](Self::with_records).
    pub fn records(&self) -> Vec<PlayRecord> {
        self.lock().records.clone()
    }

    /// Playbacks neither finished nor stopped.
    pub fn active_count(&self) -> usize {
        self.lock()
            .handles
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self, record: PlayRecord, length: Duration) -> Playback {
        let playback = Playback::new(|| {});
        let finisher = playback.stop.clone();
        {
            let mut state = self.lock();
            if self.keep_records {
                state.records.push(record);
            }
            state.handles.retain(|h| !h.is_finished());
            state.handles.push(playback.stop.clone());
        }
        tokio::spawn(async move {
            tokio::time::sleep(length).await;
            finisher.mark_finished();
        });
        playback
    }
}

impl AudioOutput for SimulatedOutput {
    fn play(&self, buffer: &AudioBuffer, volume: f32) -> Result<Playback, PlaybackError> {
        if self.fail_voice {
            return Err(PlaybackError::Device("simulated device failure".to_string()));
        }
        let record = PlayRecord::Voice {
            samples: buffer.len(),
            volume,
        };
        Ok(self.start(record, buffer.duration()))
    }

    fn play_alarm(&self, sound: AlarmSound, volume: f32) -> Result<Playback, PlaybackError> {
        if self.fail_alarms {
            return Err(PlaybackError::Device("simulated device failure".to_string()));
        }
        Ok(self.start(PlayRecord::Alarm { sound, volume }, sound.duration()))
    }
}
