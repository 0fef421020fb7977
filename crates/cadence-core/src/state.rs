//! Run state, observable snapshots and events.

use crate::tick::TickHandle;
use cadence_voice::StopHandle;
use std::fmt;

/// Phase of the sequencing state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    PreparingAudio,
    Announcing,
    Countdown,
    Buffer,
    CompletionAnnouncement,
    Completed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::PreparingAudio => "preparing",
            Phase::Announcing => "announcing",
            Phase::Countdown => "countdown",
            Phase::Buffer => "buffer",
            Phase::CompletionAnnouncement => "completion",
            Phase::Completed => "completed",
        }
    }

    /// Phases driven by a running tick, the only ones that can pause.
    pub fn is_timed(self) -> bool {
        matches!(self, Phase::Countdown | Phase::Buffer)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by the sequence controller
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceEvent {
    /// Entered a new phase. During `Buffer`, `index` is the upcoming step.
    PhaseChanged { index: usize, phase: Phase },

    /// One second elapsed in `Countdown` or `Buffer`
    Tick { index: usize, remaining: u32 },

    Paused { remaining: u32 },

    Resumed { remaining: u32 },

    /// User abandoned `phase` at `index`
    Skipped { index: usize, phase: Phase },

    /// Transient, auto-expiring message (e.g. announcement unavailable)
    Notice { message: String },

    NoticeCleared,

    /// Run torn down; nothing further is emitted
    Exited,
}

/// Point-in-time view of the run for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    pub index: usize,
    pub step_count: usize,
    /// `None` once the index reaches the completion sentinel.
    pub step_name: Option<String>,
    pub phase: Phase,
    pub remaining_seconds: u32,
    pub paused: bool,
    pub generation: u64,
    pub notice: Option<String>,
    pub exited: bool,
}

/// Mutable run state, owned by the controller.
pub(crate) struct RunState {
    pub current_index: usize,
    pub phase: Phase,
    pub remaining_seconds: u32,
    pub paused: bool,
    pub generation: u64,
    pub notice: Option<String>,
    pub notice_seq: u64,
    pub active_playback: Option<StopHandle>,
    pub active_tick: Option<TickHandle>,
    pub exited: bool,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            current_index: 0,
            phase: Phase::PreparingAudio,
            remaining_seconds: 0,
            paused: false,
            generation: 0,
            notice: None,
            notice_seq: 0,
            active_playback: None,
            active_tick: None,
            exited: false,
        }
    }

    /// Whether work started under `generation` may still touch the state.
    pub fn is_live(&self, generation: u64) -> bool {
        !self.exited && self.generation == generation
    }

    /// Stop the active playback and tick, if any.
    pub fn release_active(&mut self) {
        if let Some(stop) = self.active_playback.take() {
            stop.stop();
        }
        if let Some(tick) = self.active_tick.take() {
            tick.cancel();
        }
    }
}
