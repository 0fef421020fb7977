//! **Sequence Controller**: drives steps through the phase state machine.
//!
//! Every phase-advancing call stops the active playback and tick, bumps `generation` and spawns
//! a continuation stamped with the new value. Continuations re-check their stamp under the state
//! lock after every await; a mismatch means the work was superseded and is dropped silently.
//!
//! ```text
//! PreparingAudio ─► Announcing ─► Countdown ─► (alarm) ─┬─► Buffer ─► PreparingAudio (next)
//!        │                            ▲                 └─► PreparingAudio (next)
//!        └──── announcement failed ───┘                 └─► CompletionAnnouncement ─► Completed
//! ```

use crate::cache::AnnouncementCache;
use crate::error::SequenceError;
use crate::state::{Phase, RunSnapshot, RunState, SequenceEvent};
use crate::step::{SequenceSettings, Step};
use crate::tick::{TickHandle, TickSource};
use cadence_voice::{AudioBuffer, AudioOutput, Completion, SpeechService};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// How long a transient notice stays visible.
pub const NOTICE_DURATION: Duration = Duration::from_secs(5);

struct Shared {
    steps: Arc<[Step]>,
    settings: SequenceSettings,
    audio: Arc<dyn AudioOutput>,
    cache: AnnouncementCache,
    state: Mutex<RunState>,
    events: mpsc::UnboundedSender<SequenceEvent>,
    snapshot: watch::Sender<RunSnapshot>,
}

/// Owns one run. Dropping it tears the run down like [`exit`](Self::exit).
pub struct SequenceController {
    shared: Arc<Shared>,
}

impl SequenceController {
    /// Validate the input and start at step 0. Must be called within a tokio runtime.
    pub fn start(
        steps: Vec<Step>,
        settings: SequenceSettings,
        speech: Arc<dyn SpeechService>,
        audio: Arc<dyn AudioOutput>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SequenceEvent>), SequenceError> {
        if steps.is_empty() {
            return Err(SequenceError::EmptySequence);
        }
        settings.validate()?;

        let steps: Arc<[Step]> = steps.into();
        let cache = AnnouncementCache::new(Arc::clone(&steps), speech, Arc::clone(&audio));
        let state = RunState::new();
        let (events, event_rx) = mpsc::unbounded_channel();
        let (snapshot, _) = watch::channel(snapshot_of(&steps, &state));
        let shared = Arc::new(Shared {
            steps,
            settings,
            audio,
            cache,
            state: Mutex::new(state),
            events,
            snapshot,
        });

        info!(
            steps = shared.steps.len(),
            buffer_seconds = shared.settings.buffer_seconds,
            alarm = %shared.settings.alarm_sound,
            "▶️ Sequence started"
        );
        {
            let mut st = shared.lock();
            shared.begin_locked(&mut st, 0);
        }
        Ok((Self { shared }, event_rx))
    }

    /// Freeze the running countdown or buffer. Returns whether anything was paused.
    pub fn pause(&self) -> bool {
        let shared = &self.shared;
        let mut st = shared.lock();
        if st.exited || st.paused || !st.phase.is_timed() {
            return false;
        }
        let Some(tick) = st.active_tick.take() else {
            return false;
        };
        tick.cancel();
        st.generation += 1;
        st.paused = true;
        info!(index = st.current_index, remaining = st.remaining_seconds, "⏸️ Paused");
        shared.emit(SequenceEvent::Paused {
            remaining: st.remaining_seconds,
        });
        shared.publish(&st);
        true
    }

    /// Continue a paused countdown or buffer from the frozen remaining value.
    pub fn resume(&self) -> bool {
        let shared = &self.shared;
        let mut st = shared.lock();
        if st.exited || !st.paused {
            return false;
        }
        st.paused = false;
        st.generation += 1;
        let generation = st.generation;
        let remaining = st.remaining_seconds;
        st.active_tick = Some(shared.start_tick(generation, remaining));
        info!(index = st.current_index, remaining, "▶️ Resumed");
        shared.emit(SequenceEvent::Resumed { remaining });
        shared.publish(&st);
        true
    }

    /// Abandon the current position and move on. Returns whether anything changed.
    pub fn skip(&self) -> bool {
        let shared = &self.shared;
        let mut st = shared.lock();
        if st.exited {
            return false;
        }
        let index = st.current_index;
        let phase = st.phase;
        match phase {
            Phase::Completed => return false,
            Phase::CompletionAnnouncement => {
                st.release_active();
                st.generation += 1;
                shared.emit(SequenceEvent::Skipped { index, phase });
                shared.finish_locked(&mut st);
            }
            // The buffer already points at the step it was waiting for.
            Phase::Buffer => {
                shared.emit(SequenceEvent::Skipped { index, phase });
                shared.begin_locked(&mut st, index);
            }
            _ => {
                shared.emit(SequenceEvent::Skipped { index, phase });
                shared.begin_locked(&mut st, index + 1);
            }
        }
        info!(index, %phase, "⏭️ Skipped");
        true
    }

    /// Tear the run down: stop audio and ticking, invalidate all in-flight work.
    pub fn exit(&self) {
        self.shared.exit();
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Watch the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.shared.snapshot.subscribe()
    }

    pub fn steps(&self) -> &[Step] {
        &self.shared.steps
    }

    pub fn cache(&self) -> &AnnouncementCache {
        &self.shared.cache
    }
}

impl Drop for SequenceController {
    fn drop(&mut self) {
        self.shared.exit();
    }
}

fn snapshot_of(steps: &[Step], st: &RunState) -> RunSnapshot {
    RunSnapshot {
        index: st.current_index,
        step_count: steps.len(),
        step_name: steps.get(st.current_index).map(|s| s.name.clone()),
        phase: st.phase,
        remaining_seconds: st.remaining_seconds,
        paused: st.paused,
        generation: st.generation,
        notice: st.notice.clone(),
        exited: st.exited,
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SequenceEvent) {
        // Nobody listening is fine; the snapshot channel still carries the state.
        let _ = self.events.send(event);
    }

    fn publish(&self, st: &RunState) {
        self.snapshot.send_replace(snapshot_of(&self.steps, st));
    }

    fn set_phase(&self, st: &mut RunState, phase: Phase) {
        st.phase = phase;
        info!(index = st.current_index, %phase, generation = st.generation, "phase");
        self.emit(SequenceEvent::PhaseChanged {
            index: st.current_index,
            phase,
        });
        self.publish(st);
    }

    /// Entry point for every phase-advancing transition.
    fn begin_locked(self: &Arc<Self>, st: &mut RunState, index: usize) {
        if st.exited {
            return;
        }
        st.release_active();
        st.generation += 1;
        let generation = st.generation;
        if st.notice.take().is_some() {
            self.emit(SequenceEvent::NoticeCleared);
        }
        st.paused = false;
        st.remaining_seconds = 0;

        let count = self.steps.len();
        st.current_index = index.min(count);
        if index < count {
            self.set_phase(st, Phase::PreparingAudio);
            tokio::spawn(Arc::clone(self).announce_step(index, generation));
        } else {
            self.set_phase(st, Phase::CompletionAnnouncement);
            tokio::spawn(Arc::clone(self).announce_completion(generation));
        }
    }

    /// Start playback and make it the active handle.
    fn play_locked(&self, st: &mut RunState, buffer: &AudioBuffer) -> Result<Completion, SequenceError> {
        let playback = self.audio.play(buffer, self.settings.voice_volume)?;
        let (completion, stop) = playback.into_parts();
        st.active_playback = Some(stop);
        Ok(completion)
    }

    async fn announce_step(self: Arc<Self>, index: usize, generation: u64) {
        let prepared = self.cache.get_or_fetch(index).await;

        let completion = {
            let mut st = self.lock();
            if !st.is_live(generation) {
                debug!(index, generation, "stale announcement discarded");
                return;
            }
            match prepared.and_then(|buffer| self.play_locked(&mut st, &buffer)) {
                Ok(completion) => {
                    self.set_phase(&mut st, Phase::Announcing);
                    Some(completion)
                }
                Err(e) => {
                    warn!(index, error = %e, "announcement unavailable, counting down silently");
                    self.show_notice_locked(&mut st, format!("Announcement unavailable: {}", e));
                    None
                }
            }
        };

        self.cache.spawn_ensure(index + 1);

        if let Some(completion) = completion {
            completion.wait().await;
        }

        let mut st = self.lock();
        if !st.is_live(generation) {
            return;
        }
        st.active_playback = None;
        let seconds = self.steps[index].duration_seconds;
        st.remaining_seconds = seconds;
        self.set_phase(&mut st, Phase::Countdown);
        st.active_tick = Some(self.start_tick(generation, seconds));
    }

    fn start_tick(self: &Arc<Self>, generation: u64, seconds: u32) -> TickHandle {
        let on_tick = Arc::clone(self);
        let on_done = Arc::clone(self);
        TickSource::start(
            seconds,
            move |remaining| on_tick.on_tick(generation, remaining),
            move || on_done.on_tick_done(generation),
        )
    }

    fn on_tick(&self, generation: u64, remaining: u32) {
        let mut st = self.lock();
        if !st.is_live(generation) {
            return;
        }
        st.remaining_seconds = remaining;
        self.emit(SequenceEvent::Tick {
            index: st.current_index,
            remaining,
        });
        self.publish(&st);
    }

    fn on_tick_done(self: &Arc<Self>, generation: u64) {
        let mut st = self.lock();
        if !st.is_live(generation) {
            return;
        }
        st.active_tick = None;
        match st.phase {
            Phase::Countdown => {
                tokio::spawn(Arc::clone(self).ring_alarm(generation));
            }
            Phase::Buffer => {
                let index = st.current_index;
                self.begin_locked(&mut st, index);
            }
            phase => debug!(%phase, "tick finished outside a timed phase"),
        }
    }

    async fn ring_alarm(self: Arc<Self>, generation: u64) {
        let completion = {
            let mut st = self.lock();
            if !st.is_live(generation) {
                return;
            }
            if let Some(stop) = st.active_playback.take() {
                stop.stop();
            }
            let settings = &self.settings;
            match self.audio.play_alarm(settings.alarm_sound, settings.alarm_volume) {
                Ok(playback) => {
                    let (completion, stop) = playback.into_parts();
                    st.active_playback = Some(stop);
                    Some(completion)
                }
                Err(e) => {
                    warn!(index = st.current_index, error = %e, "alarm playback failed");
                    None
                }
            }
        };
        if let Some(completion) = completion {
            completion.wait().await;
        }

        let mut st = self.lock();
        if !st.is_live(generation) {
            return;
        }
        st.active_playback = None;
        let next = st.current_index + 1;
        let buffer = self.settings.buffer_seconds;
        if next < self.steps.len() && buffer > 0 {
            st.current_index = next;
            st.remaining_seconds = buffer;
            self.set_phase(&mut st, Phase::Buffer);
            st.active_tick = Some(self.start_tick(generation, buffer));
        } else {
            self.begin_locked(&mut st, next);
        }
    }

    async fn announce_completion(self: Arc<Self>, generation: u64) {
        let index = self.cache.completion_index();
        let prepared = self.cache.get_or_fetch(index).await;

        let completion = {
            let mut st = self.lock();
            if !st.is_live(generation) {
                return;
            }
            match prepared.and_then(|buffer| self.play_locked(&mut st, &buffer)) {
                Ok(completion) => Some(completion),
                Err(e) => {
                    warn!(error = %e, "completion announcement failed");
                    None
                }
            }
        };
        if let Some(completion) = completion {
            completion.wait().await;
        }

        let mut st = self.lock();
        if !st.is_live(generation) {
            return;
        }
        st.active_playback = None;
        self.finish_locked(&mut st);
    }

    fn finish_locked(&self, st: &mut RunState) {
        st.current_index = self.steps.len();
        st.remaining_seconds = 0;
        st.paused = false;
        self.set_phase(st, Phase::Completed);
        info!("🏁 Sequence completed");
    }

    fn show_notice_locked(self: &Arc<Self>, st: &mut RunState, message: String) {
        st.notice_seq += 1;
        let seq = st.notice_seq;
        st.notice = Some(message.clone());
        self.emit(SequenceEvent::Notice { message });
        self.publish(st);

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(NOTICE_DURATION).await;
            let mut st = shared.lock();
            if st.notice_seq == seq && st.notice.take().is_some() {
                shared.emit(SequenceEvent::NoticeCleared);
                shared.publish(&st);
            }
        });
    }

    fn exit(&self) {
        let mut st = self.lock();
        if st.exited {
            return;
        }
        st.release_active();
        st.generation += 1;
        st.exited = true;
        st.paused = false;
        st.notice = None;
        self.cache.close();
        info!(index = st.current_index, phase = %st.phase, "⏹️ Sequence exited");
        self.emit(SequenceEvent::Exited);
        self.publish(&st);
    }
}
