//! End-to-end runs of the sequence controller on virtual time.

use async_trait::async_trait;
use cadence_core::{Phase, SequenceController, SequenceError, SequenceEvent, SequenceSettings, Step};
use cadence_voice::{
    AlarmSound, AudioOutput, PlayRecord, SimulatedOutput, SpeechService, SynthesisError,
    TranscriptionError,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout, Instant};

const COMPLETION: &str = "<completion>";
/// One second of 24 kHz PCM16.
const CLIP_BYTES: usize = 48_000;

#[derive(Default)]
struct ScriptedSpeech {
    calls: Mutex<Vec<String>>,
    failing: HashSet<String>,
    fail_completion: bool,
    delay: Duration,
}

impl ScriptedSpeech {
    fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechService for ScriptedSpeech {
    async fn synthesize_step_announcement(
        &self,
        step_name: &str,
        _duration_seconds: u32,
    ) -> Result<Vec<u8>, SynthesisError> {
        self.calls.lock().unwrap().push(step_name.to_string());
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        if self.failing.contains(step_name) {
            return Err(SynthesisError::Exhausted {
                attempts: 3,
                last: Box::new(SynthesisError::EmptyAudio),
            });
        }
        Ok(vec![0; CLIP_BYTES])
    }

    async fn synthesize_completion_announcement(&self) -> Result<Vec<u8>, SynthesisError> {
        self.calls.lock().unwrap().push(COMPLETION.to_string());
        if self.fail_completion {
            return Err(SynthesisError::EmptyAudio);
        }
        Ok(vec![0; CLIP_BYTES])
    }

    async fn transcribe(&self, _audio: &[u8], _mime: &str) -> Result<String, TranscriptionError> {
        Err(TranscriptionError::Empty)
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn steps(plan: &[(&str, u32)]) -> Vec<Step> {
    plan.iter().map(|(name, secs)| Step::new(*name, *secs)).collect()
}

fn settings(buffer_seconds: u32) -> SequenceSettings {
    SequenceSettings {
        alarm_sound: AlarmSound::Digital,
        alarm_volume: 0.5,
        buffer_seconds,
        voice_volume: 1.0,
    }
}

struct Harness {
    controller: SequenceController,
    events: UnboundedReceiver<SequenceEvent>,
    speech: Arc<ScriptedSpeech>,
    output: SimulatedOutput,
}

fn start(plan: &[(&str, u32)], settings: SequenceSettings, speech: ScriptedSpeech) -> Harness {
    start_with_output(plan, settings, speech, SimulatedOutput::new().with_records())
}

fn start_with_output(
    plan: &[(&str, u32)],
    settings: SequenceSettings,
    speech: ScriptedSpeech,
    output: SimulatedOutput,
) -> Harness {
    init_logging();
    let speech = Arc::new(speech);
    let (controller, events) = SequenceController::start(
        steps(plan),
        settings,
        Arc::clone(&speech) as Arc<dyn SpeechService>,
        Arc::new(output.clone()) as Arc<dyn AudioOutput>,
    )
    .expect("start sequence");
    Harness {
        controller,
        events,
        speech,
        output,
    }
}

/// Collect events up to and including `PhaseChanged { index, phase }`.
async fn until_phase(
    rx: &mut UnboundedReceiver<SequenceEvent>,
    index: usize,
    phase: Phase,
) -> Vec<SequenceEvent> {
    let mut seen = Vec::new();
    let target = SequenceEvent::PhaseChanged { index, phase };
    let found = timeout(Duration::from_secs(600), async {
        while let Some(event) = rx.recv().await {
            let done = event == target;
            seen.push(event);
            if done {
                return true;
            }
        }
        false
    })
    .await;
    assert!(
        matches!(found, Ok(true)),
        "never reached {phase} for step {index}: {seen:?}"
    );
    seen
}

fn drain(rx: &mut UnboundedReceiver<SequenceEvent>) -> Vec<SequenceEvent> {
    let mut seen = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => seen.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return seen,
        }
    }
}

fn phases(events: &[SequenceEvent]) -> Vec<(usize, Phase)> {
    events
        .iter()
        .filter_map(|e| match e {
            SequenceEvent::PhaseChanged { index, phase } => Some((*index, *phase)),
            _ => None,
        })
        .collect()
}

fn ticks(events: &[SequenceEvent]) -> Vec<(usize, u32)> {
    events
        .iter()
        .filter_map(|e| match e {
            SequenceEvent::Tick { index, remaining } => Some((*index, *remaining)),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn full_run_visits_every_phase_in_order() {
    let started = Instant::now();
    let mut h = start(&[("Squats", 3), ("Lunges", 2)], settings(2), ScriptedSpeech::default());

    let events = until_phase(&mut h.events, 2, Phase::Completed).await;

    use Phase::*;
    assert_eq!(
        phases(&events),
        vec![
            (0, PreparingAudio),
            (0, Announcing),
            (0, Countdown),
            (1, Buffer),
            (1, PreparingAudio),
            (1, Announcing),
            (1, Countdown),
            (2, CompletionAnnouncement),
            (2, Completed),
        ]
    );
    assert_eq!(
        ticks(&events),
        vec![(0, 2), (0, 1), (0, 0), (1, 1), (1, 0), (1, 1), (1, 0)]
    );
    // announce 1 + count 3 + alarm 0.6 + buffer 2 + announce 1 + count 2 + alarm 0.6 + completion 1
    assert_eq!(started.elapsed(), Duration::from_millis(11_200));

    let alarms = h
        .output
        .records()
        .into_iter()
        .filter(|r| matches!(r, PlayRecord::Alarm { sound: AlarmSound::Digital, volume } if *volume == 0.5))
        .count();
    assert_eq!(alarms, 2);

    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.phase, Completed);
    assert_eq!(snapshot.index, 2);
    assert_eq!(snapshot.step_name, None);
    assert_eq!(h.output.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn prefetch_synthesizes_each_announcement_once() {
    let mut h = start(
        &[("Push ups", 2), ("Plank", 2), ("Stretch", 2)],
        settings(0),
        ScriptedSpeech::default(),
    );
    until_phase(&mut h.events, 3, Phase::Completed).await;

    assert_eq!(
        h.speech.calls(),
        vec!["Push ups", "Plank", "Stretch", COMPLETION]
    );
    assert_eq!(h.controller.cache().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn step_starting_mid_prefetch_waits_for_it_instead_of_refetching() {
    let started = Instant::now();
    let speech = ScriptedSpeech {
        delay: Duration::from_secs(3),
        ..ScriptedSpeech::default()
    };
    // A: fetched 0..3 s, announced 3..4 s, alarm 4..4.6 s. B's prefetch runs 3..6 s.
    let mut h = start(&[("A", 0), ("B", 5)], settings(0), speech);

    until_phase(&mut h.events, 1, Phase::PreparingAudio).await;
    assert_eq!(started.elapsed(), Duration::from_millis(4600));
    until_phase(&mut h.events, 1, Phase::Announcing).await;
    assert_eq!(started.elapsed(), Duration::from_secs(6));

    until_phase(&mut h.events, 2, Phase::Completed).await;
    assert_eq!(h.speech.calls(), vec!["A", "B", COMPLETION]);
}

#[tokio::test(start_paused = true)]
async fn skip_during_announcement_stops_audio_immediately() {
    let mut h = start(&[("Squats", 30), ("Lunges", 30)], settings(0), ScriptedSpeech::default());
    until_phase(&mut h.events, 0, Phase::Announcing).await;
    assert_eq!(h.output.active_count(), 1);

    assert!(h.controller.skip());
    assert_eq!(h.output.active_count(), 0);
    let snapshot = h.controller.snapshot();
    assert_eq!((snapshot.index, snapshot.phase), (1, Phase::PreparingAudio));

    let events = until_phase(&mut h.events, 1, Phase::Countdown).await;
    assert_eq!(
        events[0],
        SequenceEvent::Skipped {
            index: 0,
            phase: Phase::Announcing
        }
    );
    assert_eq!(
        phases(&events),
        vec![
            (1, Phase::PreparingAudio),
            (1, Phase::Announcing),
            (1, Phase::Countdown)
        ]
    );
    assert!(ticks(&events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn skip_during_countdown_cancels_ticks_and_alarm() {
    let mut h = start(&[("Squats", 10), ("Lunges", 4)], settings(0), ScriptedSpeech::default());
    until_phase(&mut h.events, 0, Phase::Countdown).await;
    sleep(Duration::from_millis(2500)).await;
    let generation = h.controller.snapshot().generation;

    assert!(h.controller.skip());
    assert!(h.controller.snapshot().generation > generation);

    let events = until_phase(&mut h.events, 1, Phase::Countdown).await;
    assert!(ticks(&events).iter().all(|(index, _)| *index == 0));
    let later = until_phase(&mut h.events, 2, Phase::Completed).await;
    assert!(ticks(&later).iter().all(|(index, _)| *index == 1));

    // One alarm, for the step that actually finished.
    let alarms = h
        .output
        .records()
        .iter()
        .filter(|r| matches!(r, PlayRecord::Alarm { .. }))
        .count();
    assert_eq!(alarms, 1);
}

#[tokio::test(start_paused = true)]
async fn skip_while_preparing_discards_late_audio() {
    let speech = ScriptedSpeech {
        delay: Duration::from_secs(3),
        ..ScriptedSpeech::default()
    };
    let mut h = start(&[("Slow", 5), ("Next", 5)], settings(0), speech);
    sleep(Duration::from_millis(500)).await;
    assert_eq!(h.controller.snapshot().phase, Phase::PreparingAudio);

    assert!(h.controller.skip());
    let events = until_phase(&mut h.events, 1, Phase::Countdown).await;
    assert!(!phases(&events).contains(&(0, Phase::Announcing)));
    // Only the announcement for step 1 was ever played.
    assert_eq!(
        h.output.records(),
        vec![PlayRecord::Voice {
            samples: CLIP_BYTES / 2,
            volume: 1.0
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn pause_freezes_and_resume_continues_exactly() {
    let mut h = start(&[("Hold", 10)], settings(0), ScriptedSpeech::default());
    until_phase(&mut h.events, 0, Phase::Countdown).await;
    sleep(Duration::from_millis(3500)).await;

    assert!(h.controller.pause());
    assert!(!h.controller.pause());
    let snapshot = h.controller.snapshot();
    assert!(snapshot.paused);
    assert_eq!(snapshot.remaining_seconds, 7);
    assert_eq!(
        drain(&mut h.events),
        vec![
            SequenceEvent::Tick { index: 0, remaining: 9 },
            SequenceEvent::Tick { index: 0, remaining: 8 },
            SequenceEvent::Tick { index: 0, remaining: 7 },
            SequenceEvent::Paused { remaining: 7 },
        ]
    );

    sleep(Duration::from_secs(20)).await;
    assert!(drain(&mut h.events).is_empty());
    assert_eq!(h.controller.snapshot().remaining_seconds, 7);

    let resumed_at = Instant::now();
    assert!(h.controller.resume());
    assert!(!h.controller.resume());
    let events = until_phase(&mut h.events, 1, Phase::CompletionAnnouncement).await;
    assert_eq!(events[0], SequenceEvent::Resumed { remaining: 7 });
    assert_eq!(
        ticks(&events).into_iter().map(|(_, r)| r).collect::<Vec<_>>(),
        vec![6, 5, 4, 3, 2, 1, 0]
    );
    // 7 s of countdown + 0.6 s digital alarm
    assert_eq!(resumed_at.elapsed(), Duration::from_millis(7_600));
}

#[tokio::test(start_paused = true)]
async fn pause_only_applies_to_timed_phases() {
    let mut h = start(&[("Hold", 10)], settings(0), ScriptedSpeech::default());
    until_phase(&mut h.events, 0, Phase::Announcing).await;
    assert!(!h.controller.pause());
    assert!(!h.controller.resume());
}

#[tokio::test(start_paused = true)]
async fn buffer_pauses_in_place_and_skip_goes_to_waiting_step() {
    let mut h = start(
        &[("One", 1), ("Two", 1), ("Three", 1)],
        settings(30),
        ScriptedSpeech::default(),
    );
    until_phase(&mut h.events, 1, Phase::Buffer).await;
    sleep(Duration::from_millis(1500)).await;

    assert!(h.controller.pause());
    assert_eq!(h.controller.snapshot().phase, Phase::Buffer);
    assert!(h.controller.resume());
    let snapshot = h.controller.snapshot();
    assert_eq!((snapshot.phase, snapshot.remaining_seconds), (Phase::Buffer, 29));

    assert!(h.controller.skip());
    let snapshot = h.controller.snapshot();
    assert_eq!((snapshot.index, snapshot.phase), (1, Phase::PreparingAudio));
    assert_eq!(snapshot.step_name.as_deref(), Some("Two"));
}

#[tokio::test(start_paused = true)]
async fn synthesis_failure_shows_notice_and_counts_down_silently() {
    let mut h = start(
        &[("Broken", 10), ("Fine", 1)],
        settings(0),
        ScriptedSpeech::failing(&["Broken"]),
    );

    let events = until_phase(&mut h.events, 0, Phase::Countdown).await;
    assert_eq!(
        phases(&events),
        vec![(0, Phase::PreparingAudio), (0, Phase::Countdown)]
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, SequenceEvent::Notice { message } if message.contains("Announcement unavailable"))));
    assert!(h.controller.snapshot().notice.is_some());

    // The notice expires on its own while the countdown is still running.
    sleep(Duration::from_millis(5_100)).await;
    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.phase, Phase::Countdown);
    assert_eq!(snapshot.notice, None);
    assert!(drain(&mut h.events).contains(&SequenceEvent::NoticeCleared));

    until_phase(&mut h.events, 1, Phase::Announcing).await;
}

#[tokio::test(start_paused = true)]
async fn playback_failure_is_treated_like_missing_audio() {
    let mut h = start_with_output(
        &[("Quiet", 1)],
        settings(0),
        ScriptedSpeech::default(),
        SimulatedOutput::new().with_records().with_failing_voice(),
    );
    let events = until_phase(&mut h.events, 1, Phase::Completed).await;
    assert_eq!(
        phases(&events),
        vec![
            (0, Phase::PreparingAudio),
            (0, Phase::Countdown),
            (1, Phase::CompletionAnnouncement),
            (1, Phase::Completed),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn completion_and_alarm_failures_still_complete() {
    let speech = ScriptedSpeech {
        fail_completion: true,
        ..ScriptedSpeech::default()
    };
    let mut h = start_with_output(
        &[("A", 1), ("B", 1)],
        settings(0),
        speech,
        SimulatedOutput::new().with_records().with_failing_alarms(),
    );
    until_phase(&mut h.events, 2, Phase::Completed).await;
    assert!(h
        .output
        .records()
        .iter()
        .all(|r| matches!(r, PlayRecord::Voice { .. })));
    assert!(!h.controller.skip());
}

#[tokio::test(start_paused = true)]
async fn skip_during_completion_announcement_completes() {
    let mut h = start(&[("Only", 1)], settings(0), ScriptedSpeech::default());
    until_phase(&mut h.events, 1, Phase::CompletionAnnouncement).await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(h.output.active_count(), 1);

    assert!(h.controller.skip());
    assert_eq!(h.output.active_count(), 0);
    assert_eq!(h.controller.snapshot().phase, Phase::Completed);
    assert!(!h.controller.skip());
}

#[tokio::test(start_paused = true)]
async fn zero_duration_steps_advance_without_ticking() {
    let mut h = start(&[("Blink", 0), ("Again", 0)], settings(0), ScriptedSpeech::default());
    let events = until_phase(&mut h.events, 2, Phase::Completed).await;
    assert!(ticks(&events).is_empty());
    assert_eq!(phases(&events).len(), 8);
}

#[tokio::test(start_paused = true)]
async fn exit_mid_countdown_leaves_nothing_running() {
    let mut h = start(&[("Hold", 30), ("Next", 30)], settings(5), ScriptedSpeech::default());
    until_phase(&mut h.events, 0, Phase::Countdown).await;
    sleep(Duration::from_millis(1500)).await;

    h.controller.exit();
    let frozen = h.controller.snapshot();
    assert!(frozen.exited);
    assert_eq!(h.output.active_count(), 0);
    assert!(h.controller.cache().is_closed());

    sleep(Duration::from_secs(120)).await;
    assert_eq!(h.controller.snapshot(), frozen);
    let events = drain(&mut h.events);
    assert_eq!(events.last(), Some(&SequenceEvent::Exited));
    assert_eq!(
        events.iter().filter(|e| matches!(e, SequenceEvent::Tick { .. })).count(),
        1
    );

    assert!(!h.controller.skip());
    assert!(!h.controller.pause());
    h.controller.exit();
    assert!(drain(&mut h.events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_controller_exits() {
    let mut h = start(&[("Hold", 30)], settings(0), ScriptedSpeech::default());
    until_phase(&mut h.events, 0, Phase::Countdown).await;
    let Harness {
        controller,
        mut events,
        output,
        ..
    } = h;
    drop(controller);
    sleep(Duration::from_secs(60)).await;
    assert_eq!(drain(&mut events).last(), Some(&SequenceEvent::Exited));
    assert_eq!(output.active_count(), 0);
}

#[tokio::test]
async fn empty_step_list_is_rejected() {
    let result = SequenceController::start(
        Vec::new(),
        SequenceSettings::default(),
        Arc::new(ScriptedSpeech::default()),
        Arc::new(SimulatedOutput::new()),
    );
    assert!(matches!(result, Err(SequenceError::EmptySequence)));
}

#[tokio::test]
async fn invalid_settings_are_rejected() {
    let result = SequenceController::start(
        steps(&[("A", 1)]),
        SequenceSettings {
            alarm_volume: -0.1,
            ..SequenceSettings::default()
        },
        Arc::new(ScriptedSpeech::default()),
        Arc::new(SimulatedOutput::new()),
    );
    assert!(matches!(result, Err(SequenceError::InvalidSettings(_))));
}
