//! Terminal run view: renders sequence events and forwards user commands.

use cadence_core::{Phase, RunSnapshot, SequenceController, SequenceEvent};
use cadence_voice::format_duration;
use std::io::Write;
use std::str::FromStr;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Skip,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "p" | "pause" => Ok(Command::Pause),
            "r" | "resume" => Ok(Command::Resume),
            "s" | "skip" | "n" | "next" => Ok(Command::Skip),
            "q" | "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("unknown command '{}' (p, r, s, q)", other)),
        }
    }
}

/// How the run view ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Quit,
}

pub const HELP: &str = "Commands: [p]ause  [r]esume  [s]kip  [q]uit";

fn clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn position(snapshot: &RunSnapshot, index: usize) -> String {
    format!("[{}/{}]", index + 1, snapshot.step_count)
}

/// One line of output for `event`, if it deserves one.
pub fn render(event: &SequenceEvent, snapshot: &RunSnapshot, steps: &[cadence_core::Step]) -> Option<String> {
    let step = |index: usize| steps.get(index);
    match event {
        SequenceEvent::PhaseChanged { index, phase } => {
            let index = *index;
            match phase {
                Phase::PreparingAudio => step(index)
                    .map(|s| format!("{} {} - preparing announcement", position(snapshot, index), s.name)),
                Phase::Announcing => step(index).map(|s| {
                    format!(
                        "{} {} for {}",
                        position(snapshot, index),
                        s.name,
                        format_duration(s.duration_seconds)
                    )
                }),
                Phase::Countdown => step(index).map(|s| {
                    format!("{} {} - go! {}", position(snapshot, index), s.name, clock(s.duration_seconds))
                }),
                Phase::Buffer => step(index).map(|s| {
                    format!(
                        "Rest {} before {} {}",
                        clock(snapshot.remaining_seconds),
                        position(snapshot, index),
                        s.name
                    )
                }),
                Phase::CompletionAnnouncement => Some("All steps done!".to_string()),
                Phase::Completed => Some("Sequence complete.".to_string()),
            }
        }
        SequenceEvent::Tick { remaining, .. } => Some(format!("  {}", clock(*remaining))),
        SequenceEvent::Paused { remaining } => {
            Some(format!("Paused at {} - r to resume", clock(*remaining)))
        }
        SequenceEvent::Resumed { remaining } => Some(format!("Resumed at {}", clock(*remaining))),
        // A skipped buffer already points at the step that runs next.
        SequenceEvent::Skipped {
            index,
            phase: Phase::Buffer,
        } => step(*index).map(|s| format!("Skipped rest before {}", s.name)),
        SequenceEvent::Skipped { index, .. } => step(*index).map(|s| format!("Skipped {}", s.name)),
        SequenceEvent::Notice { message } => Some(format!("! {}", message)),
        SequenceEvent::NoticeCleared => None,
        SequenceEvent::Exited => Some("Exited.".to_string()),
    }
}

fn apply(controller: &SequenceController, command: Command) -> bool {
    let applied = match command {
        Command::Pause => controller.pause(),
        Command::Resume => controller.resume(),
        Command::Skip => controller.skip(),
        Command::Quit => {
            controller.exit();
            true
        }
    };
    debug!(?command, applied, "command");
    applied
}

/// Drive one run to completion or until the user quits. Always exits the controller.
pub async fn drive<W: Write>(
    controller: SequenceController,
    mut events: mpsc::UnboundedReceiver<SequenceEvent>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    out: &mut W,
) -> std::io::Result<RunOutcome> {
    writeln!(out, "{}", HELP)?;
    let mut commands_open = true;
    let outcome = loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break RunOutcome::Quit };
                let snapshot = controller.snapshot();
                if let Some(line) = render(&event, &snapshot, controller.steps()) {
                    writeln!(out, "{}", line)?;
                    out.flush()?;
                }
                match event {
                    SequenceEvent::PhaseChanged { phase: Phase::Completed, .. } => break RunOutcome::Completed,
                    SequenceEvent::Exited => break RunOutcome::Quit,
                    _ => {}
                }
            }
            command = commands.recv(), if commands_open => {
                match command {
                    Some(command) => {
                        if !apply(&controller, command) {
                            writeln!(out, "({:?} has no effect right now)", command)?;
                        }
                    }
                    None => commands_open = false,
                }
            }
        }
    };
    controller.exit();
    Ok(outcome)
}
