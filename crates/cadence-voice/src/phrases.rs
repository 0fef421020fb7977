//! Text sent to the speech service.

/// Fixed phrase spoken after the last step.
pub const COMPLETION_ANNOUNCEMENT: &str =
    "Congratulations! You have finished every step in your sequence. Great work!";

fn unit(count: u32, singular: &str) -> String {
    if count == 1 {
        format!("1 {}", singular)
    } else {
        format!("{} {}s", count, singular)
    }
}

/// Human-readable duration: `90` -> "1 minute and 30 seconds", `0` -> "0 seconds".
pub fn format_duration(seconds: u32) -> String {
    let minutes = seconds / 60;
    let secs = seconds % 60;
    match (minutes, secs) {
        (0, s) => unit(s, "second"),
        (m, 0) => unit(m, "minute"),
        (m, s) => format!("{} and {}", unit(m, "minute"), unit(s, "second")),
    }
}

/// Spoken announcement for one step.
pub fn step_announcement(name: &str, duration_seconds: u32) -> String {
    format!(
        "Next up: {}, for {}.",
        name.trim(),
        format_duration(duration_seconds)
    )
}

/// Normalize a transcription into a step name: trimmed, without trailing sentence punctuation.
pub fn clean_transcript(text: &str) -> String {
    text.trim()
        .trim_end_matches(['.', '!', '?', ','])
        .trim()
        .to_string()
}
