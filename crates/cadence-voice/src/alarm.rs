//! Alarm tones played when a countdown reaches zero.
//!
//! Each sound is a fixed tonal pattern with a fixed total length; the exact waveform is
//! approximate, the duration is not.

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmSound {
    #[default]
    Bell,
    Digital,
    Chime,
    Gong,
}

impl AlarmSound {
    pub const ALL: [AlarmSound; 4] = [
        AlarmSound::Bell,
        AlarmSound::Digital,
        AlarmSound::Chime,
        AlarmSound::Gong,
    ];

    /// Total length of the pattern.
    pub fn duration(self) -> Duration {
        match self {
            AlarmSound::Bell => Duration::from_millis(2000),
            AlarmSound::Digital => Duration::from_millis(600),
            AlarmSound::Chime => Duration::from_millis(1500),
            AlarmSound::Gong => Duration::from_millis(2500),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlarmSound::Bell => "bell",
            AlarmSound::Digital => "digital",
            AlarmSound::Chime => "chime",
            AlarmSound::Gong => "gong",
        }
    }

    /// Render the pattern as mono samples in [-1.0, 1.0], exactly `duration()` long.
    pub fn render(self, sample_rate: u32) -> Vec<f32> {
        let total = (self.duration().as_secs_f32() * sample_rate as f32).round() as usize;
        let rate = sample_rate as f32;
        (0..total)
            .map(|n| {
                let t = n as f32 / rate;
                match self {
                    AlarmSound::Bell => bell(t),
                    AlarmSound::Digital => digital(t),
                    AlarmSound::Chime => chime(t),
                    AlarmSound::Gong => gong(t),
                }
            })
            .collect()
    }
}

fn sine(freq: f32, t: f32) -> f32 {
    (TAU * freq * t).sin()
}

fn bell(t: f32) -> f32 {
    let env = (-2.5 * t).exp();
    env * (0.6 * sine(830.0, t) + 0.25 * sine(1660.0, t) + 0.1 * sine(2490.0, t))
}

// Three 100 ms square beeps separated by 100 ms gaps.
fn digital(t: f32) -> f32 {
    let slot = (t / 0.1) as u32;
    if slot % 2 == 1 || slot >= 6 {
        return 0.0;
    }
    let square = if sine(1000.0, t) >= 0.0 { 1.0 } else { -1.0 };
    0.35 * square
}

// Ascending C6, E6, G6, 500 ms each.
fn chime(t: f32) -> f32 {
    const NOTES: [f32; 3] = [1046.5, 1318.5, 1568.0];
    let idx = ((t / 0.5) as usize).min(NOTES.len() - 1);
    let local = t - idx as f32 * 0.5;
    let env = (-6.0 * local).exp();
    0.5 * env * sine(NOTES[idx], t)
}

fn gong(t: f32) -> f32 {
    let env = (-1.2 * t).exp();
    let attack = (t / 0.02).min(1.0);
    attack
        * env
        * (0.45 * sine(110.0, t) + 0.25 * sine(167.3, t) + 0.15 * sine(231.1, t) + 0.1 * sine(303.7, t))
}

impl fmt::Display for AlarmSound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlarmSound {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlarmSound::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown alarm sound '{}' (expected bell, digital, chime or gong)", s))
    }
}
