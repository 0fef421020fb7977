//! Steps and per-run settings.

use crate::error::SequenceError;
use cadence_voice::AlarmSound;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One named, timed unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: Uuid,
    pub name: String,
    pub duration_seconds: u32,
}

impl Step {
    pub fn new(name: impl Into<String>, duration_seconds: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            duration_seconds,
        }
    }
}

fn default_voice_volume() -> f32 {
    1.0
}

/// Read-only settings for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceSettings {
    pub alarm_sound: AlarmSound,
    /// 0.0..=1.0
    pub alarm_volume: f32,
    /// Rest inserted between steps; 0 disables the buffer phase.
    pub buffer_seconds: u32,
    /// Announcement playback volume, 0.0..=1.0.
    #[serde(default = "default_voice_volume")]
    pub voice_volume: f32,
}

impl Default for SequenceSettings {
    fn default() -> Self {
        Self {
            alarm_sound: AlarmSound::Bell,
            alarm_volume: 0.8,
            buffer_seconds: 0,
            voice_volume: default_voice_volume(),
        }
    }
}

impl SequenceSettings {
    pub fn validate(&self) -> Result<(), SequenceError> {
        for (field, value) in [
            ("alarmVolume", self.alarm_volume),
            ("voiceVolume", self.voice_volume),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SequenceError::InvalidSettings(format!(
                    "{} must be between 0 and 1, got {}",
                    field, value
                )));
            }
        }
        Ok(())
    }
}
