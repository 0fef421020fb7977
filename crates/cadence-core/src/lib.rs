//! # Cadence Core - Run-time Sequencing Engine
//!
//! Drives an ordered list of [`Step`]s through announce → countdown → alarm → (buffer), ending
//! with a completion announcement. User pause/resume/skip may arrive at any point; a generation
//! counter makes sure superseded asynchronous work never touches the visible state.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  SequenceController                       │
//! │  RunState (phase, index, remaining, paused, generation)   │
//! │     │                    │                     │          │
//! │     ▼                    ▼                     ▼          │
//! │ AnnouncementCache    TickSource          AudioOutput      │
//! │ (prefetch i+1)       (1 s countdown)     (voice, alarm)   │
//! │     │                                                     │
//! │     ▼                                                     │
//! │ SpeechService                                             │
//! └──────────────────────────────────────────────────────────┘
//!        │ SequenceEvent (mpsc)      RunSnapshot (watch)
//!        ▼
//!   presentation layer
//! ```

pub mod cache;
pub mod controller;
pub mod error;
pub mod state;
pub mod step;
pub mod tick;

pub use cache::AnnouncementCache;
pub use controller::{SequenceController, NOTICE_DURATION};
pub use error::SequenceError;
pub use state::{Phase, RunSnapshot, SequenceEvent};
pub use step::{SequenceSettings, Step};
pub use tick::{TickHandle, TickSource};
