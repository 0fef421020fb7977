//! Cadence CLI: run announced timer sequences from the terminal, manage saved routines,
//! and name steps by voice.

pub mod config;
pub mod routines;
pub mod run_view;
pub mod step_spec;

pub use config::CadenceConfig;
pub use routines::{Routine, RoutineStore, SaveOutcome, StoreError, ROUTINES_KEY};
pub use run_view::{drive, Command, RunOutcome};
pub use step_spec::{parse_duration, parse_step, parse_steps};
