//! Named routines persisted as one ordered JSON list under a single well-known key.

use cadence_core::{SequenceSettings, Step};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Storage key; the store file is `<storage_path>/cadence.routines.json`.
pub const ROUTINES_KEY: &str = "cadence.routines";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routine {
    pub name: String,
    pub steps: Vec<Step>,
    pub settings: SequenceSettings,
    pub created_at: DateTime<Utc>,
}

impl Routine {
    pub fn new(name: impl Into<String>, steps: Vec<Step>, settings: SequenceSettings) -> Self {
        Self {
            name: name.into().trim().to_string(),
            steps,
            settings,
            created_at: Utc::now(),
        }
    }

    pub fn total_seconds(&self) -> u64 {
        self.steps.iter().map(|s| s.duration_seconds as u64).sum()
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Routine store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Routine store is corrupt: {0}")]
    Format(#[from] serde_json::Error),

    #[error("A routine named '{0}' already exists")]
    Exists(String),

    #[error("No routine named '{0}'")]
    NotFound(String),

    #[error("A routine needs a name and at least one step")]
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Replaced,
}

/// File-backed routine list. Every operation reads the file fresh.
#[derive(Debug, Clone)]
pub struct RoutineStore {
    path: PathBuf,
}

impl RoutineStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Self {
        Self {
            path: storage_dir.as_ref().join(format!("{}.json", ROUTINES_KEY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All routines in saved order. A missing file is an empty list.
    pub fn list(&self) -> Result<Vec<Routine>, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get(&self, name: &str) -> Result<Option<Routine>, StoreError> {
        let name = name.trim();
        Ok(self.list()?.into_iter().find(|r| r.name == name))
    }

    /// Append `routine`, or replace the same-named one in place when `overwrite` is set.
    pub fn save(&self, routine: Routine, overwrite: bool) -> Result<SaveOutcome, StoreError> {
        if routine.name.is_empty() || routine.steps.is_empty() {
            return Err(StoreError::Invalid);
        }
        let mut routines = self.list()?;
        let outcome = match routines.iter_mut().find(|r| r.name == routine.name) {
            Some(_) if !overwrite => return Err(StoreError::Exists(routine.name)),
            Some(existing) => {
                *existing = routine;
                SaveOutcome::Replaced
            }
            None => {
                routines.push(routine);
                SaveOutcome::Created
            }
        };
        self.write_all(&routines)?;
        info!(path = %self.path.display(), ?outcome, "routine saved");
        Ok(outcome)
    }

    pub fn delete(&self, name: &str) -> Result<Routine, StoreError> {
        let name = name.trim();
        let mut routines = self.list()?;
        let pos = routines
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let removed = routines.remove(pos);
        self.write_all(&routines)?;
        info!(name, "routine deleted");
        Ok(removed)
    }

    fn write_all(&self, routines: &[Routine]) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(routines)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(count = routines.len(), "routine store written");
        Ok(())
    }
}
