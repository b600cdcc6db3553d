//! Run-state persistence
//!
//! Records the last completed UTC day so the once-per-day guard survives
//! restarts. The file is replaced atomically (temp file + rename).

use crate::models::DayContext;
use crate::utils::error::StateError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

/// Persisted loop state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Last UTC day whose cycle finished completely
    pub last_completed_day: Option<NaiveDate>,

    /// Item identifier used for that day
    pub last_item_identifier: Option<String>,

    /// Last write time
    pub updated_at: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn is_completed(&self, date: NaiveDate) -> bool {
        self.last_completed_day == Some(date)
    }
}

/// JSON file holding the [`RunState`]
#[derive(Debug, Clone)]
pub struct RunStateStore {
    path: PathBuf,
}

impl RunStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StateError {
        StateError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Load the state; a missing file is a fresh state
    pub fn load(&self) -> Result<RunState, StateError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(RunState::default()),
            Err(e) => return Err(self.io_error(e)),
        };

        let state = serde_json::from_reader(BufReader::new(file))?;
        tracing::debug!(path = %self.path.display(), "Run state loaded");
        Ok(state)
    }

    /// Save the state atomically
    pub fn save(&self, state: &RunState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        let file = File::create(&temp_path).map_err(|e| self.io_error(e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), state)?;

        fs::rename(&temp_path, &self.path).map_err(|e| self.io_error(e))?;

        tracing::debug!(path = %self.path.display(), "Run state saved");
        Ok(())
    }

    /// Record `day` as completed
    pub fn mark_completed(
        &self,
        day: &DayContext,
        now: DateTime<Utc>,
    ) -> Result<RunState, StateError> {
        let state = RunState {
            last_completed_day: Some(day.date),
            last_item_identifier: Some(day.item_identifier.clone()),
            updated_at: Some(now),
        };
        self.save(&state)?;
        Ok(state)
    }
}
