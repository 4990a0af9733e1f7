//! Scan history and scheduling state
//!
//! The orchestrator records completed scans through a [`ScheduleStore`]. The
//! JSON store keeps one file (`schedule.json` in the data directory); the
//! in-memory store is for embedding and tests.
//!
//! Besides the host-side store, a full sweep leaves a timestamp on the card
//! itself (`.sentinel/last_sweep`) so the history travels with the card
//! between machines.

use crate::error::{Error, Result};
use crate::manifest::SENTINEL_DIR;
use crate::result::Outcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// File holding the on-card sweep stamp, inside [`SENTINEL_DIR`]
pub const LAST_SWEEP_FILE: &str = "last_sweep";

/// History of one drive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveSchedule {
    /// Last completed quick check
    pub last_check_time: Option<DateTime<Utc>>,
    /// Last completed full sweep
    pub last_sweep_time: Option<DateTime<Utc>>,
    /// Interval recommended at the last sweep
    pub sweep_interval_days: Option<u32>,
    /// Outcome of the last completed sweep
    pub last_sweep_outcome: Option<Outcome>,
    /// Label shown to the user
    pub display_name: Option<String>,
}

/// Everything the schedule store persists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleState {
    /// Fingerprint of the last swept drive
    pub last_drive: Option<String>,
    /// Last completed quick check on any drive
    pub last_check_time: Option<DateTime<Utc>>,
    /// Last completed full sweep on any drive
    pub last_sweep_time: Option<DateTime<Utc>>,
    /// Default interval for drives without their own
    pub sweep_interval_days: Option<u32>,
    /// Per-drive history keyed by fingerprint
    pub drives: BTreeMap<String, DriveSchedule>,
}

/// A completed operation to record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleUpdate {
    /// A quick check ran to completion
    CheckCompleted {
        /// Drive fingerprint
        fingerprint: String,
        /// Drive label
        display_name: String,
        /// Completion time
        at: DateTime<Utc>,
    },
    /// A full sweep ran to completion
    SweepCompleted {
        /// Drive fingerprint
        fingerprint: String,
        /// Drive label
        display_name: String,
        /// Completion time
        at: DateTime<Utc>,
        /// Passed or failed
        outcome: Outcome,
        /// Interval recommended after this sweep
        interval_days: u32,
    },
}

impl ScheduleState {
    /// History of one drive, if any
    pub fn drive(&self, fingerprint: &str) -> Option<&DriveSchedule> {
        self.drives.get(fingerprint)
    }

    /// Fold a completed operation into the state
    pub fn apply(&mut self, update: &ScheduleUpdate) {
        match update {
            ScheduleUpdate::CheckCompleted {
                fingerprint,
                display_name,
                at,
            } => {
                let entry = self.drives.entry(fingerprint.clone()).or_default();
                entry.last_check_time = Some(*at);
                entry.display_name = Some(display_name.clone());
                self.last_check_time = Some(*at);
            }
            ScheduleUpdate::SweepCompleted {
                fingerprint,
                display_name,
                at,
                outcome,
                interval_days,
            } => {
                let entry = self.drives.entry(fingerprint.clone()).or_default();
                entry.last_sweep_time = Some(*at);
                entry.last_sweep_outcome = Some(*outcome);
                entry.sweep_interval_days = Some(*interval_days);
                entry.display_name = Some(display_name.clone());
                self.last_sweep_time = Some(*at);
                self.last_drive = Some(fingerprint.clone());
            }
        }
    }
}

/// Persistence of [`ScheduleState`]
#[cfg_attr(test, mockall::automock)]
pub trait ScheduleStore: Send + Sync {
    /// Read the current state
    fn load(&self) -> Result<ScheduleState>;

    /// Record a completed operation; must be atomic
    fn commit(&self, update: &ScheduleUpdate) -> Result<()>;
}

/// Schedule kept in memory only
#[derive(Debug, Default)]
pub struct MemoryScheduleStore {
    state: Mutex<ScheduleState>,
}

impl MemoryScheduleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given state
    pub fn with_state(state: ScheduleState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

impl ScheduleStore for MemoryScheduleStore {
    fn load(&self) -> Result<ScheduleState> {
        self.state
            .lock()
            .map(|s| s.clone())
            .map_err(|_| Error::Schedule("schedule lock poisoned".to_string()))
    }

    fn commit(&self, update: &ScheduleUpdate) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Schedule("schedule lock poisoned".to_string()))?;
        state.apply(update);
        Ok(())
    }
}

/// Schedule kept in a JSON file, rewritten atomically on every commit
#[derive(Debug)]
pub struct JsonScheduleStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonScheduleStore {
    /// Store at the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the JSON file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<ScheduleState> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                Error::Schedule(format!("cannot parse {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ScheduleState::default()),
            Err(e) => Err(Error::Schedule(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write(&self, state: &ScheduleState) -> Result<()> {
        let to_schedule_err =
            |e: io::Error| Error::Schedule(format!("cannot write {}: {}", self.path.display(), e));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(to_schedule_err)?;
        }
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| Error::Schedule(format!("cannot serialize schedule: {}", e)))?;

        let temp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).map_err(to_schedule_err)?;
        file.write_all(json.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(to_schedule_err)?;
        fs::rename(&temp_path, &self.path).map_err(to_schedule_err)?;

        debug!("Saved schedule to {}", self.path.display());
        Ok(())
    }
}

impl ScheduleStore for JsonScheduleStore {
    fn load(&self) -> Result<ScheduleState> {
        self.read()
    }

    fn commit(&self, update: &ScheduleUpdate) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| Error::Schedule("schedule lock poisoned".to_string()))?;
        let mut state = self.read()?;
        state.apply(update);
        self.write(&state)
    }
}

/// Read the last-sweep stamp from a card. `None` when absent or unparseable.
pub fn read_card_stamp(root: &Path) -> Option<DateTime<Utc>> {
    let path = root.join(SENTINEL_DIR).join(LAST_SWEEP_FILE);
    let contents = fs::read_to_string(path).ok()?;
    DateTime::parse_from_rfc3339(contents.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Write the last-sweep stamp to a card
pub fn write_card_stamp(root: &Path, at: DateTime<Utc>) -> io::Result<()> {
    let dir = root.join(SENTINEL_DIR);
    fs::create_dir_all(&dir)?;
    fs::write(dir.join(LAST_SWEEP_FILE), at.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sweep(fp: &str, outcome: Outcome, at: DateTime<Utc>) -> ScheduleUpdate {
        ScheduleUpdate::SweepCompleted {
            fingerprint: fp.to_string(),
            display_name: format!("Card {}", fp),
            at,
            outcome,
            interval_days: 14,
        }
    }

    #[test]
    fn test_apply_check() {
        let mut state = ScheduleState::default();
        let at = Utc::now();
        state.apply(&ScheduleUpdate::CheckCompleted {
            fingerprint: "A".to_string(),
            display_name: "SD".to_string(),
            at,
        });

        assert_eq!(state.last_check_time, Some(at));
        assert_eq!(state.drive("A").unwrap().last_check_time, Some(at));
        assert!(state.last_sweep_time.is_none());
        assert!(state.last_drive.is_none());
    }

    #[test]
    fn test_apply_sweep() {
        let mut state = ScheduleState::default();
        let at = Utc::now();
        state.apply(&sweep("A", Outcome::Failed, at));

        let drive = state.drive("A").unwrap();
        assert_eq!(drive.last_sweep_time, Some(at));
        assert_eq!(drive.last_sweep_outcome, Some(Outcome::Failed));
        assert_eq!(drive.sweep_interval_days, Some(14));
        assert_eq!(drive.display_name.as_deref(), Some("Card A"));
        assert_eq!(state.last_drive.as_deref(), Some("A"));
        assert_eq!(state.last_sweep_time, Some(at));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryScheduleStore::new();
        assert_eq!(store.load().unwrap(), ScheduleState::default());
        store.commit(&sweep("A", Outcome::Passed, Utc::now())).unwrap();
        assert!(store.load().unwrap().drive("A").is_some());
    }

    #[test]
    fn test_json_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = JsonScheduleStore::new(dir.path().join("nested/schedule.json"));
        assert_eq!(store.load().unwrap(), ScheduleState::default());

        let at = Utc::now();
        store.commit(&sweep("A", Outcome::Passed, at)).unwrap();
        store.commit(&sweep("B", Outcome::Passed, at)).unwrap();

        let reopened = JsonScheduleStore::new(store.path());
        let state = reopened.load().unwrap();
        assert_eq!(state.drives.len(), 2);
        assert_eq!(state.last_drive.as_deref(), Some("B"));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_json_store_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schedule.json");
        fs::write(&path, "not json").unwrap();
        let store = JsonScheduleStore::new(&path);
        assert!(matches!(store.load(), Err(Error::Schedule(_))));
        assert!(store.commit(&sweep("A", Outcome::Passed, Utc::now())).is_err());
        // The unreadable file is left for the user to inspect
        assert_eq!(fs::read_to_string(&path).unwrap(), "not json");
    }

    #[test]
    fn test_json_store_tolerates_missing_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schedule.json");
        fs::write(&path, r#"{"sweep_interval_days": 10}"#).unwrap();
        let state = JsonScheduleStore::new(&path).load().unwrap();
        assert_eq!(state.sweep_interval_days, Some(10));
        assert!(state.drives.is_empty());
    }

    #[test]
    fn test_card_stamp_roundtrip() {
        let dir = TempDir::new().unwrap();
        assert!(read_card_stamp(dir.path()).is_none());

        let at = Utc::now();
        write_card_stamp(dir.path(), at).unwrap();
        assert_eq!(read_card_stamp(dir.path()), Some(at));
        assert!(dir.path().join(".sentinel").join("last_sweep").exists());
    }

    #[test]
    fn test_card_stamp_garbage_is_none() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".sentinel")).unwrap();
        fs::write(dir.path().join(".sentinel/last_sweep"), "yesterday").unwrap();
        assert!(read_card_stamp(dir.path()).is_none());
    }
}
