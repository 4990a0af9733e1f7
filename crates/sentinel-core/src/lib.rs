//! # Sentinel Core
//!
//! Scan engine for Sentinel, an active integrity checker for SD cards and
//! other removable flash storage.
//!
//! ## Modules
//!
//! - `probe`: pattern write/verify of disposable data in free space
//! - `manifest`: per-drive file manifests to detect silent corruption
//! - `confidence`: confidence scores, caveats and drive warnings
//! - `recommend`: re-check interval recommendations
//! - `schedule`: scan history store and the on-card sweep stamp
//! - `progress`: cancellation tokens and progress sinks
//! - `error`: Error types and result aliases
//! - `config`: Runtime configuration
//! - `settings`: Persistent user settings from configuration file
//!
//! ## Example
//!
//! ```ignore
//! use sentinel_core::{DriveDescriptor, Sentinel, ScanConfig};
//!
//! let sentinel = Sentinel::open_default(ScanConfig::default())?;
//! let drive = DriveDescriptor::new("/media/user/SDCARD", "1234-ABCD")
//!     .with_capacity(64 << 30, 10 << 30);
//!
//! let progress = |e: &sentinel_core::ProgressEvent| {
//!     println!("{} {:.1}% {}", e.stage, e.percentage(), e.speed_display())
//! };
//! let result = sentinel.run_quick_check(&drive, None, Some(&progress), None);
//! println!("{}: {} ({}% confidence)", result.outcome, result.message, result.confidence);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod confidence;
pub mod config;
pub mod drive;
pub mod error;
pub mod manifest;
pub mod pattern;
pub mod probe;
pub mod progress;
pub mod recommend;
pub mod result;
pub mod schedule;
pub mod settings;
pub mod units;

pub use confidence::{Confidence, Coverage, ScanType, BACKUP_CAVEAT};
pub use config::{ProbeConfig, ScanConfig, SAFETY_MARGIN};
pub use drive::{DriveDescriptor, MediaClass};
pub use error::{Error, Result};
pub use manifest::{
    FileMismatch, FileRecord, Manifest, ManifestEngine, ManifestReport, ManifestStatus,
    ManifestStore, MismatchKind, MANIFEST_VERSION,
};
pub use probe::{FreeSpaceProber, PatternWriteVerifier, ProbeReport, ProbeStatus};
pub use progress::{AbortSignal, AbortToken, NeverAbort, NoProgress, ProgressEvent, ProgressSink, Stage};
pub use recommend::{Recommendation, SweepHistory};
pub use result::{FullSweepResult, Outcome, QuickCheckResult};
pub use schedule::{
    DriveSchedule, JsonScheduleStore, MemoryScheduleStore, ScheduleState, ScheduleStore,
    ScheduleUpdate,
};
pub use settings::{BehaviorSettings, CheckSettings, Settings, SettingsError, SweepSettings};
pub use units::{format_bytes, format_speed, parse_size};

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tracing::{info, warn};

/// Application directory name under the platform data directory
const APP_NAME: &str = "sentinel";

/// Default directory for manifests and the schedule file
pub fn default_data_dir() -> Option<PathBuf> {
    dirs_next::data_local_dir().map(|p| p.join(APP_NAME))
}

/// Maps a phase's 0..1 progress into its share of the whole operation
struct PhaseSink<'a> {
    inner: &'a dyn ProgressSink,
    offset: f64,
    scale: f64,
}

impl ProgressSink for PhaseSink<'_> {
    fn report(&self, event: &ProgressEvent) {
        let mut scaled = event.clone();
        scaled.fraction = (self.offset + event.fraction * self.scale).clamp(0.0, 1.0);
        self.inner.report(&scaled);
    }
}

/// Removes a fingerprint from the in-flight registry when dropped
struct ScanGuard<'a> {
    registry: &'a Mutex<HashSet<String>>,
    fingerprint: String,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.fingerprint);
    }
}

/// Sequences probes, manifests, scoring and scheduling into the two public
/// scan operations.
///
/// Both operations block until an outcome is reached and never return `Err`;
/// faults are folded into [`Outcome::Error`] with a diagnostic message.
pub struct Sentinel {
    config: ScanConfig,
    manifests: ManifestEngine,
    schedule: Box<dyn ScheduleStore>,
    in_flight: Mutex<HashSet<String>>,
}

impl Sentinel {
    /// Create an orchestrator over explicit stores
    pub fn new(
        config: ScanConfig,
        manifests: ManifestStore,
        schedule: impl ScheduleStore + 'static,
    ) -> Self {
        let manifests = ManifestEngine::new(manifests).buffer_size(config.hash_buffer_size);
        Self {
            config,
            manifests,
            schedule: Box::new(schedule),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Keep manifests and the schedule under `data_dir`
    pub fn open_in(data_dir: &Path, config: ScanConfig) -> Result<Self> {
        let manifests = ManifestStore::new(data_dir.join("manifests"))?;
        let schedule = JsonScheduleStore::new(data_dir.join("schedule.json"));
        Ok(Self::new(config, manifests, schedule))
    }

    /// Keep manifests and the schedule in the platform data directory
    pub fn open_default(config: ScanConfig) -> Result<Self> {
        let dir = default_data_dir()
            .ok_or_else(|| Error::InvalidConfig("could not determine data directory".into()))?;
        Self::open_in(&dir, config)
    }

    /// Active configuration
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Manifest engine in use
    pub fn manifests(&self) -> &ManifestEngine {
        &self.manifests
    }

    fn acquire(&self, fingerprint: &str) -> Result<ScanGuard<'_>> {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !set.insert(fingerprint.to_string()) {
            return Err(Error::ScanInProgress(fingerprint.to_string()));
        }
        Ok(ScanGuard {
            registry: &self.in_flight,
            fingerprint: fingerprint.to_string(),
        })
    }

    fn commit(&self, update: &ScheduleUpdate) -> Option<String> {
        match self.schedule.commit(update) {
            Ok(()) => None,
            Err(e) => {
                warn!("Failed to record scan in schedule: {}", e);
                Some(format!("The scan could not be recorded: {}", e))
            }
        }
    }

    fn state(&self) -> ScheduleState {
        self.schedule.load().unwrap_or_else(|e| {
            warn!("Failed to load schedule: {}", e);
            ScheduleState::default()
        })
    }

    /// Write/verify a share of the drive's free space.
    ///
    /// `size_fraction` defaults to the configured quick-check fraction. On a
    /// passed or failed run the check time is recorded.
    pub fn run_quick_check(
        &self,
        drive: &DriveDescriptor,
        size_fraction: Option<f64>,
        progress: Option<&dyn ProgressSink>,
        abort: Option<&dyn AbortSignal>,
    ) -> QuickCheckResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let progress = progress.unwrap_or(&NoProgress);
        let abort = abort.unwrap_or(&NeverAbort);
        let fp = drive.fingerprint.as_str();

        let not_run = |err: Error| {
            warn!("Quick check on {} could not run: {}", fp, err);
            let mut result = QuickCheckResult::not_run(
                fp,
                Outcome::Error,
                describe_error("Quick check", &err),
                err.to_string(),
                started_at,
            );
            result.caveats.push(BACKUP_CAVEAT.to_string());
            result.warnings = confidence::warnings(drive);
            result.elapsed_secs = start.elapsed().as_secs_f64();
            result
        };

        let _guard = match self.acquire(fp) {
            Ok(guard) => guard,
            Err(e) => return not_run(e),
        };

        let fraction = size_fraction.unwrap_or(self.config.quick.coverage);
        if !(fraction > 0.0 && fraction <= 1.0) {
            return not_run(Error::InvalidConfig(format!(
                "size fraction {} is not in (0, 1]",
                fraction
            )));
        }

        info!("Starting quick check of {}", drive.display_name());
        let verifier = PatternWriteVerifier::new(self.config.quick.clone());
        let report = match verifier.run(drive, fraction, abort, progress) {
            Ok(report) => report,
            Err(e) => return not_run(e),
        };

        let outcome = match report.status {
            ProbeStatus::Passed => Outcome::Passed,
            ProbeStatus::Failed => Outcome::Failed,
            ProbeStatus::Aborted => Outcome::Aborted,
        };
        let score = confidence::score(
            ScanType::QuickCheck,
            Coverage::quick(fraction, report.tested_fraction()),
        );

        let (message, mut details) = match outcome {
            Outcome::Passed => (
                "Quick check passed".to_string(),
                format!(
                    "Wrote and verified {} of test data ({:.0}% of free space) at {} write, {} read.",
                    format_bytes(report.bytes_tested),
                    fraction * 100.0,
                    format_speed(report.write_speed_bps),
                    format_speed(report.read_speed_bps)
                ),
            ),
            Outcome::Failed => (
                "Quick check FAILED: data read back differently than written".to_string(),
                match report.error() {
                    Some(e) => format!(
                        "{}. The card may be failing: back up its contents and replace it.",
                        e
                    ),
                    None => "The card may be failing.".to_string(),
                },
            ),
            _ => (
                "Quick check cancelled".to_string(),
                format!(
                    "{} of {} verified before cancellation.",
                    format_bytes(report.bytes_tested),
                    format_bytes(report.test_size)
                ),
            ),
        };

        if outcome.is_complete() {
            let update = ScheduleUpdate::CheckCompleted {
                fingerprint: fp.to_string(),
                display_name: drive.display_name(),
                at: Utc::now(),
            };
            if let Some(note) = self.commit(&update) {
                details = format!("{} {}", details, note);
            }
        }

        info!("Quick check of {}: {}", fp, outcome);
        QuickCheckResult {
            outcome,
            message,
            details,
            fingerprint: fp.to_string(),
            confidence: score.percent,
            caveats: score.caveats,
            warnings: confidence::warnings(drive),
            size_fraction: fraction,
            test_size: report.test_size,
            bytes_tested: report.bytes_tested,
            first_mismatch_offset: report.first_mismatch_offset(),
            chunks_verified: report.chunks_verified,
            chunks_total: report.chunks_total,
            write_speed_bps: report.write_speed_bps,
            read_speed_bps: report.read_speed_bps,
            started_at,
            elapsed_secs: start.elapsed().as_secs_f64(),
        }
    }

    /// Verify existing files against the manifest, then probe all usable
    /// free space.
    ///
    /// The free-space probe runs even when file verification fails. On a
    /// passed or failed run the sweep is recorded in the schedule and stamped
    /// on the card.
    pub fn run_full_sweep(
        &self,
        drive: &DriveDescriptor,
        progress: Option<&dyn ProgressSink>,
        abort: Option<&dyn AbortSignal>,
    ) -> FullSweepResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let progress = progress.unwrap_or(&NoProgress);
        let abort = abort.unwrap_or(&NeverAbort);
        let fp = drive.fingerprint.as_str();

        let finish = |mut result: FullSweepResult| {
            if !result.caveats.iter().any(|c| c == BACKUP_CAVEAT) {
                result.caveats.push(BACKUP_CAVEAT.to_string());
            }
            result.warnings = confidence::warnings(drive);
            result.elapsed_secs = start.elapsed().as_secs_f64();
            info!("Full sweep of {}: {}", fp, result.outcome);
            result
        };
        let failed_to_run = |err: Error| {
            warn!("Full sweep on {} could not run: {}", fp, err);
            finish(FullSweepResult::not_run(
                fp,
                Outcome::Error,
                describe_error("Full sweep", &err),
                err.to_string(),
                started_at,
            ))
        };

        let _guard = match self.acquire(fp) {
            Ok(guard) => guard,
            Err(e) => return failed_to_run(e),
        };

        info!("Starting full sweep of {}", drive.display_name());

        // Split the progress bar by the bytes each phase will touch
        let planned_probe = self.config.sweep.planned_size(drive.free_bytes);
        let used = drive.used_bytes();
        let manifest_share = if used + planned_probe == 0 {
            0.5
        } else {
            used as f64 / (used + planned_probe) as f64
        };

        let manifest_sink = PhaseSink {
            inner: progress,
            offset: 0.0,
            scale: manifest_share,
        };
        let mut manifest = match self.manifests.verify_or_build(drive, abort, &manifest_sink) {
            Ok(report) => report,
            Err(e) => return failed_to_run(e),
        };

        let mut result = FullSweepResult::not_run(fp, Outcome::Error, "", "", started_at);
        result.manifest_passed = manifest.status == ManifestStatus::Passed;
        result.manifest_built_fresh = manifest.built_fresh;
        result.manifest_rebuild_reason = manifest.rebuild_reason.clone();
        result.files_checked = manifest.files_checked;
        result.mismatched_paths = manifest.mismatched_paths();
        result.added = manifest.added.clone();
        result.removed = manifest.removed.clone();
        result.unreadable = manifest.unreadable.clone();

        if manifest.status == ManifestStatus::Aborted {
            result.outcome = Outcome::Aborted;
            result.message = "Full sweep cancelled".to_string();
            result.details = "Cancelled while checking existing files; nothing was recorded."
                .to_string();
            return finish(result);
        }

        let probe_sink = PhaseSink {
            inner: progress,
            offset: manifest_share,
            scale: 1.0 - manifest_share,
        };
        let prober = FreeSpaceProber::new(self.config.sweep.clone());
        let probe = match prober.run(drive, abort, &probe_sink) {
            Ok(report) => report,
            Err(e) if result.manifest_passed => return failed_to_run(e),
            Err(e) => {
                // File corruption is already conclusive
                warn!("Free-space probe could not run: {}", e);
                result.details = format!("Free-space probe could not run: {}.", e);
                return self.complete_sweep(drive, result, &mut manifest, 0.0, finish);
            }
        };

        result.free_space_test_size = probe.test_size;
        result.free_space_bytes_tested = probe.bytes_tested;
        result.first_mismatch_offset = probe.first_mismatch_offset();
        result.free_space_passed = probe.passed();

        if probe.status == ProbeStatus::Aborted {
            result.outcome = Outcome::Aborted;
            result.message = "Full sweep cancelled".to_string();
            result.details = format!(
                "Cancelled during the free-space probe after {} of {}; nothing was recorded.",
                format_bytes(probe.bytes_tested),
                format_bytes(probe.test_size)
            );
            let score = confidence::score(
                ScanType::FullSweep,
                Coverage::sweep(probe.tested_fraction(), manifest.built_fresh),
            );
            result.confidence = score.percent;
            result.caveats = score.caveats;
            return finish(result);
        }

        let mut details = Vec::new();
        if manifest.built_fresh {
            details.push(format!(
                "Indexed {} files for future comparison.",
                manifest.files_checked
            ));
        } else {
            details.push(format!(
                "Verified {} files: {} mismatched, {} new, {} removed.",
                manifest.files_checked,
                manifest.mismatched.len(),
                manifest.added.len(),
                manifest.removed.len()
            ));
        }
        match probe.error() {
            Some(e) => details.push(format!("Free-space probe failed: {}.", e)),
            None => details.push(format!(
                "Wrote and verified {} of free space.",
                format_bytes(probe.bytes_tested)
            )),
        }
        result.details = details.join(" ");

        let coverage = probe.tested_fraction();
        self.complete_sweep(drive, result, &mut manifest, coverage, finish)
    }

    /// Record a sweep that reached a verdict: the updated manifest, the
    /// schedule entry and the card stamp
    fn complete_sweep(
        &self,
        drive: &DriveDescriptor,
        mut result: FullSweepResult,
        manifest: &mut ManifestReport,
        coverage: f64,
        finish: impl Fn(FullSweepResult) -> FullSweepResult,
    ) -> FullSweepResult {
        let passed = result.manifest_passed && result.free_space_passed;
        result.outcome = if passed { Outcome::Passed } else { Outcome::Failed };
        result.message = if passed {
            "Full sweep passed".to_string()
        } else if !result.manifest_passed {
            format!(
                "Full sweep FAILED: {} file(s) no longer match their recorded contents",
                result.mismatched_paths.len()
            )
        } else {
            "Full sweep FAILED: free space did not read back as written".to_string()
        };

        let score = confidence::score(
            ScanType::FullSweep,
            Coverage::sweep(coverage, result.manifest_built_fresh),
        );
        result.confidence = score.percent;
        result.caveats = score.caveats;

        let recommendation = recommend::recommend(
            drive,
            &SweepHistory {
                last_sweep_failed: !passed,
            },
        );

        if let Err(e) = self.manifests.commit(manifest) {
            warn!("Failed to save manifest for {}: {}", drive.fingerprint, e);
            result.details = format!(
                "{} The file manifest could not be saved: {}",
                result.details, e
            );
        }

        let at = Utc::now();
        let update = ScheduleUpdate::SweepCompleted {
            fingerprint: drive.fingerprint.clone(),
            display_name: drive.display_name(),
            at,
            outcome: result.outcome,
            interval_days: recommendation.interval_days,
        };
        if let Some(note) = self.commit(&update) {
            result.details = format!("{} {}", result.details, note);
        }
        if let Err(e) = schedule::write_card_stamp(drive.root(), at) {
            warn!("Could not write sweep stamp to {}: {}", drive.root().display(), e);
        }

        result.recommendation = Some(recommendation);
        finish(result)
    }

    /// Discard the stored manifest and index the drive's current files
    pub fn rebuild_manifest(
        &self,
        drive: &DriveDescriptor,
        progress: Option<&dyn ProgressSink>,
        abort: Option<&dyn AbortSignal>,
    ) -> Result<ManifestReport> {
        let _guard = self.acquire(&drive.fingerprint)?;
        self.manifests.rebuild(
            drive,
            abort.unwrap_or(&NeverAbort),
            progress.unwrap_or(&NoProgress),
        )
    }

    /// Interval in days between sweeps of this drive: its last recommended
    /// interval, else the stored default, else the configured default
    pub fn sweep_interval_days(&self, drive: &DriveDescriptor) -> u32 {
        let state = self.state();
        state
            .drive(&drive.fingerprint)
            .and_then(|d| d.sweep_interval_days)
            .or(state.sweep_interval_days)
            .unwrap_or(self.config.default_interval_days)
    }

    /// Whether a full sweep of the drive is due
    pub fn is_sweep_due(&self, drive: &DriveDescriptor, interval_override: Option<u32>) -> bool {
        let interval = interval_override.unwrap_or_else(|| self.sweep_interval_days(drive));
        recommend::is_sweep_due(self.last_sweep_time(Some(drive)), interval, Utc::now())
    }

    /// Last completed quick check of a drive, or of any drive
    pub fn last_check_time(&self, drive: Option<&DriveDescriptor>) -> Option<DateTime<Utc>> {
        let state = self.state();
        match drive {
            Some(d) => state.drive(&d.fingerprint).and_then(|s| s.last_check_time),
            None => state.last_check_time,
        }
    }

    /// Last completed full sweep of a drive (on-card stamp preferred), or of
    /// any drive
    pub fn last_sweep_time(&self, drive: Option<&DriveDescriptor>) -> Option<DateTime<Utc>> {
        match drive {
            Some(d) => schedule::read_card_stamp(d.root()).or_else(|| {
                self.state()
                    .drive(&d.fingerprint)
                    .and_then(|s| s.last_sweep_time)
            }),
            None => self.state().last_sweep_time,
        }
    }

    /// Recommended sweep interval for a drive, given its history
    pub fn recommendation(&self, drive: &DriveDescriptor) -> Recommendation {
        let last_sweep_failed = self
            .state()
            .drive(&drive.fingerprint)
            .and_then(|d| d.last_sweep_outcome)
            == Some(Outcome::Failed);
        recommend::recommend(drive, &SweepHistory { last_sweep_failed })
    }

    /// Warnings about the drive itself
    pub fn warnings(&self, drive: &DriveDescriptor) -> Vec<String> {
        confidence::warnings(drive)
    }
}

fn describe_error(operation: &str, err: &Error) -> String {
    match err {
        Error::InsufficientSpace { .. } => {
            format!("{} could not run: not enough free space", operation)
        }
        Error::DriveRemoved(_) => format!("{} stopped: the drive was removed", operation),
        Error::AccessDenied(_) => format!("{} could not run: access denied", operation),
        Error::ScanInProgress(_) => format!("{} is already running on this drive", operation),
        Error::InvalidConfig(_) => format!("{} could not run: invalid settings", operation),
        _ => format!("{} could not determine drive health", operation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::MockScheduleStore;
    use std::cell::RefCell;
    use tempfile::TempDir;

    const MB: u64 = 1024 * 1024;

    fn test_config() -> ScanConfig {
        ScanConfig::new()
            .quick(ProbeConfig::quick_check().chunk_size(64 * 1024))
            .sweep(ProbeConfig::free_space_sweep().chunk_size(64 * 1024))
            .safety_margin(0)
    }

    fn card(dir: &TempDir, free: u64) -> DriveDescriptor {
        DriveDescriptor::new(dir.path(), "CARD").with_capacity(free * 4, free)
    }

    fn sentinel_with(store: impl ScheduleStore + 'static, host: &TempDir) -> Sentinel {
        Sentinel::new(
            test_config(),
            ManifestStore::new(host.path()).unwrap(),
            store,
        )
    }

    #[test]
    fn test_quick_check_commits_on_pass() {
        let card_dir = TempDir::new().unwrap();
        let host = TempDir::new().unwrap();
        let mut store = MockScheduleStore::new();
        store
            .expect_commit()
            .withf(|u| matches!(u, ScheduleUpdate::CheckCompleted { fingerprint, .. } if fingerprint == "CARD"))
            .times(1)
            .returning(|_| Ok(()));

        let sentinel = sentinel_with(store, &host);
        let result = sentinel.run_quick_check(&card(&card_dir, 20 * MB), None, None, None);

        assert_eq!(result.outcome, Outcome::Passed);
        assert_eq!(result.bytes_tested, MB);
        assert_eq!(result.confidence, 40);
        assert!(result.caveats.iter().any(|c| c == BACKUP_CAVEAT));
    }

    #[test]
    fn test_quick_check_abort_does_not_commit() {
        let card_dir = TempDir::new().unwrap();
        let host = TempDir::new().unwrap();
        let mut store = MockScheduleStore::new();
        store.expect_commit().never();

        let sentinel = sentinel_with(store, &host);
        let token = AbortToken::new();
        token.abort();
        let result =
            sentinel.run_quick_check(&card(&card_dir, 20 * MB), None, None, Some(&token));

        assert_eq!(result.outcome, Outcome::Aborted);
        assert_eq!(fs_entries(&card_dir), 0);
    }

    #[test]
    fn test_quick_check_error_does_not_commit() {
        let card_dir = TempDir::new().unwrap();
        let host = TempDir::new().unwrap();
        let mut store = MockScheduleStore::new();
        store.expect_commit().never();

        let sentinel = sentinel_with(store, &host);
        let result = sentinel.run_quick_check(&card(&card_dir, 100), None, None, None);

        assert_eq!(result.outcome, Outcome::Error);
        assert!(result.message.contains("not enough free space"));
        assert!(!result.caveats.is_empty());
    }

    #[test]
    fn test_quick_check_rejects_bad_fraction() {
        let card_dir = TempDir::new().unwrap();
        let host = TempDir::new().unwrap();
        let sentinel = sentinel_with(MemoryScheduleStore::new(), &host);

        let result = sentinel.run_quick_check(&card(&card_dir, 20 * MB), Some(1.5), None, None);
        assert_eq!(result.outcome, Outcome::Error);
        assert!(sentinel.last_check_time(None).is_none());
    }

    #[test]
    fn test_schedule_failure_still_reports_result() {
        let card_dir = TempDir::new().unwrap();
        let host = TempDir::new().unwrap();
        let mut store = MockScheduleStore::new();
        store
            .expect_commit()
            .returning(|_| Err(Error::Schedule("disk full".to_string())));

        let sentinel = sentinel_with(store, &host);
        let result = sentinel.run_quick_check(&card(&card_dir, 20 * MB), None, None, None);

        assert_eq!(result.outcome, Outcome::Passed);
        assert!(result.details.contains("could not be recorded"));
    }

    #[test]
    fn test_progress_is_monotonic_across_sweep_phases() {
        let card_dir = TempDir::new().unwrap();
        let host = TempDir::new().unwrap();
        std::fs::write(card_dir.path().join("a.bin"), vec![1u8; 300_000]).unwrap();
        let sentinel = sentinel_with(MemoryScheduleStore::new(), &host);

        let fractions = RefCell::new(Vec::new());
        let sink = |e: &ProgressEvent| fractions.borrow_mut().push(e.fraction);
        let result = sentinel.run_full_sweep(&card(&card_dir, 512 * 1024), Some(&sink), None);

        assert_eq!(result.outcome, Outcome::Passed);
        let fractions = fractions.into_inner();
        assert!(!fractions.is_empty());
        assert!(fractions.windows(2).all(|w| w[1] >= w[0] - 1e-9));
        assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));
    }

    #[test]
    fn test_sweep_commits_and_stamps_card() {
        let card_dir = TempDir::new().unwrap();
        let host = TempDir::new().unwrap();
        std::fs::write(card_dir.path().join("a.txt"), b"hello").unwrap();
        let mut store = MockScheduleStore::new();
        store
            .expect_commit()
            .withf(|u| {
                matches!(
                    u,
                    ScheduleUpdate::SweepCompleted {
                        outcome: Outcome::Passed,
                        interval_days: 7,
                        ..
                    }
                )
            })
            .times(1)
            .returning(|_| Ok(()));
        store.expect_load().returning(|| Ok(ScheduleState::default()));

        let sentinel = sentinel_with(store, &host);
        let drive = card(&card_dir, 512 * 1024);
        let result = sentinel.run_full_sweep(&drive, None, None);

        assert_eq!(result.outcome, Outcome::Passed);
        assert!(result.manifest_built_fresh);
        assert!(result.recommendation.is_some());
        assert!(sentinel.last_sweep_time(Some(&drive)).is_some());
        assert!(!sentinel.is_sweep_due(&drive, None));
    }

    #[test]
    fn test_concurrent_scan_of_same_drive_rejected() {
        let card_dir = TempDir::new().unwrap();
        let host = TempDir::new().unwrap();
        let sentinel = sentinel_with(MemoryScheduleStore::new(), &host);
        let drive = card(&card_dir, 20 * MB);

        let guard = sentinel.acquire("CARD").unwrap();
        let result = sentinel.run_quick_check(&drive, None, None, None);
        assert_eq!(result.outcome, Outcome::Error);
        assert!(result.message.contains("already running"));

        let sweep = sentinel.run_full_sweep(&drive, None, None);
        assert_eq!(sweep.outcome, Outcome::Error);

        drop(guard);
        let result = sentinel.run_quick_check(&drive, None, None, None);
        assert_eq!(result.outcome, Outcome::Passed);
    }

    #[test]
    fn test_poisoned_registry_still_admits_scans() {
        let card_dir = TempDir::new().unwrap();
        let host = TempDir::new().unwrap();
        let sentinel = sentinel_with(MemoryScheduleStore::new(), &host);
        let drive = card(&card_dir, 20 * MB);

        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _set = sentinel.in_flight.lock().unwrap();
            panic!("scan thread died");
        }));
        assert!(sentinel.in_flight.is_poisoned());

        let result = sentinel.run_quick_check(&drive, None, None, None);
        assert_eq!(result.outcome, Outcome::Passed);
        // The guard released the drive despite the poison
        assert!(sentinel.acquire("CARD").is_ok());
    }

    #[test]
    fn test_different_drives_are_independent() {
        let host = TempDir::new().unwrap();
        let sentinel = sentinel_with(MemoryScheduleStore::new(), &host);
        let _guard = sentinel.acquire("OTHER").unwrap();

        let card_dir = TempDir::new().unwrap();
        let result = sentinel.run_quick_check(&card(&card_dir, 20 * MB), None, None, None);
        assert_eq!(result.outcome, Outcome::Passed);
    }

    #[test]
    fn test_sweep_interval_resolution() {
        let host = TempDir::new().unwrap();
        let card_dir = TempDir::new().unwrap();
        let drive = card(&card_dir, 20 * MB);

        let sentinel = sentinel_with(MemoryScheduleStore::new(), &host);
        assert_eq!(sentinel.sweep_interval_days(&drive), 14);

        let state = ScheduleState {
            sweep_interval_days: Some(10),
            ..ScheduleState::default()
        };
        let sentinel = sentinel_with(MemoryScheduleStore::with_state(state), &host);
        assert_eq!(sentinel.sweep_interval_days(&drive), 10);
    }

    #[test]
    fn test_recommendation_uses_failed_history() {
        let host = TempDir::new().unwrap();
        let card_dir = TempDir::new().unwrap();
        let drive = DriveDescriptor::new(card_dir.path(), "CARD").with_capacity(512 << 30, 1 << 30);

        let store = MemoryScheduleStore::new();
        store
            .commit(&ScheduleUpdate::SweepCompleted {
                fingerprint: "CARD".to_string(),
                display_name: "SD".to_string(),
                at: Utc::now(),
                outcome: Outcome::Failed,
                interval_days: 7,
            })
            .unwrap();
        let sentinel = sentinel_with(store, &host);
        assert_eq!(sentinel.recommendation(&drive).interval_days, 7);
    }

    fn fs_entries(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }
}
