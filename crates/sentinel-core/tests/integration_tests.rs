//! Integration tests for sentinel-core
//!
//! These tests run the orchestrator against temporary directories standing
//! in for mounted cards.

use sentinel_core::confidence::{self, Coverage, ScanType};
use sentinel_core::{
    AbortSignal, DriveDescriptor, ManifestStore, MemoryScheduleStore, Outcome, ProbeConfig,
    ProgressEvent, ScanConfig, Sentinel, Stage, BACKUP_CAVEAT,
};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

struct Harness {
    card: TempDir,
    _host: TempDir,
    sentinel: Sentinel,
}

fn harness() -> Harness {
    let card = TempDir::new().unwrap();
    let host = TempDir::new().unwrap();
    let config = ScanConfig::new()
        .quick(ProbeConfig::quick_check().chunk_size(64 * 1024))
        .sweep(ProbeConfig::free_space_sweep().chunk_size(64 * 1024))
        .safety_margin(0);
    let sentinel = Sentinel::new(
        config,
        ManifestStore::new(host.path().join("manifests")).unwrap(),
        MemoryScheduleStore::new(),
    );
    Harness {
        card,
        _host: host,
        sentinel,
    }
}

impl Harness {
    fn drive(&self, free: u64) -> DriveDescriptor {
        DriveDescriptor::new(self.card.path(), "TEST-CARD")
            .with_name("SDCARD")
            .with_capacity(64 * MB, free)
    }

    fn write(&self, rel: &str, data: &[u8]) {
        let path = self.card.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, data).unwrap();
    }

    /// Top-level entries other than Sentinel's own stamp directory
    fn user_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.card.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n != ".sentinel")
            .collect();
        names.sort();
        names
    }
}

/// Aborts once the given number of progress events has been seen
struct AbortAfter {
    seen: AtomicUsize,
    limit: usize,
}

impl AbortAfter {
    fn new(limit: usize) -> Self {
        Self {
            seen: AtomicUsize::new(0),
            limit,
        }
    }

    fn observe(&self, _event: &ProgressEvent) {
        self.seen.fetch_add(1, Ordering::SeqCst);
    }
}

impl AbortSignal for AbortAfter {
    fn is_set(&self) -> bool {
        self.seen.load(Ordering::SeqCst) >= self.limit
    }
}

/// Aborts at the first progress event of the given stage
struct AbortAtStage {
    stage: Stage,
    hit: AtomicBool,
}

impl AbortAtStage {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            hit: AtomicBool::new(false),
        }
    }

    fn observe(&self, event: &ProgressEvent) {
        if event.stage == self.stage {
            self.hit.store(true, Ordering::SeqCst);
        }
    }
}

impl AbortSignal for AbortAtStage {
    fn is_set(&self) -> bool {
        self.hit.load(Ordering::SeqCst)
    }
}

fn count_scratch_dirs(root: &Path) -> usize {
    fs::read_dir(root)
        .unwrap()
        .filter(|e| {
            let name = e.as_ref().unwrap().file_name().to_string_lossy().into_owned();
            name.starts_with("SentinelCheck") || name.starts_with("SentinelSweep")
        })
        .count()
}

// ============================================================================
// Quick check
// ============================================================================

#[test]
fn test_quick_check_passes_and_restores_free_space() {
    let h = harness();
    h.write("DCIM/IMG_0001.JPG", b"jpeg bytes");
    let before = h.user_entries();

    let result = h.sentinel.run_quick_check(&h.drive(20 * MB), None, None, None);

    assert_eq!(result.outcome, Outcome::Passed, "{}", result.details);
    assert_eq!(result.bytes_tested, MB);
    assert_eq!(result.test_size, MB);
    assert!(result.first_mismatch_offset.is_none());
    assert_eq!(h.user_entries(), before);
    assert_eq!(count_scratch_dirs(h.card.path()), 0);
    assert!(h.sentinel.last_check_time(None).is_some());
}

#[test]
fn test_quick_check_result_always_has_backup_caveat() {
    let h = harness();
    let passed = h.sentinel.run_quick_check(&h.drive(20 * MB), None, None, None);
    let errored = h.sentinel.run_quick_check(&h.drive(10), None, None, None);

    for result in [passed, errored] {
        assert_eq!(result.caveats.last().map(String::as_str), Some(BACKUP_CAVEAT));
    }
}

#[test]
fn test_quick_check_abort_leaves_nothing_behind() {
    let h = harness();
    let abort = AbortAfter::new(3);
    let progress = |e: &ProgressEvent| abort.observe(e);

    let result = h
        .sentinel
        .run_quick_check(&h.drive(40 * MB), None, Some(&progress), Some(&abort));

    assert_eq!(result.outcome, Outcome::Aborted);
    assert!(result.bytes_tested < result.test_size);
    assert_eq!(count_scratch_dirs(h.card.path()), 0);
    assert!(h.sentinel.last_check_time(None).is_none());
}

#[test]
fn test_quick_check_on_removed_drive_is_error() {
    let h = harness();
    let drive = DriveDescriptor::new(h.card.path().join("unplugged"), "GONE")
        .with_capacity(GB, GB / 2);

    let result = h.sentinel.run_quick_check(&drive, None, None, None);

    assert_eq!(result.outcome, Outcome::Error);
    assert!(result.message.contains("removed"));
    assert!(h.sentinel.last_check_time(Some(&drive)).is_none());
}

#[test]
fn test_quick_check_reports_progress_stages() {
    let h = harness();
    let stages = std::sync::Mutex::new(Vec::new());
    let progress = |e: &ProgressEvent| {
        let mut stages = stages.lock().unwrap();
        if stages.last() != Some(&e.stage) {
            stages.push(e.stage);
        }
    };

    let result = h
        .sentinel
        .run_quick_check(&h.drive(20 * MB), Some(0.1), Some(&progress), None);

    assert_eq!(result.outcome, Outcome::Passed);
    assert_eq!(result.bytes_tested, 2 * MB);
    assert_eq!(
        stages.into_inner().unwrap(),
        vec![Stage::Writing, Stage::Verifying, Stage::Cleanup]
    );
}

// ============================================================================
// Full sweep
// ============================================================================

#[test]
fn test_full_sweep_is_idempotent() {
    let h = harness();
    h.write("a.txt", b"alpha");
    h.write("music/b.mp3", &[7u8; 5000]);
    let drive = h.drive(MB);

    let load = || {
        h.sentinel
            .manifests()
            .store()
            .load("TEST-CARD")
            .unwrap()
            .expect("a completed sweep stores a manifest")
    };

    let first = h.sentinel.run_full_sweep(&drive, None, None);
    assert_eq!(first.outcome, Outcome::Passed, "{}", first.details);
    assert!(first.manifest_built_fresh);
    let original = load();
    let recorded = |m: &sentinel_core::Manifest| {
        m.entries
            .iter()
            .map(|(path, r)| (path.clone(), r.size, r.hash.clone()))
            .collect::<Vec<_>>()
    };

    for _ in 0..2 {
        let again = h.sentinel.run_full_sweep(&drive, None, None);
        assert_eq!(again.outcome, Outcome::Passed, "{}", again.details);
        assert!(!again.manifest_built_fresh);
        assert!(again.mismatched_paths.is_empty());
        assert!(again.added.is_empty());
        assert!(again.removed.is_empty());
        assert_eq!(again.files_checked, 2);

        let manifest = load();
        assert_eq!(recorded(&manifest), recorded(&original));
        assert_eq!(manifest.created_at, original.created_at);
        assert_eq!(manifest.fingerprint, original.fingerprint);
    }
    assert_eq!(count_scratch_dirs(h.card.path()), 0);
}

#[test]
fn test_hundred_files_then_single_corruption() {
    let h = harness();
    for i in 0..100 {
        h.write(&format!("files/file_{:03}.dat", i), &vec![i as u8; 1024]);
    }
    let drive = h.drive(MB);

    let first = h.sentinel.run_full_sweep(&drive, None, None);
    assert_eq!(first.outcome, Outcome::Passed, "{}", first.details);
    assert!(first.manifest_built_fresh);
    assert_eq!(first.files_checked, 100);

    let mut tampered = vec![42u8; 1024];
    tampered[512] ^= 0xFF;
    h.write("files/file_042.dat", &tampered);

    let second = h.sentinel.run_full_sweep(&drive, None, None);
    assert_eq!(second.outcome, Outcome::Failed);
    assert!(!second.manifest_passed);
    assert!(second.free_space_passed, "probe still runs after file failures");
    assert_eq!(second.mismatched_paths, vec!["files/file_042.dat"]);
    assert_eq!(second.files_checked, 100);
    assert!(second.message.contains("FAILED"));

    let rec = second.recommendation.expect("completed sweep has a recommendation");
    assert_eq!(rec.interval_days, 7);
    assert_eq!(h.sentinel.recommendation(&drive).interval_days, 7);
}

#[test]
fn test_added_and_deleted_files_are_not_failures() {
    let h = harness();
    h.write("keep.txt", b"keep");
    h.write("delete-me.txt", b"bye");
    let drive = h.drive(MB);
    h.sentinel.run_full_sweep(&drive, None, None);

    fs::remove_file(h.card.path().join("delete-me.txt")).unwrap();
    h.write("new.txt", b"hello");
    let result = h.sentinel.run_full_sweep(&drive, None, None);

    assert_eq!(result.outcome, Outcome::Passed, "{}", result.details);
    assert_eq!(result.added, vec!["new.txt"]);
    assert_eq!(result.removed, vec!["delete-me.txt"]);
}

#[test]
fn test_sweep_records_schedule_and_card_stamp() {
    let h = harness();
    h.write("a.txt", b"alpha");
    let drive = h.drive(MB);
    assert!(h.sentinel.is_sweep_due(&drive, None));
    assert!(h.sentinel.last_sweep_time(Some(&drive)).is_none());

    let result = h.sentinel.run_full_sweep(&drive, None, None);
    assert_eq!(result.outcome, Outcome::Passed);

    assert!(h.card.path().join(".sentinel").join("last_sweep").is_file());
    assert!(h.sentinel.last_sweep_time(Some(&drive)).is_some());
    assert!(h.sentinel.last_sweep_time(None).is_some());
    assert!(!h.sentinel.is_sweep_due(&drive, None));
    assert!(h.sentinel.is_sweep_due(&drive, Some(0)));
}

#[test]
fn test_sweep_abort_during_manifest_records_nothing() {
    let h = harness();
    for i in 0..20 {
        h.write(&format!("f{:02}.bin", i), &[1u8; 256]);
    }
    let drive = h.drive(MB);
    let abort = AbortAfter::new(5);
    let progress = |e: &ProgressEvent| abort.observe(e);

    let result = h.sentinel.run_full_sweep(&drive, Some(&progress), Some(&abort));

    assert_eq!(result.outcome, Outcome::Aborted);
    assert!(h.sentinel.last_sweep_time(Some(&drive)).is_none());
    assert!(!h.card.path().join(".sentinel").exists());
    assert!(h.sentinel.manifests().store().load("TEST-CARD").unwrap().is_none());
}

#[test]
fn test_sweep_without_space_for_probe_is_error() {
    let h = harness();
    h.write("a.txt", b"alpha");
    let drive = h.drive(100);

    let result = h.sentinel.run_full_sweep(&drive, None, None);

    assert_eq!(result.outcome, Outcome::Error);
    assert!(h.sentinel.last_sweep_time(Some(&drive)).is_none());
    assert!(h.sentinel.manifests().store().load("TEST-CARD").unwrap().is_none());
}

#[test]
fn test_first_sweep_aborted_in_free_space_stores_no_manifest() {
    let h = harness();
    h.write("a.txt", b"alpha");
    let drive = h.drive(MB);
    let abort = AbortAtStage::new(Stage::Writing);
    let progress = |e: &ProgressEvent| abort.observe(e);

    let result = h.sentinel.run_full_sweep(&drive, Some(&progress), Some(&abort));

    assert_eq!(result.outcome, Outcome::Aborted);
    assert!(h.sentinel.manifests().store().load("TEST-CARD").unwrap().is_none());
    assert!(h.sentinel.last_sweep_time(Some(&drive)).is_none());
    assert_eq!(count_scratch_dirs(h.card.path()), 0);
}

#[test]
fn test_aborted_sweep_does_not_adopt_new_files() {
    let h = harness();
    h.write("a.txt", b"alpha");
    let drive = h.drive(MB);
    let first = h.sentinel.run_full_sweep(&drive, None, None);
    assert_eq!(first.outcome, Outcome::Passed, "{}", first.details);

    h.write("b.txt", b"bravo");
    let abort = AbortAtStage::new(Stage::Writing);
    let progress = |e: &ProgressEvent| abort.observe(e);
    let result = h.sentinel.run_full_sweep(&drive, Some(&progress), Some(&abort));
    assert_eq!(result.outcome, Outcome::Aborted);
    assert_eq!(result.added, vec!["b.txt"]);

    let manifest = h.sentinel.manifests().store().load("TEST-CARD").unwrap().unwrap();
    let keys: Vec<&str> = manifest.entries.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["a.txt"]);

    // The next completed sweep still reports the file as new
    let next = h.sentinel.run_full_sweep(&drive, None, None);
    assert_eq!(next.outcome, Outcome::Passed, "{}", next.details);
    assert_eq!(next.added, vec!["b.txt"]);
}

#[test]
fn test_file_failure_without_space_for_probe_scores_no_coverage() {
    let h = harness();
    h.write("photo.jpg", b"original");
    let first = h.sentinel.run_full_sweep(&h.drive(MB), None, None);
    assert_eq!(first.outcome, Outcome::Passed, "{}", first.details);

    h.write("photo.jpg", b"ORIGINAL");
    let result = h.sentinel.run_full_sweep(&h.drive(100), None, None);

    assert_eq!(result.outcome, Outcome::Failed);
    assert!(result.details.contains("could not run"));
    let expected = confidence::score(ScanType::FullSweep, Coverage::sweep(0.0, false));
    assert_eq!(result.confidence, expected.percent);
    assert_eq!(result.confidence, 0);
}

// ============================================================================
// Worked examples and warnings
// ============================================================================

#[test]
fn test_ten_gigabytes_free_worked_example() {
    let config = ScanConfig::default();
    let planned = config.quick.planned_size(10 * GB);
    assert_eq!(planned, 512 * MB);

    let score = confidence::score(ScanType::QuickCheck, Coverage::quick(0.05, 1.0));
    assert!((35..=45).contains(&score.percent));
}

#[test]
fn test_warnings_for_small_nearly_full_card() {
    let h = harness();
    let drive = DriveDescriptor::new(h.card.path(), "SMALL").with_capacity(2 * GB, 50 * MB);

    let warnings = h.sentinel.warnings(&drive);
    assert!(warnings.iter().any(|w| w.contains("very small")));
    assert!(warnings.iter().any(|w| w.contains("nearly full")));
}
