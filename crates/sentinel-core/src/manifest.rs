//! Per-drive file manifests
//!
//! A [`Manifest`] records the size and SHA-256 digest of every regular file on
//! a card. It is stored on the host (one JSON file per drive fingerprint), so
//! a failing card cannot corrupt its own reference data. Each full sweep
//! re-hashes the files and compares them with the manifest; a file whose
//! content changed without its size or path changing is the signature of
//! silent corruption.
//!
//! [`ManifestEngine::verify_or_build`] never writes: the updated manifest
//! travels in the report and is stored by [`ManifestEngine::commit`] once the
//! whole sweep has finished. Records that failed verification keep their
//! previously trusted values until [`ManifestEngine::rebuild`] is called.

use crate::drive::DriveDescriptor;
use crate::error::{Error, Result};
use crate::pattern::sha256_reader;
use crate::probe::is_scratch_dir_name;
use crate::progress::{throughput, AbortSignal, ProgressEvent, ProgressSink, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Current manifest format version
pub const MANIFEST_VERSION: u32 = 1;

/// Directory at the card root reserved for Sentinel's own files
pub const SENTINEL_DIR: &str = ".sentinel";

const NO_MANIFEST: &str = "no manifest for this drive";

/// Trusted state of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Size in bytes
    pub size: u64,
    /// SHA-256 digest, lowercase hex
    pub hash: String,
    /// When the digest was last confirmed
    pub last_verified: DateTime<Utc>,
}

/// File manifest of one drive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version
    pub version: u32,
    /// Fingerprint of the drive this manifest describes
    pub fingerprint: String,
    /// When the manifest was first built
    pub created_at: DateTime<Utc>,
    /// When the manifest was last rewritten
    pub updated_at: DateTime<Utc>,
    /// Relative path (`/`-separated) to record, in lexicographic order
    pub entries: BTreeMap<String, FileRecord>,
}

impl Manifest {
    /// Create an empty manifest for a drive
    pub fn new(fingerprint: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: MANIFEST_VERSION,
            fingerprint: fingerprint.into(),
            created_at: now,
            updated_at: now,
            entries: BTreeMap::new(),
        }
    }

    /// Check that this manifest can be trusted for the given drive
    pub fn validate(&self, fingerprint: &str) -> Result<()> {
        if self.version != MANIFEST_VERSION {
            return Err(Error::ManifestInvalid(format!(
                "version {} does not match supported version {}",
                self.version, MANIFEST_VERSION
            )));
        }
        if self.fingerprint != fingerprint {
            return Err(Error::ManifestInvalid(format!(
                "belongs to drive {}, not {}",
                self.fingerprint, fingerprint
            )));
        }
        Ok(())
    }

    /// Number of files recorded
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no files are recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Turn a fingerprint into a safe file stem
fn file_stem(fingerprint: &str) -> String {
    let stem: String = fingerprint
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        "unnamed".to_string()
    } else {
        stem
    }
}

/// Host-side storage of manifests, one JSON file per fingerprint
#[derive(Debug, Clone)]
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    /// Create a store in the given directory, creating it if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| {
                Error::Io(io::Error::other(format!(
                    "Failed to create manifest directory {}: {}",
                    dir.display(),
                    e
                )))
            })?;
        }
        Ok(Self { dir })
    }

    /// Directory holding the manifests
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the manifest for a fingerprint
    pub fn path_for(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(fingerprint)))
    }

    /// Load a manifest. `Ok(None)` when none exists; unparseable files are
    /// reported as [`Error::ManifestInvalid`].
    pub fn load(&self, fingerprint: &str) -> Result<Option<Manifest>> {
        let path = self.path_for(fingerprint);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::ManifestInvalid(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        serde_json::from_reader(BufReader::new(file))
            .map(Some)
            .map_err(|e| Error::ManifestInvalid(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Write a manifest atomically (temp file, then rename)
    pub fn save(&self, manifest: &Manifest) -> Result<()> {
        let path = self.path_for(&manifest.fingerprint);
        let temp_path = path.with_extension("json.tmp");

        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, manifest).map_err(|e| {
            Error::Io(io::Error::other(format!("Failed to serialize manifest: {}", e)))
        })?;
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?
            .sync_all()?;

        fs::rename(&temp_path, &path)?;
        debug!("Saved manifest to {}", path.display());
        Ok(())
    }
}

/// Result state of a manifest pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestStatus {
    /// Every recorded file matched, or the manifest was built fresh
    Passed,
    /// At least one file changed content or could not be read
    Failed,
    /// Cancelled; nothing to write
    Aborted,
}

/// Why a recorded file failed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// Same size, different digest
    Content,
    /// Size changed
    Size,
    /// The file could not be read back
    ReadError,
}

/// A recorded file that failed verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMismatch {
    /// Relative path
    pub path: String,
    /// What went wrong
    pub kind: MismatchKind,
}

/// Outcome of [`ManifestEngine::verify_or_build`]
#[derive(Debug, Clone)]
pub struct ManifestReport {
    /// Passed, failed or aborted
    pub status: ManifestStatus,
    /// The manifest was created during this pass
    pub built_fresh: bool,
    /// Files hashed
    pub files_checked: u64,
    /// Bytes hashed
    pub bytes_hashed: u64,
    /// Files that failed verification
    pub mismatched: Vec<FileMismatch>,
    /// Files present on the card but not in the manifest
    pub added: Vec<String>,
    /// Files in the manifest but gone from the card
    pub removed: Vec<String>,
    /// Files skipped for lack of permission
    pub unreadable: Vec<String>,
    /// Why an existing manifest was discarded
    pub rebuild_reason: Option<String>,
    /// Wall time of the pass
    pub elapsed: Duration,
    /// Updated manifest waiting for [`ManifestEngine::commit`]
    pub pending: Option<Manifest>,
}

impl ManifestReport {
    fn new() -> Self {
        Self {
            status: ManifestStatus::Passed,
            built_fresh: false,
            files_checked: 0,
            bytes_hashed: 0,
            mismatched: Vec::new(),
            added: Vec::new(),
            removed: Vec::new(),
            unreadable: Vec::new(),
            rebuild_reason: None,
            elapsed: Duration::ZERO,
            pending: None,
        }
    }

    /// Paths of files that failed verification
    pub fn mismatched_paths(&self) -> Vec<String> {
        self.mismatched.iter().map(|m| m.path.clone()).collect()
    }

    /// Whether the pass passed
    pub fn passed(&self) -> bool {
        self.status == ManifestStatus::Passed
    }
}

/// A regular file found on the card
struct FoundFile {
    rel: String,
    path: PathBuf,
    size: u64,
}

/// Result of hashing one file
enum HashOutcome {
    Hashed(String, u64),
    Denied,
    Failed(io::Error),
}

/// Builds and verifies manifests
#[derive(Debug, Clone)]
pub struct ManifestEngine {
    store: ManifestStore,
    buffer_size: usize,
}

impl ManifestEngine {
    /// Create an engine over a store
    pub fn new(store: ManifestStore) -> Self {
        Self {
            store,
            buffer_size: crate::config::DEFAULT_HASH_BUFFER_SIZE,
        }
    }

    /// Set the read buffer used when hashing
    #[must_use]
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Underlying store
    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    /// Verify the drive against its manifest, or build one if there is no
    /// usable manifest. Nothing is written; pass the report to
    /// [`commit`](Self::commit) once the sweep has finished.
    pub fn verify_or_build(
        &self,
        drive: &DriveDescriptor,
        abort: &dyn AbortSignal,
        progress: &dyn ProgressSink,
    ) -> Result<ManifestReport> {
        ensure_root(drive.root())?;

        let reason = match self.store.load(&drive.fingerprint) {
            Ok(Some(manifest)) => match manifest.validate(&drive.fingerprint) {
                Ok(()) => return self.verify(drive, manifest, abort, progress),
                Err(e) => e.to_string(),
            },
            Ok(None) => {
                info!("No manifest for {}, building one", drive.fingerprint);
                NO_MANIFEST.to_string()
            }
            Err(e) => e.to_string(),
        };

        if is_rebuild_after_invalid(&reason) {
            warn!("Rebuilding manifest for {}: {}", drive.fingerprint, reason);
        }
        let mut report = self.build(drive, abort, progress)?;
        report.rebuild_reason = Some(reason);
        Ok(report)
    }

    /// Discard any stored manifest and accept the current files as trusted
    pub fn rebuild(
        &self,
        drive: &DriveDescriptor,
        abort: &dyn AbortSignal,
        progress: &dyn ProgressSink,
    ) -> Result<ManifestReport> {
        ensure_root(drive.root())?;
        info!("Rebuilding manifest for {} on request", drive.fingerprint);
        let mut report = self.build(drive, abort, progress)?;
        report.rebuild_reason = Some("rebuild requested".to_string());
        self.commit(&mut report)?;
        Ok(report)
    }

    /// Store the manifest carried by a finished pass. Returns whether
    /// anything was written.
    pub fn commit(&self, report: &mut ManifestReport) -> Result<bool> {
        match report.pending.take() {
            Some(manifest) => {
                self.store.save(&manifest)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn build(
        &self,
        drive: &DriveDescriptor,
        abort: &dyn AbortSignal,
        progress: &dyn ProgressSink,
    ) -> Result<ManifestReport> {
        let start = Instant::now();
        let root = drive.root();
        let files = enumerate_files(root)?;
        let total = files.len().max(1);
        let mut report = ManifestReport::new();
        report.built_fresh = true;

        let mut manifest = Manifest::new(&drive.fingerprint);
        let now = Utc::now();

        for (i, file) in files.iter().enumerate() {
            if abort.is_set() {
                info!("Manifest build aborted");
                report.status = ManifestStatus::Aborted;
                report.elapsed = start.elapsed();
                return Ok(report);
            }
            self.emit(progress, Stage::BuildingManifest, i, total, &file.rel, &report, start);

            match self.hash_file(root, &file.path)? {
                HashOutcome::Hashed(hash, size) => {
                    report.files_checked += 1;
                    report.bytes_hashed += size;
                    manifest.entries.insert(
                        file.rel.clone(),
                        FileRecord {
                            size,
                            hash,
                            last_verified: now,
                        },
                    );
                }
                HashOutcome::Denied => {
                    warn!("Skipping unreadable file {}", file.rel);
                    report.unreadable.push(file.rel.clone());
                }
                HashOutcome::Failed(e) => {
                    warn!("Skipping {}: {}", file.rel, e);
                    report.unreadable.push(file.rel.clone());
                }
            }
        }

        manifest.updated_at = Utc::now();
        info!(
            "Built manifest of {} files for {}",
            manifest.len(),
            drive.fingerprint
        );

        report.elapsed = start.elapsed();
        report.pending = Some(manifest);
        Ok(report)
    }

    fn verify(
        &self,
        drive: &DriveDescriptor,
        mut manifest: Manifest,
        abort: &dyn AbortSignal,
        progress: &dyn ProgressSink,
    ) -> Result<ManifestReport> {
        let start = Instant::now();
        let root = drive.root();
        let files = enumerate_files(root)?;
        let total = files.len().max(1);
        let mut report = ManifestReport::new();
        let now = Utc::now();

        let mut updates: BTreeMap<String, FileRecord> = BTreeMap::new();

        for (i, file) in files.iter().enumerate() {
            if abort.is_set() {
                info!("Manifest verification aborted");
                report.status = ManifestStatus::Aborted;
                report.elapsed = start.elapsed();
                return Ok(report);
            }
            self.emit(progress, Stage::VerifyingManifest, i, total, &file.rel, &report, start);

            let Some(record) = manifest.entries.get(&file.rel) else {
                match self.hash_file(root, &file.path)? {
                    HashOutcome::Hashed(hash, size) => {
                        debug!("New file {}", file.rel);
                        report.files_checked += 1;
                        report.bytes_hashed += size;
                        report.added.push(file.rel.clone());
                        updates.insert(
                            file.rel.clone(),
                            FileRecord {
                                size,
                                hash,
                                last_verified: now,
                            },
                        );
                    }
                    HashOutcome::Denied | HashOutcome::Failed(_) => {
                        warn!("Skipping unreadable new file {}", file.rel);
                        report.unreadable.push(file.rel.clone());
                    }
                }
                continue;
            };

            if file.size != record.size {
                warn!(
                    "{} changed size: recorded {}, found {}",
                    file.rel, record.size, file.size
                );
                report.mismatched.push(FileMismatch {
                    path: file.rel.clone(),
                    kind: MismatchKind::Size,
                });
                continue;
            }

            match self.hash_file(root, &file.path)? {
                HashOutcome::Hashed(hash, size) => {
                    report.files_checked += 1;
                    report.bytes_hashed += size;
                    if hash == record.hash && size == record.size {
                        updates.insert(
                            file.rel.clone(),
                            FileRecord {
                                size,
                                hash,
                                last_verified: now,
                            },
                        );
                    } else {
                        warn!("{} no longer matches its recorded digest", file.rel);
                        report.mismatched.push(FileMismatch {
                            path: file.rel.clone(),
                            kind: if size == record.size {
                                MismatchKind::Content
                            } else {
                                MismatchKind::Size
                            },
                        });
                    }
                }
                HashOutcome::Denied => {
                    warn!("Permission denied reading {}", file.rel);
                    report.unreadable.push(file.rel.clone());
                }
                HashOutcome::Failed(e) => {
                    warn!("Read error on {}: {}", file.rel, e);
                    report.mismatched.push(FileMismatch {
                        path: file.rel.clone(),
                        kind: MismatchKind::ReadError,
                    });
                }
            }
        }

        let present: std::collections::BTreeSet<&str> =
            files.iter().map(|f| f.rel.as_str()).collect();
        report.removed = manifest
            .entries
            .keys()
            .filter(|rel| !present.contains(rel.as_str()))
            .cloned()
            .collect();

        for rel in &report.removed {
            debug!("File removed since last sweep: {}", rel);
            manifest.entries.remove(rel);
        }
        manifest.entries.extend(updates);
        manifest.updated_at = Utc::now();

        if !report.mismatched.is_empty() {
            report.status = ManifestStatus::Failed;
        }
        info!(
            "Verified {} files on {}: {} mismatched, {} added, {} removed",
            report.files_checked,
            drive.fingerprint,
            report.mismatched.len(),
            report.added.len(),
            report.removed.len()
        );

        report.elapsed = start.elapsed();
        report.pending = Some(manifest);
        Ok(report)
    }

    fn hash_file(&self, root: &Path, path: &Path) -> Result<HashOutcome> {
        let result = File::open(path).and_then(|file| sha256_reader(file, self.buffer_size));
        match result {
            Ok((hash, size)) => Ok(HashOutcome::Hashed(hash, size)),
            Err(e) => match Error::classify_io(e, root) {
                Error::DriveRemoved(msg) => Err(Error::DriveRemoved(msg)),
                Error::AccessDenied(_) => Ok(HashOutcome::Denied),
                Error::Io(e) => Ok(HashOutcome::Failed(e)),
                other => Err(other),
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        progress: &dyn ProgressSink,
        stage: Stage,
        index: usize,
        total: usize,
        rel: &str,
        report: &ManifestReport,
        start: Instant,
    ) {
        let mut event = ProgressEvent::new(index as f64 / total as f64, stage, rel);
        event.bytes_done = report.bytes_hashed;
        event.elapsed = start.elapsed();
        event.speed_bps = throughput(report.bytes_hashed, event.elapsed);
        progress.report(&event);
    }
}

fn is_rebuild_after_invalid(reason: &str) -> bool {
    reason != NO_MANIFEST
}

fn ensure_root(root: &Path) -> Result<()> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(Error::DriveRemoved(root.display().to_string()))
    }
}

/// Whether a top-level entry belongs to Sentinel rather than the user
fn is_own_entry(name: &str) -> bool {
    name == SENTINEL_DIR || is_scratch_dir_name(name)
}

/// All regular files under `root` in lexicographic order of their
/// `/`-separated relative paths
fn enumerate_files(root: &Path) -> Result<Vec<FoundFile>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() != 1 || !is_own_entry(&entry.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if !root.exists() {
                    return Err(Error::DriveRemoved(root.display().to_string()));
                }
                warn!("Skipping entry during scan: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!("Cannot stat {}: {}", rel, e);
                continue;
            }
        };
        files.push(FoundFile {
            rel,
            path: entry.path().to_path_buf(),
            size,
        });
    }

    files.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(files)
}
