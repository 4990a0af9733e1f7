//! Pattern write/verify probes
//!
//! [`PatternWriteVerifier`] writes a disposable region of deterministic
//! pattern data into free space, flushes it to the medium, evicts it from the
//! page cache where possible, reads it back and compares digests. The quick
//! check and the deep scan's [`FreeSpaceProber`] are the same engine run with
//! different [`ProbeConfig`] profiles.
//!
//! All test data lives in a uniquely named scratch directory at the drive
//! root which is removed on every exit path.

use crate::config::{ProbeConfig, QUICK_SCRATCH_PREFIX, SWEEP_SCRATCH_PREFIX};
use crate::drive::DriveDescriptor;
use crate::error::{Error, Result};
use crate::pattern::{to_hex, PatternGenerator};
use crate::progress::{throughput, AbortSignal, ProgressEvent, ProgressSink, Stage};
use crate::units::format_bytes;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

type ChunkDigest = sha2::digest::Output<Sha256>;

/// Result state of a probe run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// Everything read back matched
    Passed,
    /// Read-back data differed from what was written
    Failed,
    /// Cancelled before completion
    Aborted,
}

/// First difference found during read-back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Byte offset within the tested region
    pub offset: u64,
    /// Digest of the chunk as written
    pub expected: String,
    /// Digest read back, or a description of the read fault
    pub actual: String,
}

impl From<Mismatch> for Error {
    fn from(m: Mismatch) -> Self {
        Error::IntegrityMismatch {
            offset: m.offset,
            expected: m.expected,
            actual: m.actual,
        }
    }
}

/// Outcome of one probe run
#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// Passed, failed or aborted
    pub status: ProbeStatus,

    /// Bytes written and read back intact
    pub bytes_tested: u64,

    /// Planned size of the test region
    pub test_size: u64,

    /// First mismatch, if any
    pub mismatch: Option<Mismatch>,

    /// Chunks verified intact
    pub chunks_verified: u64,

    /// Chunks in the planned region
    pub chunks_total: u64,

    /// Test files created
    pub files_written: u32,

    /// Pattern seed of this run
    pub seed: u64,

    /// Average write throughput
    pub write_speed_bps: u64,

    /// Average read-back throughput
    pub read_speed_bps: u64,

    /// Wall time of the run
    pub elapsed: Duration,
}

impl ProbeReport {
    /// Offset of the first mismatching chunk
    pub fn first_mismatch_offset(&self) -> Option<u64> {
        self.mismatch.as_ref().map(|m| m.offset)
    }

    /// Share of the planned region that was verified (0.0 - 1.0)
    pub fn tested_fraction(&self) -> f64 {
        if self.test_size == 0 {
            return 0.0;
        }
        (self.bytes_tested as f64 / self.test_size as f64).min(1.0)
    }

    /// Whether the run passed
    pub fn passed(&self) -> bool {
        self.status == ProbeStatus::Passed
    }

    /// The mismatch as an error, for callers that propagate it
    pub fn error(&self) -> Option<Error> {
        self.mismatch.clone().map(Error::from)
    }
}

/// Whether a directory name belongs to a probe's scratch area
pub fn is_scratch_dir_name(name: &str) -> bool {
    [QUICK_SCRATCH_PREFIX, SWEEP_SCRATCH_PREFIX]
        .iter()
        .any(|prefix| {
            name.strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('_'))
        })
}

/// Scratch directory removed when dropped
#[derive(Debug)]
pub struct ScratchArea {
    path: PathBuf,
}

impl ScratchArea {
    /// Create `<root>/<prefix>_<YYYYmmdd_HHMMSS>_<hex>`
    pub fn create(root: &Path, prefix: &str) -> io::Result<Self> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let mut salt = PatternGenerator::from_entropy().seed();

        for _ in 0..16 {
            let name = format!("{}_{}_{:08x}", prefix, stamp, salt as u32);
            let path = root.join(name);
            match fs::create_dir(&path) {
                Ok(()) => {
                    debug!("Created scratch directory {}", path.display());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    salt = salt.rotate_left(13).wrapping_add(1);
                }
                Err(e) => return Err(e),
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "could not find a free scratch directory name",
        ))
    }

    /// Path of the scratch directory
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchArea {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed scratch directory {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove scratch directory {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        /// Evict a file's pages from the OS cache so reads hit the medium
        fn drop_page_cache(file: &File) -> io::Result<()> {
            use std::os::unix::io::AsRawFd;

            let fd = file.as_raw_fd();
            // SAFETY: posix_fadvise() is called with a valid file descriptor obtained
            // from as_raw_fd(). The fd remains valid for the lifetime of `file`.
            #[allow(unsafe_code)]
            let result = unsafe { libc::posix_fadvise(fd, 0, 0, libc::POSIX_FADV_DONTNEED) };
            if result == 0 {
                Ok(())
            } else {
                Err(io::Error::from_raw_os_error(result))
            }
        }
    } else {
        fn drop_page_cache(_file: &File) -> io::Result<()> {
            Ok(())
        }
    }
}

/// Split a region into test file sizes no larger than `max_file`
fn plan_files(test_size: u64, max_file: u64) -> Vec<u64> {
    let max_file = max_file.max(1);
    let mut files = Vec::new();
    let mut remaining = test_size;
    while remaining > 0 {
        let size = remaining.min(max_file);
        files.push(size);
        remaining -= size;
    }
    files
}

/// Writes, verifies and removes a disposable test region
#[derive(Debug, Clone)]
pub struct PatternWriteVerifier {
    config: ProbeConfig,
    seed: Option<u64>,
}

impl Default for PatternWriteVerifier {
    fn default() -> Self {
        Self::new(ProbeConfig::quick_check())
    }
}

impl PatternWriteVerifier {
    /// Create a verifier with the given profile
    pub fn new(config: ProbeConfig) -> Self {
        Self { config, seed: None }
    }

    /// Fix the pattern seed instead of deriving one per run
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Active profile
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Test `size_fraction` of the drive's free capacity.
    ///
    /// Returns `Ok` with a `Passed`, `Failed` or `Aborted` report. `Err` means
    /// health could not be determined (no space, access denied, drive gone).
    pub fn run(
        &self,
        drive: &DriveDescriptor,
        size_fraction: f64,
        abort: &dyn AbortSignal,
        progress: &dyn ProgressSink,
    ) -> Result<ProbeReport> {
        let root = drive.root();
        if !root.is_dir() {
            return Err(Error::DriveRemoved(root.display().to_string()));
        }

        let config = self.config.clone().coverage(size_fraction);
        let test_size = config.planned_size(drive.free_bytes);
        if test_size < config.min_test_size {
            return Err(Error::InsufficientSpace {
                needed: config.min_test_size,
                available: drive.free_bytes.saturating_sub(config.safety_margin),
            });
        }

        let gen = match self.seed {
            Some(seed) => PatternGenerator::new(seed),
            None => PatternGenerator::from_entropy(),
        };

        info!(
            "Probing {} of {} ({} free, {} chunks)",
            format_bytes(test_size),
            root.display(),
            format_bytes(drive.free_bytes),
            format_bytes(config.chunk_size as u64)
        );

        let scratch = ScratchArea::create(root, &config.scratch_prefix)
            .map_err(|e| Error::classify_io(e, root))?;

        let mut session = Session::new(&config, gen, root, test_size, abort, progress);
        let result = session.execute(scratch.path());

        progress.report(&ProgressEvent::new(1.0, Stage::Cleanup, "Removing test data"));
        drop(scratch);

        let (status, mismatch) = match result {
            Ok(None) => (ProbeStatus::Passed, None),
            Ok(Some(m)) => (ProbeStatus::Failed, Some(m)),
            Err(Error::Cancelled) => (ProbeStatus::Aborted, None),
            Err(e) => return Err(e),
        };

        let report = session.into_report(status, mismatch);
        match report.status {
            ProbeStatus::Passed => info!(
                "Probe passed: {} verified in {:.1}s",
                format_bytes(report.bytes_tested),
                report.elapsed.as_secs_f64()
            ),
            ProbeStatus::Failed => warn!(
                "Probe failed at offset {}",
                report.first_mismatch_offset().unwrap_or_default()
            ),
            ProbeStatus::Aborted => info!(
                "Probe aborted after {} verified",
                format_bytes(report.bytes_tested)
            ),
        }
        Ok(report)
    }
}

/// Full-capacity free-space sweep used by the deep scan
#[derive(Debug, Clone)]
pub struct FreeSpaceProber {
    inner: PatternWriteVerifier,
}

impl Default for FreeSpaceProber {
    fn default() -> Self {
        Self::new(ProbeConfig::free_space_sweep())
    }
}

impl FreeSpaceProber {
    /// Create a prober with the given profile
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            inner: PatternWriteVerifier::new(config),
        }
    }

    /// Fix the pattern seed
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.inner = self.inner.with_seed(seed);
        self
    }

    /// Sweep the profile's coverage of free space
    pub fn run(
        &self,
        drive: &DriveDescriptor,
        abort: &dyn AbortSignal,
        progress: &dyn ProgressSink,
    ) -> Result<ProbeReport> {
        let coverage = self.inner.config().coverage;
        self.inner.run(drive, coverage, abort, progress)
    }
}

/// Mutable state of a single run
struct Session<'a> {
    config: &'a ProbeConfig,
    gen: PatternGenerator,
    root: &'a Path,
    abort: &'a dyn AbortSignal,
    progress: &'a dyn ProgressSink,
    buffer: Vec<u8>,
    test_size: u64,
    chunks_total: u64,
    next_chunk: u64,
    bytes_written: u64,
    bytes_read: u64,
    bytes_tested: u64,
    chunks_verified: u64,
    files_written: u32,
    write_time: Duration,
    read_time: Duration,
    start: Instant,
}

impl<'a> Session<'a> {
    fn new(
        config: &'a ProbeConfig,
        gen: PatternGenerator,
        root: &'a Path,
        test_size: u64,
        abort: &'a dyn AbortSignal,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        let chunk = config.chunk_size as u64;
        let chunks_total = plan_files(test_size, config.max_file_size)
            .iter()
            .map(|size| size.div_ceil(chunk))
            .sum();

        Self {
            config,
            gen,
            root,
            abort,
            progress,
            buffer: vec![0u8; config.chunk_size],
            test_size,
            chunks_total,
            next_chunk: 0,
            bytes_written: 0,
            bytes_read: 0,
            bytes_tested: 0,
            chunks_verified: 0,
            files_written: 0,
            write_time: Duration::ZERO,
            read_time: Duration::ZERO,
            start: Instant::now(),
        }
    }

    fn total_work(&self) -> u64 {
        self.test_size * (1 + u64::from(self.config.verify_passes))
    }

    fn emit(&self, stage: Stage, message: String, stage_bytes: u64, stage_time: Duration) {
        let done = self.bytes_written + self.bytes_read;
        let total = self.total_work().max(1);
        let mut event = ProgressEvent::new(done as f64 / total as f64, stage, message);
        event.bytes_done = stage_bytes;
        event.speed_bps = throughput(stage_bytes, stage_time);
        event.elapsed = self.start.elapsed();
        self.progress.report(&event);
    }

    fn check_abort(&self) -> Result<()> {
        if self.abort.is_set() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Write and verify every planned file; `Some` on the first mismatch
    fn execute(&mut self, dir: &Path) -> Result<Option<Mismatch>> {
        let mut region_offset = 0u64;

        for (index, file_size) in plan_files(self.test_size, self.config.max_file_size)
            .into_iter()
            .enumerate()
        {
            let path = dir.join(format!("test_{:04}.bin", index));
            let first_chunk = self.next_chunk;

            let digests = self.write_file(&path, file_size)?;
            self.files_written += 1;

            for pass in 0..self.config.verify_passes {
                let last_pass = pass + 1 == self.config.verify_passes;
                let region = (region_offset, file_size);
                if let Some(mismatch) =
                    self.verify_file(&path, region, first_chunk, &digests, last_pass)?
                {
                    return Ok(Some(mismatch));
                }
            }

            region_offset += file_size;
        }

        Ok(None)
    }

    fn write_file(&mut self, path: &Path, size: u64) -> Result<Vec<ChunkDigest>> {
        debug!("Writing {} to {}", format_bytes(size), path.display());
        let root = self.root;
        let chunk = self.config.chunk_size as u64;
        let mut file = File::create(path).map_err(|e| Error::classify_io(e, root))?;
        let mut digests = Vec::with_capacity(size.div_ceil(chunk) as usize);
        let mut written = 0u64;

        while written < size {
            self.check_abort()?;

            let len = chunk.min(size - written) as usize;
            let started = Instant::now();
            self.gen.fill(self.next_chunk, &mut self.buffer[..len]);
            file.write_all(&self.buffer[..len])
                .and_then(|()| file.sync_data())
                .map_err(|e| Error::classify_io(e, root))?;
            self.write_time += started.elapsed();

            digests.push(Sha256::digest(&self.buffer[..len]));
            self.next_chunk += 1;
            written += len as u64;
            self.bytes_written += len as u64;

            self.emit(
                Stage::Writing,
                format!("Chunk {}/{}", self.next_chunk, self.chunks_total),
                self.bytes_written,
                self.write_time,
            );
        }

        if self.config.drop_cache {
            if let Err(e) = drop_page_cache(&file) {
                debug!("Could not drop page cache for {}: {}", path.display(), e);
            }
        }

        Ok(digests)
    }

    fn verify_file(
        &mut self,
        path: &Path,
        (region_offset, file_size): (u64, u64),
        first_chunk: u64,
        digests: &[ChunkDigest],
        last_pass: bool,
    ) -> Result<Option<Mismatch>> {
        debug!("Verifying {}", path.display());
        let root = self.root;
        let chunk = self.config.chunk_size as u64;
        let mut file = File::open(path).map_err(|e| Error::classify_io(e, root))?;

        for (i, expected) in digests.iter().enumerate() {
            self.check_abort()?;

            let within = i as u64 * chunk;
            let offset = region_offset + within;
            let expected_len = chunk.min(file_size - within) as usize;

            let started = Instant::now();
            let read = file.read_exact(&mut self.buffer[..expected_len]);
            self.read_time += started.elapsed();

            let actual = match read {
                Ok(()) => Sha256::digest(&self.buffer[..expected_len]),
                Err(e) => {
                    let mismatch = |actual: String| Mismatch {
                        offset,
                        expected: to_hex(expected),
                        actual,
                    };
                    if e.kind() == io::ErrorKind::UnexpectedEof {
                        return Ok(Some(mismatch("short read".to_string())));
                    }
                    return match Error::classify_io(e, root) {
                        Error::Io(e) => Ok(Some(mismatch(format!("read error: {}", e)))),
                        other => Err(other),
                    };
                }
            };

            if actual != *expected {
                warn!(
                    "Chunk {} at offset {} did not read back as written",
                    first_chunk + i as u64,
                    offset
                );
                return Ok(Some(Mismatch {
                    offset,
                    expected: to_hex(expected),
                    actual: to_hex(&actual),
                }));
            }

            self.bytes_read += expected_len as u64;
            if last_pass {
                self.bytes_tested += expected_len as u64;
                self.chunks_verified += 1;
            }

            self.emit(
                Stage::Verifying,
                format!("Chunk {}/{}", first_chunk + i as u64 + 1, self.chunks_total),
                self.bytes_read,
                self.read_time,
            );
        }

        Ok(None)
    }

    fn into_report(self, status: ProbeStatus, mismatch: Option<Mismatch>) -> ProbeReport {
        ProbeReport {
            status,
            bytes_tested: self.bytes_tested,
            test_size: self.test_size,
            mismatch,
            chunks_verified: self.chunks_verified,
            chunks_total: self.chunks_total,
            files_written: self.files_written,
            seed: self.gen.seed(),
            write_speed_bps: throughput(self.bytes_written, self.write_time),
            read_speed_bps: throughput(self.bytes_read, self.read_time),
            elapsed: self.start.elapsed(),
        }
    }
}
