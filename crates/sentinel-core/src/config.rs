//! Runtime configuration for Sentinel scans

/// Space left untouched on the card by every probe (100 MiB)
pub const SAFETY_MARGIN: u64 = 100 * 1024 * 1024;

/// Largest single test file (2 GiB, below the FAT32 file size limit)
pub const MAX_TEST_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Smallest region worth testing (1 KiB)
pub const MIN_TEST_SIZE: u64 = 1024;

/// Default share of free space written by a quick check
pub const DEFAULT_SIZE_FRACTION: f64 = 0.05;

/// Chunk size for quick checks (1 MiB)
pub const QUICK_CHUNK_SIZE: usize = 1024 * 1024;

/// Chunk size for the free-space sweep (4 MiB)
pub const SWEEP_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Minimum chunk size (4 KiB)
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;

/// Maximum chunk size (64 MiB)
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Read buffer used when hashing existing files (1 MiB)
pub const DEFAULT_HASH_BUFFER_SIZE: usize = 1024 * 1024;

/// Default days between full sweeps when nothing else is known
pub const DEFAULT_SWEEP_INTERVAL_DAYS: u32 = 14;

/// Scratch directory prefix for quick checks
pub const QUICK_SCRATCH_PREFIX: &str = "SentinelCheck";

/// Scratch directory prefix for free-space sweeps
pub const SWEEP_SCRATCH_PREFIX: &str = "SentinelSweep";

/// Parameters of one write/verify probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    /// Bytes per chunk
    pub chunk_size: usize,

    /// Share of free capacity to test, in (0, 1]
    pub coverage: f64,

    /// Bytes of free space never touched
    pub safety_margin: u64,

    /// Cap per test file
    pub max_file_size: u64,

    /// Below this the probe refuses to run
    pub min_test_size: u64,

    /// Number of read-back passes after writing
    pub verify_passes: u32,

    /// Prefix of the scratch directory name
    pub scratch_prefix: String,

    /// Ask the OS to evict written data from its cache before reading back
    pub drop_cache: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self::quick_check()
    }
}

impl ProbeConfig {
    /// Profile used by the quick check
    pub fn quick_check() -> Self {
        Self {
            chunk_size: QUICK_CHUNK_SIZE,
            coverage: DEFAULT_SIZE_FRACTION,
            safety_margin: SAFETY_MARGIN,
            max_file_size: MAX_TEST_FILE_SIZE,
            min_test_size: MIN_TEST_SIZE,
            verify_passes: 1,
            scratch_prefix: QUICK_SCRATCH_PREFIX.to_string(),
            drop_cache: true,
        }
    }

    /// Profile used by the deep scan's free-space sweep
    pub fn free_space_sweep() -> Self {
        Self {
            chunk_size: SWEEP_CHUNK_SIZE,
            coverage: 1.0,
            scratch_prefix: SWEEP_SCRATCH_PREFIX.to_string(),
            ..Self::quick_check()
        }
    }

    /// Set chunk size (clamped to valid range)
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self
    }

    /// Set coverage fraction (clamped to (0, 1])
    #[must_use]
    pub fn coverage(mut self, fraction: f64) -> Self {
        self.coverage = if fraction.is_finite() {
            fraction.clamp(f64::MIN_POSITIVE, 1.0)
        } else {
            DEFAULT_SIZE_FRACTION
        };
        self
    }

    /// Set safety margin
    #[must_use]
    pub fn safety_margin(mut self, bytes: u64) -> Self {
        self.safety_margin = bytes;
        self
    }

    /// Set per-file cap (at least one chunk)
    #[must_use]
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes.max(MIN_TEST_SIZE);
        self
    }

    /// Set minimum test size
    #[must_use]
    pub fn min_test_size(mut self, bytes: u64) -> Self {
        self.min_test_size = bytes.max(1);
        self
    }

    /// Set number of read-back passes (at least one)
    #[must_use]
    pub fn verify_passes(mut self, passes: u32) -> Self {
        self.verify_passes = passes.max(1);
        self
    }

    /// Set scratch directory prefix
    #[must_use]
    pub fn scratch_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.scratch_prefix = prefix.into();
        self
    }

    /// Enable or disable page-cache eviction
    #[must_use]
    pub fn drop_cache(mut self, drop: bool) -> Self {
        self.drop_cache = drop;
        self
    }

    /// Bytes this profile would test given `free` bytes available.
    ///
    /// `coverage × free`, capped at `free - safety_margin`.
    pub fn planned_size(&self, free: u64) -> u64 {
        let usable = free.saturating_sub(self.safety_margin);
        let wanted = (free as f64 * self.coverage) as u64;
        wanted.min(usable)
    }
}

/// Configuration for the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Quick check profile
    pub quick: ProbeConfig,

    /// Free-space sweep profile
    pub sweep: ProbeConfig,

    /// Read buffer when hashing files for the manifest
    pub hash_buffer_size: usize,

    /// Fallback sweep interval
    pub default_interval_days: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            quick: ProbeConfig::quick_check(),
            sweep: ProbeConfig::free_space_sweep(),
            hash_buffer_size: DEFAULT_HASH_BUFFER_SIZE,
            default_interval_days: DEFAULT_SWEEP_INTERVAL_DAYS,
        }
    }
}

impl ScanConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the quick check profile
    #[must_use]
    pub fn quick(mut self, probe: ProbeConfig) -> Self {
        self.quick = probe;
        self
    }

    /// Replace the sweep profile
    #[must_use]
    pub fn sweep(mut self, probe: ProbeConfig) -> Self {
        self.sweep = probe;
        self
    }

    /// Set manifest hashing buffer size (clamped like chunk sizes)
    #[must_use]
    pub fn hash_buffer_size(mut self, size: usize) -> Self {
        self.hash_buffer_size = size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self
    }

    /// Set fallback sweep interval (at least one day)
    #[must_use]
    pub fn default_interval_days(mut self, days: u32) -> Self {
        self.default_interval_days = days.max(1);
        self
    }

    /// Apply the same safety margin to both profiles
    #[must_use]
    pub fn safety_margin(mut self, bytes: u64) -> Self {
        self.quick.safety_margin = bytes;
        self.sweep.safety_margin = bytes;
        self
    }
}
