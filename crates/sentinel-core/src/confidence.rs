//! Confidence scoring and drive warnings
//!
//! A passing scan only says that the tested region behaved on this run. The
//! score here is a bounded, heuristic signal of how much of the card the scan
//! actually exercised; it is never phrased as a guarantee.

use crate::config::{DEFAULT_SIZE_FRACTION, SAFETY_MARGIN};
use crate::drive::DriveDescriptor;
use crate::units::format_bytes;
use serde::Serialize;

/// Cards smaller than this get a warning (4 GiB)
pub const VERY_SMALL_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Usage at or above this share gets a warning
pub const NEARLY_FULL_FRACTION: f64 = 0.95;

/// Baseline score of a quick check at the default fraction
const QUICK_BASE_PERCENT: f64 = 40.0;

const QUICK_MIN_PERCENT: f64 = 5.0;
const QUICK_MAX_PERCENT: f64 = 75.0;

/// Score of a full sweep that covered all usable free space
const SWEEP_MAX_PERCENT: f64 = 85.0;

/// Attached to every result
pub const BACKUP_CAVEAT: &str =
    "Keep backups of anything important: a passing scan does not guarantee future reliability.";

/// Which operation is being scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    /// Bounded write/verify of a fraction of free space
    QuickCheck,
    /// Manifest verification plus full free-space probe
    FullSweep,
}

/// What a scan covered
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coverage {
    /// Planned share of free space (quick check) or 1.0 (sweep)
    pub fraction: f64,

    /// Share of the planned region actually verified (0.0 - 1.0)
    pub completed: f64,

    /// The manifest was created during this sweep
    pub manifest_built_fresh: bool,
}

impl Coverage {
    /// Coverage of a quick check that tested `completed` of `fraction`
    pub fn quick(fraction: f64, completed: f64) -> Self {
        Self {
            fraction,
            completed,
            manifest_built_fresh: false,
        }
    }

    /// Coverage of a full sweep
    pub fn sweep(completed: f64, manifest_built_fresh: bool) -> Self {
        Self {
            fraction: 1.0,
            completed,
            manifest_built_fresh,
        }
    }
}

/// A confidence score with its caveats
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confidence {
    /// 0 - 100
    pub percent: u8,
    /// Human-readable limitations of the result
    pub caveats: Vec<String>,
}

/// Score a scan.
pub fn score(scan: ScanType, coverage: Coverage) -> Confidence {
    let completed = if coverage.completed.is_finite() {
        coverage.completed.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mut caveats = Vec::new();

    let percent = match scan {
        ScanType::QuickCheck => {
            let fraction = coverage.fraction.max(0.0);
            let base = (QUICK_BASE_PERCENT * (fraction / DEFAULT_SIZE_FRACTION).sqrt())
                .clamp(QUICK_MIN_PERCENT, QUICK_MAX_PERCENT);
            caveats.push(format!(
                "Only {:.0}% of free space was tested and existing files were not checked; run a full sweep for a deeper scan.",
                fraction * 100.0
            ));
            base * completed
        }
        ScanType::FullSweep => {
            if coverage.manifest_built_fresh {
                caveats.push(
                    "File manifest was built on this sweep: corruption of existing files can only be detected on a later sweep."
                        .to_string(),
                );
            }
            SWEEP_MAX_PERCENT * completed
        }
    };

    if completed < 1.0 {
        caveats.push(format!(
            "Scan did not complete: {:.0}% of the planned region was verified.",
            completed * 100.0
        ));
    }
    caveats.push(BACKUP_CAVEAT.to_string());

    Confidence {
        percent: percent.round().clamp(0.0, 100.0) as u8,
        caveats,
    }
}

/// Warnings about the drive itself, independent of any scan
pub fn warnings(drive: &DriveDescriptor) -> Vec<String> {
    let mut warnings = Vec::new();

    if drive.total_bytes > 0 {
        if drive.total_bytes < VERY_SMALL_BYTES {
            warnings.push("Card very small (< 4 GB)".to_string());
        }
        let used = drive.used_fraction();
        if used >= NEARLY_FULL_FRACTION {
            warnings.push(format!("Card nearly full ({}% used)", (used * 100.0) as u32));
        }
    }

    if drive.free_bytes < SAFETY_MARGIN {
        warnings.push(format!(
            "Less than {} free: free-space tests cannot run",
            format_bytes(SAFETY_MARGIN)
        ));
    }

    if !drive.is_removable() {
        warnings.push(
            "Drive is not removable media: these checks are tuned for SD cards".to_string(),
        );
    }

    warnings
}
