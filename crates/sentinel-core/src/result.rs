//! Structured results of the two public scan operations

use crate::recommend::Recommendation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final state of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// No problem was found in what was tested
    Passed,
    /// The card returned data that differs from what was written or recorded
    Failed,
    /// Cancelled by the caller
    Aborted,
    /// Health could not be determined
    Error,
}

impl Outcome {
    /// Whether the scan ran to completion (passed or failed)
    pub fn is_complete(&self) -> bool {
        matches!(self, Outcome::Passed | Outcome::Failed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Passed => "passed",
            Outcome::Failed => "failed",
            Outcome::Aborted => "aborted",
            Outcome::Error => "error",
        };
        f.write_str(s)
    }
}

/// Result of a quick check
#[derive(Debug, Clone, Serialize)]
pub struct QuickCheckResult {
    /// Final state
    pub outcome: Outcome,
    /// One-line summary
    pub message: String,
    /// Longer explanation
    pub details: String,
    /// Drive fingerprint
    pub fingerprint: String,
    /// Confidence percentage (0 - 100)
    pub confidence: u8,
    /// Limitations of this result
    pub caveats: Vec<String>,
    /// Warnings about the drive
    pub warnings: Vec<String>,
    /// Share of free space that was planned for testing
    pub size_fraction: f64,
    /// Planned bytes
    pub test_size: u64,
    /// Bytes written and read back intact
    pub bytes_tested: u64,
    /// Offset of the first mismatching chunk
    pub first_mismatch_offset: Option<u64>,
    /// Chunks verified
    pub chunks_verified: u64,
    /// Chunks planned
    pub chunks_total: u64,
    /// Average write throughput
    pub write_speed_bps: u64,
    /// Average read-back throughput
    pub read_speed_bps: u64,
    /// When the check started
    pub started_at: DateTime<Utc>,
    /// Wall time in seconds
    pub elapsed_secs: f64,
}

impl QuickCheckResult {
    /// An empty result for a check that never got to run
    pub(crate) fn not_run(
        fingerprint: &str,
        outcome: Outcome,
        message: impl Into<String>,
        details: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            outcome,
            message: message.into(),
            details: details.into(),
            fingerprint: fingerprint.to_string(),
            confidence: 0,
            caveats: Vec::new(),
            warnings: Vec::new(),
            size_fraction: 0.0,
            test_size: 0,
            bytes_tested: 0,
            first_mismatch_offset: None,
            chunks_verified: 0,
            chunks_total: 0,
            write_speed_bps: 0,
            read_speed_bps: 0,
            started_at,
            elapsed_secs: 0.0,
        }
    }

    /// Whether the check passed
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }
}

/// Result of a full sweep
#[derive(Debug, Clone, Serialize)]
pub struct FullSweepResult {
    /// Final state
    pub outcome: Outcome,
    /// One-line summary
    pub message: String,
    /// Longer explanation
    pub details: String,
    /// Drive fingerprint
    pub fingerprint: String,
    /// Confidence percentage (0 - 100)
    pub confidence: u8,
    /// Limitations of this result
    pub caveats: Vec<String>,
    /// Warnings about the drive
    pub warnings: Vec<String>,
    /// Every recorded file matched (or the manifest was just built)
    pub manifest_passed: bool,
    /// The free-space probe passed
    pub free_space_passed: bool,
    /// The manifest was created during this sweep
    pub manifest_built_fresh: bool,
    /// Why an existing manifest was discarded
    pub manifest_rebuild_reason: Option<String>,
    /// Files hashed
    pub files_checked: u64,
    /// Files whose content no longer matches the manifest
    pub mismatched_paths: Vec<String>,
    /// Files new since the last sweep
    pub added: Vec<String>,
    /// Files gone since the last sweep
    pub removed: Vec<String>,
    /// Files skipped for lack of permission
    pub unreadable: Vec<String>,
    /// Planned bytes for the free-space probe
    pub free_space_test_size: u64,
    /// Free-space bytes written and read back intact
    pub free_space_bytes_tested: u64,
    /// Offset of the first mismatching chunk in free space
    pub first_mismatch_offset: Option<u64>,
    /// Recommended interval until the next sweep
    pub recommendation: Option<Recommendation>,
    /// When the sweep started
    pub started_at: DateTime<Utc>,
    /// Wall time in seconds
    pub elapsed_secs: f64,
}

impl FullSweepResult {
    /// An empty result for a sweep that never got to run
    pub(crate) fn not_run(
        fingerprint: &str,
        outcome: Outcome,
        message: impl Into<String>,
        details: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            outcome,
            message: message.into(),
            details: details.into(),
            fingerprint: fingerprint.to_string(),
            confidence: 0,
            caveats: Vec::new(),
            warnings: Vec::new(),
            manifest_passed: false,
            free_space_passed: false,
            manifest_built_fresh: false,
            manifest_rebuild_reason: None,
            files_checked: 0,
            mismatched_paths: Vec::new(),
            added: Vec::new(),
            removed: Vec::new(),
            unreadable: Vec::new(),
            free_space_test_size: 0,
            free_space_bytes_tested: 0,
            first_mismatch_offset: None,
            recommendation: None,
            started_at,
            elapsed_secs: 0.0,
        }
    }

    /// Whether both halves passed
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }
}
