//! Re-check interval recommendations

use crate::drive::{DriveDescriptor, MediaClass};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

const GB: u64 = 1024 * 1024 * 1024;

/// Capacity tier upper bounds and their intervals in days
const TIERS: [(u64, u32, &str); 4] = [
    (32 * GB, 7, "Low-end / small card"),
    (128 * GB, 14, "Balanced capacity"),
    (256 * GB, 21, "High-capacity card"),
    (u64::MAX, 30, "High-capacity card"),
];

/// Interval used after a failed sweep
pub const FAILED_SWEEP_INTERVAL_DAYS: u32 = 7;

/// What is known about previous sweeps of a drive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepHistory {
    /// The most recent full sweep did not pass
    pub last_sweep_failed: bool,
}

/// Recommended re-check interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    /// Days between full sweeps
    pub interval_days: u32,
    /// Human-readable reason
    pub hint: String,
}

/// Recommend a full-sweep interval for a drive
pub fn recommend(drive: &DriveDescriptor, history: &SweepHistory) -> Recommendation {
    if history.last_sweep_failed {
        return Recommendation {
            interval_days: FAILED_SWEEP_INTERVAL_DAYS,
            hint: format!(
                "Previous sweep failed (recommend checking every {} days and replacing the card)",
                FAILED_SWEEP_INTERVAL_DAYS
            ),
        };
    }

    let mut tier = TIERS
        .iter()
        .position(|(limit, _, _)| drive.total_bytes < *limit)
        .unwrap_or(TIERS.len() - 1);
    if drive.media == MediaClass::Fixed {
        tier = (tier + 1).min(TIERS.len() - 1);
    }

    let (_, days, label) = TIERS[tier];
    Recommendation {
        interval_days: days,
        hint: format!("{} (recommend checking every {} days)", label, days),
    }
}

/// True when no sweep has happened or at least `interval_days` have passed
pub fn is_sweep_due(last_sweep: Option<DateTime<Utc>>, interval_days: u32, now: DateTime<Utc>) -> bool {
    match last_sweep {
        None => true,
        Some(last) => now.signed_duration_since(last) >= Duration::days(i64::from(interval_days)),
    }
}

/// When the next sweep becomes due
pub fn next_sweep_due(last_sweep: Option<DateTime<Utc>>, interval_days: u32) -> Option<DateTime<Utc>> {
    last_sweep.map(|last| last + Duration::days(i64::from(interval_days)))
}
