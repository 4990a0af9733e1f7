//! Cancellation and progress reporting shared by every long-running scan

use crate::units::format_speed;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Something that can be polled to see whether the caller wants to stop.
pub trait AbortSignal: Send + Sync {
    /// Returns true once cancellation has been requested
    fn is_set(&self) -> bool;
}

/// Cloneable cancellation handle over a shared atomic flag.
///
/// All clones observe the same flag. Setting it is sticky for the lifetime of
/// the token.
#[derive(Debug, Clone, Default)]
pub struct AbortToken {
    flag: Arc<AtomicBool>,
}

impl AbortToken {
    /// Create a new, unset token
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing flag (e.g. one shared with a signal handler)
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    /// Request cancellation
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Get the underlying flag
    pub fn handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

impl AbortSignal for AbortToken {
    fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl AbortSignal for AtomicBool {
    fn is_set(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

/// A signal that never fires
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverAbort;

impl AbortSignal for NeverAbort {
    fn is_set(&self) -> bool {
        false
    }
}

/// Phase of a scan a progress event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Writing pattern data
    Writing,
    /// Reading pattern data back
    Verifying,
    /// Hashing files into a new manifest
    BuildingManifest,
    /// Re-hashing files against a stored manifest
    VerifyingManifest,
    /// Removing scratch data
    Cleanup,
}

impl Stage {
    /// Short label for display
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Writing => "Writing",
            Stage::Verifying => "Verifying",
            Stage::BuildingManifest => "Indexing",
            Stage::VerifyingManifest => "Checking files",
            Stage::Cleanup => "Cleaning up",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single progress update
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Fraction of the current operation done (0.0 - 1.0)
    pub fraction: f64,

    /// Current phase
    pub stage: Stage,

    /// Free-form detail (current file, chunk, ...)
    pub message: String,

    /// Bytes processed so far in this stage
    pub bytes_done: u64,

    /// Throughput in bytes per second since the stage started
    pub speed_bps: u64,

    /// Time since the operation started
    pub elapsed: Duration,
}

impl ProgressEvent {
    /// Create an event with no byte counters
    pub fn new(fraction: f64, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            stage,
            message: message.into(),
            bytes_done: 0,
            speed_bps: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Completion percentage (0.0 to 100.0)
    pub fn percentage(&self) -> f64 {
        self.fraction * 100.0
    }

    /// Format speed for display (e.g., "45.2 MB/s")
    pub fn speed_display(&self) -> String {
        format_speed(self.speed_bps)
    }
}

/// Receiver of progress events.
///
/// Implemented for any `Fn(&ProgressEvent)` so callers can pass closures.
pub trait ProgressSink {
    /// Deliver an event; called synchronously on the scanning thread
    fn report(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent),
{
    fn report(&self, event: &ProgressEvent) {
        self(event);
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: &ProgressEvent) {}
}

/// Bytes per second given a byte count and elapsed time
pub(crate) fn throughput(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_abort_token_shared_between_clones() {
        let token = AbortToken::new();
        let clone = token.clone();
        assert!(!clone.is_set());

        token.abort();
        assert!(clone.is_set());
        assert!(token.handle().load(Ordering::SeqCst));
    }

    #[test]
    fn test_abort_token_from_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let token = AbortToken::from_flag(Arc::clone(&flag));
        flag.store(true, Ordering::SeqCst);
        assert!(token.is_set());
    }

    #[test]
    fn test_never_abort() {
        assert!(!NeverAbort.is_set());
    }

    #[test]
    fn test_closure_is_progress_sink() {
        let seen = RefCell::new(Vec::new());
        let sink = |e: &ProgressEvent| seen.borrow_mut().push(e.stage);

        sink.report(&ProgressEvent::new(0.5, Stage::Writing, "chunk 1"));
        sink.report(&ProgressEvent::new(1.0, Stage::Verifying, "chunk 1"));

        assert_eq!(*seen.borrow(), vec![Stage::Writing, Stage::Verifying]);
    }

    #[test]
    fn test_event_fraction_clamped() {
        assert_eq!(ProgressEvent::new(1.5, Stage::Writing, "").fraction, 1.0);
        assert_eq!(ProgressEvent::new(-0.1, Stage::Writing, "").fraction, 0.0);
        assert!((ProgressEvent::new(0.25, Stage::Cleanup, "").percentage() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_speed_display() {
        let mut event = ProgressEvent::new(0.1, Stage::Writing, "");
        event.speed_bps = 10 * 1024 * 1024;
        assert_eq!(event.speed_display(), "10.0 MB/s");
    }

    #[test]
    fn test_throughput() {
        assert_eq!(throughput(1000, Duration::ZERO), 0);
        assert_eq!(throughput(1000, Duration::from_secs(2)), 500);
    }
}
