//! Error types for the Sentinel core library

use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;

/// Main error type for Sentinel operations
#[derive(Error, Debug)]
pub enum Error {
    /// Data read back from the card differs from what was written or recorded
    #[error("Integrity mismatch at offset {offset}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        /// Byte offset of the first mismatching chunk
        offset: u64,
        /// Expected digest
        expected: String,
        /// Digest actually read back
        actual: String,
    },

    /// Drive or file could not be accessed (permissions, read-only media)
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Stored manifest is unreadable, corrupt, or belongs to another card
    #[error("Manifest invalid: {0}")]
    ManifestInvalid(String),

    /// The drive disappeared while a scan was running
    #[error("Drive removed during scan: {0}")]
    DriveRemoved(String),

    /// Not enough free space to run the requested probe
    #[error("Not enough free space: need {needed} bytes, {available} bytes usable")]
    InsufficientSpace {
        /// Bytes the probe needs at minimum
        needed: u64,
        /// Bytes usable after the safety margin
        available: u64,
    },

    /// Invalid configuration or argument
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Another scan already targets the same drive
    #[error("A scan is already in progress for drive {0}")]
    ScanInProgress(String),

    /// Schedule store could not be read or written
    #[error("Schedule store error: {0}")]
    Schedule(String),

    /// IO error during read/write operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Convert a low-level I/O fault into the scan error taxonomy.
    ///
    /// A vanished drive root means the card was pulled; permission and
    /// read-only failures mean health could not be determined.
    pub fn classify_io(err: std::io::Error, root: &Path) -> Self {
        if !root.exists() {
            return Error::DriveRemoved(format!("{} ({})", root.display(), err));
        }
        match err.kind() {
            ErrorKind::PermissionDenied | ErrorKind::ReadOnlyFilesystem => {
                Error::AccessDenied(format!("{}: {}", root.display(), err))
            }
            _ => Error::Io(err),
        }
    }

    /// Whether this error means the card itself returned bad data
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Error::IntegrityMismatch { .. })
    }
}

/// Result type alias using the Sentinel error type
pub type Result<T> = std::result::Result<T, Error>;
