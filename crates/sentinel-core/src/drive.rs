//! Drive descriptor handed to the scan engine
//!
//! A [`DriveDescriptor`] is built fresh for every invocation by whatever
//! enumerates drives (see the `sentinel-detect` crate) and is never persisted.
//! The fingerprint is what ties a stored manifest and schedule entry to the
//! physical card currently inserted.

use crate::units::format_bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Physical media class of a drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaClass {
    /// Removable media (SD cards, USB sticks)
    #[default]
    Removable,
    /// Fixed internal media
    Fixed,
}

impl fmt::Display for MediaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaClass::Removable => write!(f, "removable"),
            MediaClass::Fixed => write!(f, "fixed"),
        }
    }
}

/// A mounted drive as seen by the scan engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveDescriptor {
    /// Mount point / root of the filesystem (e.g. `/media/user/SDCARD`, `G:\`)
    pub root: PathBuf,

    /// Total capacity in bytes
    pub total_bytes: u64,

    /// Free capacity in bytes, as reported when the descriptor was built
    pub free_bytes: u64,

    /// Removable or fixed media
    pub media: MediaClass,

    /// Stable identity of the card (volume UUID or serial)
    pub fingerprint: String,

    /// Human-readable name/label if known
    pub name: Option<String>,

    /// Filesystem type if known
    pub filesystem: Option<String>,
}

impl DriveDescriptor {
    /// Create a descriptor for the given root with the given fingerprint
    pub fn new(root: impl Into<PathBuf>, fingerprint: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            total_bytes: 0,
            free_bytes: 0,
            media: MediaClass::Removable,
            fingerprint: fingerprint.into(),
            name: None,
            filesystem: None,
        }
    }

    /// Builder: set total and free capacity
    #[must_use]
    pub fn with_capacity(mut self, total_bytes: u64, free_bytes: u64) -> Self {
        self.total_bytes = total_bytes;
        self.free_bytes = free_bytes.min(total_bytes);
        self
    }

    /// Builder: set media class
    #[must_use]
    pub fn with_media(mut self, media: MediaClass) -> Self {
        self.media = media;
        self
    }

    /// Builder: set display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder: set filesystem type
    #[must_use]
    pub fn with_filesystem(mut self, filesystem: impl Into<String>) -> Self {
        self.filesystem = Some(filesystem.into());
        self
    }

    /// Root path of the drive
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bytes in use
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }

    /// Fraction of capacity in use (0.0 - 1.0)
    pub fn used_fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes() as f64 / self.total_bytes as f64
    }

    /// Whether this is removable media
    pub fn is_removable(&self) -> bool {
        self.media == MediaClass::Removable
    }

    /// Get a display string for the drive
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => format!("{} ({})", name, self.root.display()),
            _ => self.root.display().to_string(),
        }
    }

    /// Format capacity for display
    pub fn size_display(&self) -> String {
        format!(
            "{} total, {} free",
            format_bytes(self.total_bytes),
            format_bytes(self.free_bytes)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder() {
        let drive = DriveDescriptor::new("/media/sd", "1234-ABCD")
            .with_capacity(64 * 1024 * 1024 * 1024, 10 * 1024 * 1024 * 1024)
            .with_media(MediaClass::Removable)
            .with_name("SDCARD")
            .with_filesystem("vfat");

        assert_eq!(drive.root(), Path::new("/media/sd"));
        assert_eq!(drive.fingerprint, "1234-ABCD");
        assert_eq!(drive.used_bytes(), 54 * 1024 * 1024 * 1024);
        assert!(drive.is_removable());
        assert_eq!(drive.filesystem.as_deref(), Some("vfat"));
        assert_eq!(drive.display_name(), "SDCARD (/media/sd)");
    }

    #[test]
    fn test_free_capped_at_total() {
        let drive = DriveDescriptor::new("/media/sd", "x").with_capacity(100, 500);
        assert_eq!(drive.free_bytes, 100);
        assert_eq!(drive.used_bytes(), 0);
    }

    #[test]
    fn test_used_fraction() {
        let drive = DriveDescriptor::new("/media/sd", "x").with_capacity(100, 5);
        assert!((drive.used_fraction() - 0.95).abs() < 1e-9);

        let empty = DriveDescriptor::new("/media/sd", "x");
        assert_eq!(empty.used_fraction(), 0.0);
    }

    #[test]
    fn test_media_class_display_and_serde() {
        assert_eq!(MediaClass::Removable.to_string(), "removable");
        assert_eq!(MediaClass::Fixed.to_string(), "fixed");
        let json = serde_json::to_string(&MediaClass::Fixed).unwrap();
        assert_eq!(json, "\"fixed\"");
    }

    #[test]
    fn test_display_name_without_label() {
        let drive = DriveDescriptor::new("/media/sd", "x");
        assert_eq!(drive.display_name(), "/media/sd");
    }
}
