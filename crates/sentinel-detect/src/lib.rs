//! # Sentinel Detect
//!
//! Enumerates mounted volumes and turns them into [`DriveDescriptor`]s for the
//! scan engine.
//!
//! ## Identity
//!
//! A card's fingerprint is its filesystem UUID where the platform exposes one
//! (`uuid-<UUID>`). Otherwise it is a hash of the volume label, mount point,
//! filesystem and total size (`vol-<hex>`), which survives remounts of the
//! same card but not reformatting.
//!
//! ## Media class
//!
//! A volume is `Removable` when the OS flags it as removable (or it sits on an
//! MMC device) and it is not mounted at a system location such as `/` or
//! `C:\`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod mounts;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod linux;
    }
}

#[cfg(unix)]
mod space;

use mounts::{is_pseudo_filesystem, is_system_mount_point};
use sentinel_core::pattern::to_hex;
use sentinel_core::{DriveDescriptor, MediaClass};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Drive detection errors
#[derive(Error, Debug)]
pub enum DetectError {
    /// Failed to enumerate drives
    #[error("Failed to enumerate drives: {0}")]
    EnumerationFailed(String),

    /// The requested path is not a mounted directory
    #[error("Drive not found: {0}")]
    NotFound(String),

    /// No removable drive is mounted
    #[error("No removable drive found; pass the card's mount point explicitly")]
    NoRemovableDrive,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for drive detection operations
pub type Result<T> = std::result::Result<T, DetectError>;

/// A mounted volume as reported by the OS
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Device path or OS volume name (e.g. `/dev/mmcblk0p1`)
    pub device: String,

    /// Where the volume is mounted
    pub mount_point: PathBuf,

    /// Volume label if available
    pub label: Option<String>,

    /// Filesystem type if known
    pub filesystem: Option<String>,

    /// Total capacity in bytes
    pub total_bytes: u64,

    /// Bytes available to the current user
    pub available_bytes: u64,

    /// OS removable flag
    pub removable: bool,

    /// Filesystem UUID if available
    pub uuid: Option<String>,
}

impl Volume {
    /// Create a volume for the given device and mount point
    pub fn new(device: impl Into<String>, mount_point: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            mount_point: mount_point.into(),
            ..Default::default()
        }
    }

    /// Builder: set the label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Builder: set the filesystem type
    #[must_use]
    pub fn with_filesystem(mut self, filesystem: impl Into<String>) -> Self {
        self.filesystem = Some(filesystem.into());
        self
    }

    /// Builder: set total and available capacity
    #[must_use]
    pub fn with_capacity(mut self, total_bytes: u64, available_bytes: u64) -> Self {
        self.total_bytes = total_bytes;
        self.available_bytes = available_bytes;
        self
    }

    /// Builder: set removable flag
    #[must_use]
    pub fn with_removable(mut self, removable: bool) -> Self {
        self.removable = removable;
        self
    }

    /// Builder: set the filesystem UUID
    #[must_use]
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Whether this volume cannot hold user data (pseudo filesystem or empty)
    #[must_use]
    pub fn is_pseudo(&self) -> bool {
        self.total_bytes == 0
            || self
                .filesystem
                .as_deref()
                .is_some_and(is_pseudo_filesystem)
    }

    /// Identity fingerprint of the card
    #[must_use]
    pub fn fingerprint(&self) -> String {
        match self.uuid.as_deref().map(str::trim) {
            Some(uuid) if !uuid.is_empty() => format!("uuid-{uuid}"),
            _ => derived_fingerprint(&[
                self.label.as_deref().unwrap_or(""),
                &self.mount_point.to_string_lossy(),
                self.filesystem.as_deref().unwrap_or(""),
                &self.total_bytes.to_string(),
            ]),
        }
    }

    /// Media class used by the scan engine
    #[must_use]
    pub fn media(&self) -> MediaClass {
        if self.removable && !is_system_mount_point(&self.mount_point.to_string_lossy()) {
            MediaClass::Removable
        } else {
            MediaClass::Fixed
        }
    }

    /// Descriptor for the whole volume
    #[must_use]
    pub fn descriptor(&self) -> DriveDescriptor {
        self.describe(&self.mount_point, self.fingerprint(), self.label.clone())
    }

    fn describe(&self, root: &Path, fingerprint: String, name: Option<String>) -> DriveDescriptor {
        let mut drive = DriveDescriptor::new(root, fingerprint)
            .with_capacity(self.total_bytes, self.available_bytes)
            .with_media(self.media());
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            drive = drive.with_name(name);
        }
        if let Some(fs) = &self.filesystem {
            drive = drive.with_filesystem(fs.clone());
        }
        drive
    }
}

/// Stable fingerprint derived from identifying strings
#[must_use]
pub fn derived_fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    format!("vol-{}", to_hex(&digest[..12]))
}

/// Source of mounted volumes
#[cfg_attr(test, mockall::automock)]
pub trait VolumeSource {
    /// Currently mounted volumes
    ///
    /// # Errors
    ///
    /// Returns an error if the platform cannot be queried.
    fn volumes(&self) -> Result<Vec<Volume>>;
}

/// Volumes of the running system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemVolumes;

impl VolumeSource for SystemVolumes {
    fn volumes(&self) -> Result<Vec<Volume>> {
        let disks = sysinfo::Disks::new_with_refreshed_list();
        let mut volumes: Vec<Volume> = disks
            .iter()
            .map(|disk| Volume {
                device: disk.name().to_string_lossy().into_owned(),
                mount_point: disk.mount_point().to_path_buf(),
                label: None,
                filesystem: Some(disk.file_system().to_string_lossy().into_owned())
                    .filter(|fs| !fs.is_empty()),
                total_bytes: disk.total_space(),
                available_bytes: disk.available_space(),
                removable: disk.is_removable(),
                uuid: None,
            })
            .collect();

        enrich(&mut volumes);
        debug!("Found {} mounted volumes", volumes.len());
        Ok(volumes)
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        /// Fill in UUIDs, labels, missing filesystem types and the MMC
        /// removable flag
        fn enrich(volumes: &mut [Volume]) {
            let uuids = linux::uuid_map();
            let labels = linux::label_map();
            let table = linux::read_mounts().unwrap_or_else(|e| {
                debug!("{}", e);
                Vec::new()
            });
            for volume in volumes {
                if volume.filesystem.is_none() {
                    volume.filesystem = table
                        .iter()
                        .find(|m| Path::new(&m.mount_point) == volume.mount_point)
                        .map(|m| m.filesystem.clone());
                }
                let base = mounts::device_basename(&volume.device).to_string();
                volume.uuid = uuids.get(&base).cloned();
                volume.label = labels.get(&base).cloned();
                if !volume.removable {
                    volume.removable = linux::is_removable_device(&volume.device).unwrap_or(false);
                }
            }
        }
    } else {
        /// The OS volume name doubles as the label
        fn enrich(volumes: &mut [Volume]) {
            for volume in volumes {
                if !volume.device.is_empty() {
                    volume.label = Some(volume.device.clone());
                }
            }
        }
    }
}

/// All mounted drives, removable ones first
///
/// # Errors
///
/// Returns an error if the source cannot be queried.
pub fn drives_from(source: &dyn VolumeSource) -> Result<Vec<DriveDescriptor>> {
    let mut volumes: Vec<Volume> = source
        .volumes()?
        .into_iter()
        .filter(|v| !v.is_pseudo())
        .collect();

    volumes.sort_by(|a, b| a.mount_point.cmp(&b.mount_point));
    volumes.dedup_by(|a, b| a.mount_point == b.mount_point);
    volumes.sort_by_key(|v| v.media() != MediaClass::Removable);

    Ok(volumes.iter().map(Volume::descriptor).collect())
}

/// All mounted drives on this system, removable ones first
///
/// # Errors
///
/// Returns an error if drive enumeration fails.
pub fn list_drives() -> Result<Vec<DriveDescriptor>> {
    drives_from(&SystemVolumes)
}

/// Only the removable drives on this system
///
/// # Errors
///
/// Returns an error if drive enumeration fails.
pub fn list_removable_drives() -> Result<Vec<DriveDescriptor>> {
    Ok(list_drives()?
        .into_iter()
        .filter(DriveDescriptor::is_removable)
        .collect())
}

/// First removable drive from a source
///
/// # Errors
///
/// Returns [`DetectError::NoRemovableDrive`] if there is none.
pub fn default_drive_from(source: &dyn VolumeSource) -> Result<DriveDescriptor> {
    drives_from(source)?
        .into_iter()
        .find(DriveDescriptor::is_removable)
        .ok_or(DetectError::NoRemovableDrive)
}

/// Drive used when the user names none: the first removable drive
///
/// # Errors
///
/// Returns [`DetectError::NoRemovableDrive`] if no removable drive is mounted.
pub fn default_drive() -> Result<DriveDescriptor> {
    default_drive_from(&SystemVolumes)
}

/// Descriptor for a user-supplied path.
///
/// A volume's mount point gets that volume's identity. A directory inside a
/// volume is treated as its own drive root with the volume's capacity and a
/// fingerprint derived from the volume and the relative path.
///
/// # Errors
///
/// Returns [`DetectError::NotFound`] if the path is not an existing directory.
pub fn describe_path_from(source: &dyn VolumeSource, path: &Path) -> Result<DriveDescriptor> {
    let root = path
        .canonicalize()
        .map_err(|_| DetectError::NotFound(path.display().to_string()))?;
    if !root.is_dir() {
        return Err(DetectError::NotFound(format!(
            "{} is not a directory",
            path.display()
        )));
    }

    let volumes = source.volumes().unwrap_or_else(|e| {
        debug!("Volume enumeration failed, using path only: {}", e);
        Vec::new()
    });

    let best = volumes
        .iter()
        .filter(|v| !v.is_pseudo())
        .map(|v| (canonical_mount(v), v))
        .filter(|(mount, _)| root.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count());

    match best {
        Some((mount, volume)) if mount == root => Ok(volume.describe(
            &root,
            volume.fingerprint(),
            volume.label.clone(),
        )),
        Some((mount, volume)) => {
            let rel = root.strip_prefix(&mount).unwrap_or(&root);
            let fingerprint =
                derived_fingerprint(&[&volume.fingerprint(), &rel.to_string_lossy()]);
            Ok(volume.describe(&root, fingerprint, dir_name(&root)))
        }
        None => standalone_descriptor(&root),
    }
}

/// Descriptor for a user-supplied path on this system
///
/// # Errors
///
/// Returns [`DetectError::NotFound`] if the path is not an existing directory.
pub fn describe_path(path: &Path) -> Result<DriveDescriptor> {
    describe_path_from(&SystemVolumes, path)
}

fn canonical_mount(volume: &Volume) -> PathBuf {
    volume
        .mount_point
        .canonicalize()
        .unwrap_or_else(|_| volume.mount_point.clone())
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        /// Path on a filesystem no volume entry covers (e.g. tmpfs)
        fn standalone_descriptor(root: &Path) -> Result<DriveDescriptor> {
            let (total, available) = space::space_of(root)?;
            let fingerprint = derived_fingerprint(&["path", &root.to_string_lossy()]);
            let mut drive = DriveDescriptor::new(root, fingerprint)
                .with_capacity(total, available)
                .with_media(MediaClass::Fixed);
            if let Some(name) = dir_name(root) {
                drive = drive.with_name(name);
            }
            Ok(drive)
        }
    } else {
        fn standalone_descriptor(root: &Path) -> Result<DriveDescriptor> {
            Err(DetectError::NotFound(format!(
                "{} is not on a mounted volume",
                root.display()
            )))
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
