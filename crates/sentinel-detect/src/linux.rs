//! Linux volume details
//!
//! Uses /proc/mounts for mount lookup, /dev/disk/by-uuid and by-label for
//! identity, and /sys/class/block for the removable flag.

use crate::mounts::{decode_label, device_basename, is_sd_device, parse_mounts, MountEntry};
use crate::{DetectError, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Read the current mount table
///
/// # Errors
///
/// Returns an error if `/proc/mounts` cannot be read.
pub(crate) fn read_mounts() -> Result<Vec<MountEntry>> {
    let content = fs::read_to_string("/proc/mounts")
        .map_err(|e| DetectError::EnumerationFailed(format!("Failed to read /proc/mounts: {e}")))?;
    Ok(parse_mounts(&content))
}

/// Map of device basename -> name of the symlink pointing at it
fn link_map(dir: &Path, decode: bool) -> HashMap<String, String> {
    let mut map = HashMap::new();

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let name = if decode { decode_label(&name) } else { name };

            // Target is usually something like "../../sdb1"
            if let Ok(target) = fs::read_link(entry.path()) {
                let target = target.to_string_lossy();
                map.insert(device_basename(&target).to_string(), name);
            }
        }
    }

    map
}

/// Device basename -> filesystem UUID
pub(crate) fn uuid_map() -> HashMap<String, String> {
    link_map(Path::new("/dev/disk/by-uuid"), false)
}

/// Device basename -> filesystem label
pub(crate) fn label_map() -> HashMap<String, String> {
    link_map(Path::new("/dev/disk/by-label"), true)
}

/// Whether the block device behind `device` is removable.
///
/// Partitions inherit the flag of their parent disk. MMC devices count as
/// removable even when the reader reports otherwise.
pub(crate) fn is_removable_device(device: &str) -> Option<bool> {
    if is_sd_device(device) {
        return Some(true);
    }

    let name = device_basename(device);
    let class = Path::new("/sys/class/block").join(name);
    let own = read_sys_value(&class.join("removable"));
    let flag = own.or_else(|| read_sys_value(&class.join("..").join("removable")))?;
    Some(flag == "1")
}

fn read_sys_value(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    #[test]
    fn test_link_map_resolves_targets() {
        let dir = TempDir::new().unwrap();
        symlink("../../mmcblk0p1", dir.path().join("1234-ABCD")).unwrap();
        symlink("../../sdb1", dir.path().join("MY\\x20CARD")).unwrap();

        let raw = link_map(dir.path(), false);
        assert_eq!(raw.get("mmcblk0p1").map(String::as_str), Some("1234-ABCD"));

        let decoded = link_map(dir.path(), true);
        assert_eq!(decoded.get("sdb1").map(String::as_str), Some("MY CARD"));
    }

    #[test]
    fn test_link_map_missing_dir_is_empty() {
        assert!(link_map(Path::new("/nonexistent/by-uuid"), false).is_empty());
    }

    #[test]
    fn test_mmc_devices_are_removable() {
        assert_eq!(is_removable_device("/dev/mmcblk0p1"), Some(true));
    }

    #[test]
    fn test_unknown_device_has_no_flag() {
        assert_eq!(is_removable_device("/dev/definitely-not-a-disk"), None);
    }

    #[test]
    fn test_read_mounts_real() {
        // Every Linux host mounts something at /
        let mounts = read_mounts().unwrap();
        assert!(mounts.iter().any(|m| m.mount_point == "/"));
    }
}
