//! Parsing helpers for mount tables and device links
//!
//! These are pure functions over strings so they can be tested and fuzzed on
//! any host.

/// One line of a mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Device the filesystem lives on, e.g. `/dev/mmcblk0p1`
    pub device: String,
    /// Mount point with escapes decoded
    pub mount_point: String,
    /// Filesystem type, e.g. `vfat`
    pub filesystem: String,
}

impl MountEntry {
    /// Whether this mount is backed by a kernel pseudo filesystem
    #[must_use]
    pub fn is_pseudo(&self) -> bool {
        is_pseudo_filesystem(&self.filesystem)
    }
}

/// Filesystems that never live on a card
const PSEUDO_FILESYSTEMS: &[&str] = &[
    "autofs",
    "binfmt_misc",
    "bpf",
    "cgroup",
    "cgroup2",
    "configfs",
    "debugfs",
    "devpts",
    "devtmpfs",
    "fusectl",
    "hugetlbfs",
    "mqueue",
    "nsfs",
    "overlay",
    "proc",
    "pstore",
    "ramfs",
    "rpc_pipefs",
    "securityfs",
    "squashfs",
    "sysfs",
    "tmpfs",
    "tracefs",
];

/// Whether a filesystem type is a kernel pseudo filesystem
#[must_use]
pub fn is_pseudo_filesystem(filesystem: &str) -> bool {
    PSEUDO_FILESYSTEMS
        .iter()
        .any(|fs| fs.eq_ignore_ascii_case(filesystem.trim()))
}

/// Parse a single line from /proc/mounts
/// Format: device `mount_point` filesystem options dump pass
#[must_use]
pub fn parse_mount_line(line: &str) -> Option<MountEntry> {
    let mut parts = line.split_whitespace();
    let device = parts.next()?;
    let mount_point = parts.next()?;
    let filesystem = parts.next()?;

    Some(MountEntry {
        device: device.to_string(),
        mount_point: unescape_mount_path(mount_point),
        filesystem: filesystem.to_string(),
    })
}

/// Parse a whole mount table, skipping malformed lines
#[must_use]
pub fn parse_mounts(content: &str) -> Vec<MountEntry> {
    content.lines().filter_map(parse_mount_line).collect()
}

/// Decode the octal escapes the kernel uses in mount paths (`\040` for space)
#[must_use]
pub fn unescape_mount_path(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits.iter().all(|b| (b'0'..=b'7').contains(b))
}

/// Decode a `/dev/disk/by-label` name (handles `\x20` style escapes)
#[must_use]
pub fn decode_label(label: &str) -> String {
    let mut result = String::new();
    let mut chars = label.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'x') {
            chars.next();
            let hex: String = chars.by_ref().take(2).collect();
            match u8::from_str_radix(&hex, 16) {
                Ok(byte) if hex.len() == 2 && byte.is_ascii() => result.push(char::from(byte)),
                _ => {
                    result.push_str("\\x");
                    result.push_str(&hex);
                }
            }
        } else {
            result.push(c);
        }
    }

    result
}

/// Last path component of a device, e.g. `mmcblk0p1` for `/dev/mmcblk0p1`
#[must_use]
pub fn device_basename(device: &str) -> &str {
    device.rsplit(['/', '\\']).next().unwrap_or(device)
}

/// Whether a block device name belongs to the MMC/SD subsystem.
///
/// Built-in readers often report these as non-removable.
#[must_use]
pub fn is_sd_device(device: &str) -> bool {
    device_basename(device).starts_with("mmcblk")
}

/// Mount points that indicate a system drive
pub const SYSTEM_MOUNT_POINTS: &[&str] = &[
    "/",
    "/boot",
    "/boot/efi",
    "/home",
    "/usr",
    "/var",
    "/etc",
    "/System",
    "/Applications",
    "/Library",
    "C:",
    "C:\\",
    "C:\\Windows",
];

/// Check if a mount point is (or is under) a system location
#[must_use]
pub fn is_system_mount_point(mount_point: &str) -> bool {
    let normalized = mount_point.trim();
    if normalized.is_empty() {
        return false;
    }

    SYSTEM_MOUNT_POINTS.iter().any(|&sys| {
        normalized.eq_ignore_ascii_case(sys)
            || (sys != "/"
                && (normalized.starts_with(&format!("{sys}\\"))
                    || normalized.starts_with(&format!("{sys}/"))))
    })
}
