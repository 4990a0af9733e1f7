//! Fuzz test for mount table and device link parsing
//!
//! Tests that /proc/mounts parsing, escape decoding and system mount point
//! detection handle arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sentinel_detect::mounts::{
    decode_label, device_basename, is_sd_device, is_system_mount_point, parse_mount_line,
    parse_mounts, unescape_mount_path,
};

fuzz_target!(|data: &str| {
    for line in data.lines() {
        if let Some(entry) = parse_mount_line(line) {
            assert!(!entry.device.is_empty());
            assert!(!entry.filesystem.is_empty());
            let _ = entry.is_pseudo();
            let _ = is_system_mount_point(&entry.mount_point);
        }

        let _ = decode_label(line);
        let _ = is_sd_device(line);
        assert!(device_basename(line).len() <= line.len());

        assert!(unescape_mount_path(line).len() <= line.len() * 3);
    }

    let entries = parse_mounts(data);
    assert!(entries.len() <= data.lines().count());
});
