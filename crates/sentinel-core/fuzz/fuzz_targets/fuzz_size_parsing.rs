//! Fuzz test for size strings like "4M" from settings and the command line

#![no_main]

use libfuzzer_sys::fuzz_target;
use sentinel_core::{format_bytes, parse_size};

fuzz_target!(|data: &str| {
    if let Ok(bytes) = parse_size(data) {
        let _ = format_bytes(bytes);
    }
});
