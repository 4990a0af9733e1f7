//! Fuzz test for manifest JSON parsing
//!
//! A manifest file on the host may be truncated or hand-edited; loading it
//! must fail cleanly rather than panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sentinel_core::Manifest;

fuzz_target!(|data: &str| {
    let Ok(manifest) = serde_json::from_str::<Manifest>(data) else {
        return;
    };

    let _ = manifest.validate(&manifest.fingerprint);
    let _ = manifest.validate("other-drive");
    let _ = manifest.len();
    let _ = manifest.is_empty();

    let json = serde_json::to_string(&manifest).expect("manifest serializes");
    let back: Manifest = serde_json::from_str(&json).expect("serialized manifest parses");
    assert_eq!(back, manifest);
});
