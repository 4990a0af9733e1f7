//! Fuzz test for settings TOML parsing
//!
//! Tests that arbitrary config files either parse into settings that convert
//! to a scan config, or fail with an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sentinel_core::Settings;

fuzz_target!(|data: &str| {
    if let Ok(settings) = Settings::parse(data) {
        if let Ok(config) = settings.scan_config() {
            assert!(config.quick.coverage > 0.0 && config.quick.coverage <= 1.0);
            assert!(config.quick.verify_passes >= 1);
            assert!(config.default_interval_days >= 1);
        }
        let _ = toml::to_string_pretty(&settings);
    }

    for section in ["check", "sweep", "behavior"] {
        let wrapped = format!("[{}]\n{}", section, data);
        let _ = Settings::parse(&wrapped).map(|s| s.scan_config());
    }
});
