//! Fuzz test for schedule state JSON parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use sentinel_core::{ScheduleState, ScheduleUpdate};

fuzz_target!(|data: &str| {
    let Ok(mut state) = serde_json::from_str::<ScheduleState>(data) else {
        return;
    };

    let fingerprint = state.last_drive.clone().unwrap_or_default();
    let _ = state.drive(&fingerprint);

    state.apply(&ScheduleUpdate::CheckCompleted {
        fingerprint: fingerprint.clone(),
        display_name: "fuzz".to_string(),
        at: state.last_sweep_time.unwrap_or_default(),
    });
    assert!(state.drive(&fingerprint).is_some());

    let _ = serde_json::to_string_pretty(&state);
});

