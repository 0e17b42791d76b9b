#![no_main]

use libfuzzer_sys::fuzz_target;
use pinlock_core::format_duration;

fuzz_target!(|millis: u64| {
    let text = format_duration(millis);
    assert!(text.ends_with("second") || text.ends_with("seconds") || text.contains("minute"));
    assert!(!text.starts_with("0 minutes"));
});
