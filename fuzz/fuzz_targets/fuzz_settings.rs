#![no_main]

use libfuzzer_sys::fuzz_target;
use pinlock_core::LockSettings;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Try to parse a state document - should not panic
    if let Ok(settings) = serde_json::from_str::<LockSettings>(text) {
        // Stored hash/salt may be garbage; decoding must fail cleanly
        let _ = settings.credential();

        let lockout = settings.lockout();
        let _ = lockout.locked_for(u64::MAX);
        let _ = lockout.locked_for(0);

        // Round-trip
        let reserialized = serde_json::to_string(&settings).unwrap();
        let settings2: LockSettings = serde_json::from_str(&reserialized).unwrap();
        assert!(settings == settings2);
    }
});
