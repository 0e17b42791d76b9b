#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pinlock_core::{is_valid_format, verify_secret, Credential};

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    secret: &'a str,
    stored_hash: &'a str,
    salt: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    // Arbitrary stored values must not panic
    let _ = verify_secret(input.secret, input.stored_hash, input.salt);

    if is_valid_format(input.secret) {
        let credential = Credential::derive(input.secret).unwrap();
        assert!(credential.matches(input.secret));
        assert!(verify_secret(
            input.secret,
            &credential.digest().to_hex(),
            &credential.salt().to_hex()
        ));
    }
});
