//! Fuzz testing for IP admission and request validation.
//!
//! Allow-list entries and client addresses both come from outside the
//! process (environment and proxy headers), so parsing must never panic.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_admission -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `admit`: IP literal and CIDR matching, including malformed prefixes
//! - `CidrRange::parse`: arbitrary `addr/prefix` strings
//! - `validate_job_id`, `validate_action`, `validate_role_session_name`

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use credential_gateway::middleware::{CidrRange, admit};
use credential_gateway::validation::{
    validate_action, validate_job_id, validate_role_session_name,
};

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    ip: &'a str,
    entries: Vec<&'a str>,
}

fuzz_target!(|input: Input<'_>| {
    let admitted = admit(input.ip, &input.entries);

    // Exact literal entries must always admit themselves
    if input.entries.iter().any(|e| e.trim() == input.ip.trim())
        && input.ip.trim().parse::<std::net::IpAddr>().is_ok()
    {
        assert!(admitted);
    }

    for entry in &input.entries {
        if let Some(range) = CidrRange::parse(entry) {
            assert!(range.prefix_len() <= 128);
        }
    }

    let _ = validate_job_id(input.ip);
    let _ = validate_action(input.ip);
    let _ = validate_role_session_name(input.ip);
});
