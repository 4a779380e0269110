//! Fuzz testing for bearer token parsing.
//!
//! Every byte of a bearer header is attacker-controlled. Header parsing,
//! signed-token verification and blob decoding must reject garbage with an
//! error, never a panic.
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_token_decode -- -max_total_time=60
//! ```

#![no_main]

use std::sync::LazyLock;
use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use credential_gateway::token::{TokenCodec, decode_blob_at, extract_bearer};

static CODEC: LazyLock<TokenCodec> =
    LazyLock::new(|| TokenCodec::ephemeral(Duration::from_secs(3600)));

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(token) = extract_bearer(Some(s)) {
        let _ = CODEC.verify_at(token, 1_700_000_000);
    }
    let _ = decode_blob_at(s, 1_700_000_000);
});
