//! Tencent Cloud API 3.0 (TC3-HMAC-SHA256).

mod client;
pub mod signer;

pub use client::{ReconstructTaskOptions, TencentClient, encode_payload};
pub use signer::{SigningInput, authorization, signed_headers};
