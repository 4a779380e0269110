//! TC3-HMAC-SHA256 request signing.
//!
//! # Canonical Request
//!
//! ```text
//! POST
//! /
//!
//! content-type:application/json; charset=utf-8
//! host:<host>
//! x-tc-action:<action, lower-cased>
//!
//! content-type;host;x-tc-action
//! <hex(sha256(payload))>
//! ```
//!
//! The blank line after `/` is the empty query string; the blank line after
//! the headers comes from each header line being newline-terminated. Both are
//! part of the protocol.
//!
//! # Key Derivation
//!
//! ```text
//! kDate    = HMAC("TC3" + secretKey, date)
//! kService = HMAC(kDate, service)
//! kSigning = HMAC(kService, "tc3_request")
//! sig      = hex(HMAC(kSigning, stringToSign))
//! ```
//!
//! Signing never reads the clock: `timestamp` is supplied by the caller.

use chrono::DateTime;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "TC3-HMAC-SHA256";
pub const SIGNED_HEADERS: &str = "content-type;host;x-tc-action";
pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Everything that goes into one signature.
#[derive(Debug, Clone, Copy)]
pub struct SigningInput<'a> {
    pub secret_id: &'a str,
    pub secret_key: &'a str,
    pub service: &'a str,
    pub action: &'a str,
    pub region: &'a str,
    pub host: &'a str,
    pub payload: &'a [u8],
    /// Unix seconds.
    pub timestamp: i64,
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> AppResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(format!("HMAC key rejected: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

impl SigningInput<'_> {
    fn validate(&self) -> AppResult<()> {
        let required = [
            ("secret id", self.secret_id),
            ("secret key", self.secret_key),
            ("service", self.service),
            ("action", self.action),
            ("host", self.host),
        ];
        if let Some((name, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(AppError::InvalidSigningInput(format!("{name} is empty")));
        }
        if std::str::from_utf8(self.payload).is_err() {
            return Err(AppError::InvalidSigningInput(
                "payload is not valid UTF-8".to_string(),
            ));
        }
        Ok(())
    }

    /// `YYYY-MM-DD` of the timestamp, in UTC.
    fn date(&self) -> AppResult<String> {
        DateTime::from_timestamp(self.timestamp, 0)
            .filter(|_| self.timestamp >= 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .ok_or_else(|| AppError::InvalidSigningInput("timestamp is out of range".to_string()))
    }

    pub fn canonical_request(&self) -> String {
        format!(
            "POST\n/\n\ncontent-type:{CONTENT_TYPE}\nhost:{}\nx-tc-action:{}\n\n{SIGNED_HEADERS}\n{}",
            self.host,
            self.action.to_lowercase(),
            sha256_hex(self.payload)
        )
    }

    fn credential_scope(&self, date: &str) -> String {
        format!("{date}/{}/tc3_request", self.service)
    }

    fn string_to_sign(&self, date: &str) -> String {
        format!(
            "{ALGORITHM}\n{}\n{}\n{}",
            self.timestamp,
            self.credential_scope(date),
            sha256_hex(self.canonical_request().as_bytes())
        )
    }
}

/// Compute the `Authorization` header value.
///
/// # Errors
///
/// `InvalidSigningInput` for an empty id, key, service, action or host, a
/// non-UTF-8 payload, or a negative/unrepresentable timestamp.
pub fn authorization(input: &SigningInput<'_>) -> AppResult<String> {
    input.validate()?;
    let date = input.date()?;

    let k_date = hmac_sha256(format!("TC3{}", input.secret_key).as_bytes(), date.as_bytes())?;
    let k_service = hmac_sha256(&k_date, input.service.as_bytes())?;
    let k_signing = hmac_sha256(&k_service, b"tc3_request")?;
    let signature = hex::encode(hmac_sha256(
        &k_signing,
        input.string_to_sign(&date).as_bytes(),
    )?);

    Ok(format!(
        "{ALGORITHM} Credential={}/{}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
        input.secret_id,
        input.credential_scope(&date)
    ))
}

/// Full header set for a signed call.
pub fn signed_headers(
    input: &SigningInput<'_>,
    version: &str,
    session_token: Option<&str>,
) -> AppResult<Vec<(&'static str, String)>> {
    let mut headers = vec![
        ("Authorization", authorization(input)?),
        ("Content-Type", CONTENT_TYPE.to_string()),
        ("Host", input.host.to_string()),
        ("X-TC-Action", input.action.to_string()),
        ("X-TC-Version", version.to_string()),
        ("X-TC-Region", input.region.to_string()),
        ("X-TC-Timestamp", input.timestamp.to_string()),
    ];
    if let Some(token) = session_token.filter(|t| !t.is_empty()) {
        headers.push(("X-TC-Token", token.to_string()));
    }
    Ok(headers)
}
