//! Bearer token codec.
//!
//! Two encodings are accepted on the way in:
//!
//! - **Signed tokens** (HS256 JWT) issued by `/api/auth/token`. Tamper-evident
//!   and self-expiring via the `exp` claim.
//! - **Delegated-credential blobs**: base64 of a JSON object holding
//!   provider-issued temporary credentials (`/api/auth/sts` returns these).
//!   They are not signed; the provider's own expiry governs validity.
//!
//! A token containing `.` is treated as signed, anything else as a blob.
//! Verification never consults jsonwebtoken's clock: expiry is checked
//! against the `now` passed to [`TokenCodec::verify_at`], so behavior is
//! deterministic under test.

mod bearer;

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::{CredentialPayload, CredentialSet};
use crate::error::{AppError, AppResult};

pub use bearer::extract_bearer;

/// Claims carried by a signed token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(flatten)]
    pub credentials: CredentialPayload,
    /// Issued at, unix seconds.
    pub iat: i64,
    /// Expires at, unix seconds. Always greater than `iat`.
    pub exp: i64,
}

/// A freshly issued signed token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies bearer tokens with a process-wide HMAC key.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    default_ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: &SecretString, default_ttl: Duration) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(bytes),
            decoding_key: DecodingKey::from_secret(bytes),
            default_ttl,
        }
    }

    /// Codec keyed with 32 random bytes. Tokens it issues die with the process.
    pub fn ephemeral(default_ttl: Duration) -> Self {
        let key: [u8; 32] = rand::random();
        Self::new(&SecretString::from(hex::encode(key)), default_ttl)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a token with the default lifetime.
    pub fn issue(&self, credentials: &CredentialSet) -> AppResult<IssuedToken> {
        self.issue_at(credentials, self.default_ttl, Utc::now().timestamp())
    }

    /// Issue a token valid from `now` for `ttl`.
    ///
    /// # Errors
    ///
    /// `BadRequest` if `ttl` is shorter than one second.
    pub fn issue_at(
        &self,
        credentials: &CredentialSet,
        ttl: Duration,
        now: i64,
    ) -> AppResult<IssuedToken> {
        let ttl_secs = ttl.as_secs();
        let lifetime = i64::try_from(ttl_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| {
                AppError::BadRequest("Token lifetime must be at least one second".to_string())
            })?;
        let exp = now
            .checked_add(lifetime)
            .ok_or_else(|| AppError::BadRequest("Token lifetime is too large".to_string()))?;

        let claims = TokenClaims {
            credentials: CredentialPayload::from(credentials),
            iat: now,
            exp,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token encoding failed: {e}")))?;

        let expires_at = DateTime::from_timestamp(exp, 0)
            .ok_or_else(|| AppError::BadRequest("Token lifetime is too large".to_string()))?;

        crate::metrics::record_token_issued();

        Ok(IssuedToken {
            token,
            expires_in: ttl_secs,
            expires_at,
        })
    }

    /// Verify a token against the current time.
    pub fn verify(&self, token: &str) -> AppResult<CredentialSet> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify a token of either encoding and return its credentials.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` if a signed token was not produced with this key
    /// - `Expired` if the token (or the delegated credential) has expired
    /// - `MalformedToken` for anything that does not decode
    pub fn verify_at(&self, token: &str, now: i64) -> AppResult<CredentialSet> {
        let result = if token.contains('.') {
            self.verify_signed(token, now)
        } else {
            decode_blob_at(token, now)
        };

        crate::metrics::record_token_verification(match &result {
            Ok(_) => "ok",
            Err(e) => e.auth_reason().unwrap_or("error"),
        });

        result
    }

    fn verify_signed(&self, token: &str, now: i64) -> AppResult<CredentialSet> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let data =
            decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    ErrorKind::InvalidSignature => AppError::InvalidSignature,
                    ErrorKind::ExpiredSignature => AppError::Expired,
                    _ => AppError::MalformedToken("signed token could not be decoded".to_string()),
                }
            })?;

        let claims = data.claims;
        if claims.exp <= claims.iat {
            return Err(AppError::MalformedToken(
                "token expiry precedes issue time".to_string(),
            ));
        }
        if claims.exp <= now {
            debug!(exp = claims.exp, now, "Signed token expired");
            return Err(AppError::Expired);
        }

        claims
            .credentials
            .into_credentials()
            .map_err(AppError::MalformedToken)
    }
}

/// Encode delegated credentials as an unsigned base64 JSON blob.
pub fn encode_blob(
    credentials: &CredentialSet,
    expiration: Option<DateTime<Utc>>,
) -> AppResult<String> {
    let mut payload = CredentialPayload::from(credentials);
    // Blobs are consumed by clients that predate the provider tag
    payload.provider = None;
    payload.expiration = expiration.map(|e| e.to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
    let json = serde_json::to_vec(&payload)?;
    Ok(STANDARD.encode(json))
}

/// Decode a delegated-credential blob.
///
/// Standard and URL-safe alphabets, padded or not, are accepted. A blob whose
/// `expiration` is already in the past is rejected; an unparseable expiration
/// is left for the provider to judge.
pub fn decode_blob_at(token: &str, now: i64) -> AppResult<CredentialSet> {
    let token = token.trim();
    let bytes = [STANDARD, URL_SAFE, STANDARD_NO_PAD, URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(token).ok())
        .ok_or_else(|| AppError::MalformedToken("token is not valid base64".to_string()))?;

    let payload: CredentialPayload = serde_json::from_slice(&bytes)
        .map_err(|_| AppError::MalformedToken("token payload is not valid JSON".to_string()))?;

    if let Some(expiration) = payload.expiration.as_deref() {
        match DateTime::parse_from_rfc3339(expiration) {
            Ok(at) if at.timestamp() <= now => {
                debug!(expiration, "Delegated credential expired");
                return Err(AppError::Expired);
            }
            Ok(_) => {}
            Err(_) => debug!(expiration, "Ignoring unparseable credential expiration"),
        }
    }

    payload.into_credentials().map_err(AppError::MalformedToken)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::credentials::Provider;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn codec() -> TokenCodec {
        TokenCodec::new(
            &SecretString::from("unit-test-secret".to_string()),
            Duration::from_secs(3600),
        )
    }

    fn blob(value: serde_json::Value) -> String {
        STANDARD.encode(serde_json::to_vec(&value).unwrap())
    }

    #[test]
    fn test_issue_then_verify_returns_same_credentials() {
        let codec = codec();
        let creds = CredentialSet::aliyun("AK", "SK").with_region("cn-hangzhou");

        let issued = codec.issue_at(&creds, Duration::from_secs(3600), NOW).unwrap();
        assert_eq!(issued.expires_in, 3600);
        assert_eq!(issued.expires_at.timestamp(), NOW + 3600);

        let verified = codec.verify_at(&issued.token, NOW).unwrap();
        assert_eq!(verified.access_key_id, "AK");
        assert_eq!(verified.access_key_secret.expose_secret(), "SK");
        assert_eq!(verified.region.as_deref(), Some("cn-hangzhou"));
        assert_eq!(verified.provider, Provider::Aliyun);
    }

    #[test]
    fn test_verify_valid_until_last_second() {
        let codec = codec();
        let issued = codec
            .issue_at(&CredentialSet::aliyun("AK", "SK"), Duration::from_secs(60), NOW)
            .unwrap();

        assert!(codec.verify_at(&issued.token, NOW + 59).is_ok());
        assert!(matches!(
            codec.verify_at(&issued.token, NOW + 60),
            Err(AppError::Expired)
        ));
        assert!(matches!(
            codec.verify_at(&issued.token, NOW + 10_000),
            Err(AppError::Expired)
        ));
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let result = codec().issue_at(&CredentialSet::aliyun("AK", "SK"), Duration::ZERO, NOW);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_token_from_other_key_has_invalid_signature() {
        let other = TokenCodec::new(
            &SecretString::from("a-different-secret".to_string()),
            Duration::from_secs(3600),
        );
        let issued = other
            .issue_at(&CredentialSet::aliyun("AK", "SK"), Duration::from_secs(60), NOW)
            .unwrap();

        assert!(matches!(
            codec().verify_at(&issued.token, NOW),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let codec = codec();
        let issued = codec
            .issue_at(&CredentialSet::aliyun("AK", "SK"), Duration::from_secs(60), NOW)
            .unwrap();

        let parts: Vec<&str> = issued.token.split('.').collect();
        let forged_claims = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&json!({
                "accessKeyId": "EVIL",
                "accessKeySecret": "SK",
                "iat": NOW,
                "exp": NOW + 60
            }))
            .unwrap(),
        );
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);

        assert!(matches!(
            codec.verify_at(&forged, NOW),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn test_garbage_with_dot_is_malformed() {
        assert!(matches!(
            codec().verify_at("not.a.jwt", NOW),
            Err(AppError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_tencent_credentials_survive_signing() {
        let codec = codec();
        let issued = codec
            .issue_at(
                &CredentialSet::tencent("AKID", "KEY").with_region("ap-guangzhou"),
                Duration::from_secs(60),
                NOW,
            )
            .unwrap();

        let verified = codec.verify_at(&issued.token, NOW).unwrap();
        assert_eq!(verified.provider, Provider::Tencent);
        assert_eq!(verified.access_key_id, "AKID");
    }

    #[test]
    fn test_blob_decodes_delegated_credentials() {
        let token = blob(json!({
            "accessKeyId": "STS.AK",
            "accessKeySecret": "SK",
            "securityToken": "TOKEN",
            "regionId": "cn-hangzhou",
            "endpoint": "docmind-api.cn-hangzhou.aliyuncs.com"
        }));

        let creds = codec().verify_at(&token, NOW).unwrap();
        assert_eq!(creds.access_key_id, "STS.AK");
        assert!(creds.is_delegated());
        assert_eq!(
            creds.endpoint.as_deref(),
            Some("docmind-api.cn-hangzhou.aliyuncs.com")
        );
    }

    #[test]
    fn test_blob_tencent_fields() {
        let token = blob(json!({ "secretId": "AKID", "secretKey": "KEY" }));
        let creds = decode_blob_at(&token, NOW).unwrap();
        assert_eq!(creds.provider, Provider::Tencent);
    }

    #[test]
    fn test_blob_url_safe_unpadded_is_accepted() {
        let token = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&json!({ "accessKeyId": "A", "accessKeySecret": "B" })).unwrap(),
        );
        assert!(decode_blob_at(&token, NOW).is_ok());
    }

    #[test]
    fn test_blob_invalid_base64() {
        let err = decode_blob_at("%%%not base64%%%", NOW).unwrap_err();
        assert!(matches!(err, AppError::MalformedToken(ref m) if m.contains("base64")));
    }

    #[test]
    fn test_blob_invalid_json() {
        let token = STANDARD.encode(b"definitely not json");
        let err = decode_blob_at(&token, NOW).unwrap_err();
        assert!(matches!(err, AppError::MalformedToken(ref m) if m.contains("JSON")));
    }

    #[test]
    fn test_blob_missing_secret() {
        let token = blob(json!({ "accessKeyId": "AK" }));
        assert!(matches!(
            decode_blob_at(&token, NOW),
            Err(AppError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_blob_past_expiration_is_expired() {
        let token = blob(json!({
            "accessKeyId": "AK",
            "accessKeySecret": "SK",
            "expiration": "2023-11-14T00:00:00Z"
        }));
        assert!(matches!(decode_blob_at(&token, NOW), Err(AppError::Expired)));
    }

    #[test]
    fn test_blob_future_expiration_is_accepted() {
        let token = blob(json!({
            "accessKeyId": "AK",
            "accessKeySecret": "SK",
            "expiration": "2030-01-01T00:00:00Z"
        }));
        assert!(decode_blob_at(&token, NOW).is_ok());
    }

    #[test]
    fn test_encode_blob_round_trip() {
        let creds = CredentialSet::aliyun("STS.AK", "SK")
            .with_session_token("TOKEN")
            .with_region("cn-hangzhou");
        let expiration = DateTime::from_timestamp(NOW + 3600, 0).unwrap();

        let token = encode_blob(&creds, Some(expiration)).unwrap();
        let decoded: serde_json::Value =
            serde_json::from_slice(&STANDARD.decode(&token).unwrap()).unwrap();
        assert_eq!(decoded["accessKeyId"], "STS.AK");
        assert_eq!(decoded["securityToken"], "TOKEN");
        assert_eq!(decoded["expiration"], "2023-11-14T23:13:20Z");
        assert!(decoded.get("provider").is_none());

        let back = decode_blob_at(&token, NOW).unwrap();
        assert!(back.is_delegated());
    }

    #[test]
    fn test_ephemeral_codecs_do_not_share_keys() {
        let a = TokenCodec::ephemeral(Duration::from_secs(60));
        let b = TokenCodec::ephemeral(Duration::from_secs(60));
        let issued = a.issue(&CredentialSet::aliyun("AK", "SK")).unwrap();

        assert!(a.verify(&issued.token).is_ok());
        assert!(matches!(b.verify(&issued.token), Err(AppError::InvalidSignature)));
    }
}
