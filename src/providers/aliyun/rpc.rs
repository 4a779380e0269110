//! Alibaba Cloud RPC-style request signing (`SignatureVersion=1.0`).
//!
//! # Algorithm
//!
//! 1. Collect common + action parameters, sort by key
//! 2. Percent-encode each key and value (RFC 3986, unreserved `A-Za-z0-9-_.~`)
//! 3. Join as `k=v` with `&` to form the canonical query
//! 4. `stringToSign = METHOD & encode("/") & encode(canonicalQuery)`
//! 5. `Signature = base64(HMAC-SHA1(secret + "&", stringToSign))`
//!
//! Signing is pure; [`RpcRequest::signed_params`] takes the nonce and
//! timestamp as arguments so vectors can be pinned in tests.

use std::collections::BTreeMap;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use secrecy::ExposeSecret;
use serde_json::Value;
use sha1::Sha1;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::credentials::CredentialSet;
use crate::error::{AppError, AppResult, ProviderError};
use crate::providers::endpoint_url;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters stay literal; everything else is encoded.
const RPC_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const SIGNATURE_VERSION: &str = "1.0";

pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, RPC_ENCODE_SET).to_string()
}

/// Sorted, encoded `k=v&k=v` form of the parameters.
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn string_to_sign(method: &str, canonical_query: &str) -> String {
    format!(
        "{method}&{}&{}",
        percent_encode("/"),
        percent_encode(canonical_query)
    )
}

/// Compute the `Signature` parameter for `params` (which must not contain it).
pub fn sign_rpc(
    method: &str,
    params: &BTreeMap<String, String>,
    access_key_secret: &str,
) -> AppResult<String> {
    if access_key_secret.is_empty() {
        return Err(AppError::InvalidSigningInput(
            "access key secret is empty".to_string(),
        ));
    }

    let to_sign = string_to_sign(method, &canonical_query(params));
    let mut mac = HmacSha1::new_from_slice(format!("{access_key_secret}&").as_bytes())
        .map_err(|e| AppError::Internal(format!("HMAC key rejected: {e}")))?;
    mac.update(to_sign.as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Timestamp in the format the RPC gateway expects.
pub fn rpc_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// One RPC action with its business parameters.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    action: String,
    version: String,
    params: BTreeMap<String, String>,
}

impl RpcRequest {
    pub fn new(action: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            version: version.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add the parameter only when a value is present.
    pub fn param_opt(self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// All parameters to send, including common parameters and `Signature`.
    pub fn signed_params(
        &self,
        credentials: &CredentialSet,
        nonce: &str,
        timestamp: &str,
    ) -> AppResult<BTreeMap<String, String>> {
        if credentials.access_key_id.trim().is_empty() {
            return Err(AppError::InvalidSigningInput(
                "access key id is empty".to_string(),
            ));
        }

        let mut params = self.params.clone();
        params.insert("Action".into(), self.action.clone());
        params.insert("Version".into(), self.version.clone());
        params.insert("Format".into(), "JSON".into());
        params.insert("AccessKeyId".into(), credentials.access_key_id.clone());
        params.insert("SignatureMethod".into(), SIGNATURE_METHOD.into());
        params.insert("SignatureVersion".into(), SIGNATURE_VERSION.into());
        params.insert("SignatureNonce".into(), nonce.to_string());
        params.insert("Timestamp".into(), timestamp.to_string());
        if let Some(token) = &credentials.session_token {
            params.insert("SecurityToken".into(), token.expose_secret().to_string());
        }

        let signature = sign_rpc(
            "POST",
            &params,
            credentials.access_key_secret.expose_secret(),
        )?;
        params.insert("Signature".into(), signature);

        Ok(params)
    }
}

/// Build a [`ProviderError`] from an RPC error envelope
/// (`{RequestId, Code, Message}`, either casing).
pub fn provider_error(status: Option<u16>, body: &Value, default_code: &str) -> ProviderError {
    let field = |pascal: &str, camel: &str| {
        body.get(pascal)
            .or_else(|| body.get(camel))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let error = ProviderError::new(
        field("Code", "code").unwrap_or_else(|| default_code.to_string()),
        field("Message", "message").unwrap_or_else(|| "Provider returned an error".to_string()),
    )
    .with_request_id(field("RequestId", "requestId"));

    match status {
        Some(status) => error.with_status(status),
        None => error,
    }
}

/// Sends signed RPC requests.
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
}

impl RpcClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// POST a signed request as a form and return the JSON body.
    ///
    /// # Errors
    ///
    /// - `Provider` for a non-2xx response, with the provider's code, message
    ///   and request id (code defaults to `default_error_code`)
    /// - `Upstream` when the endpoint cannot be reached
    #[instrument(skip(self, request, credentials), fields(action = %request.action()))]
    pub async fn call(
        &self,
        endpoint: &str,
        request: &RpcRequest,
        credentials: &CredentialSet,
        default_error_code: &str,
    ) -> AppResult<Value> {
        let params = request.signed_params(
            credentials,
            &Uuid::new_v4().to_string(),
            &rpc_timestamp(),
        )?;

        let started = Instant::now();
        let response = self
            .http
            .post(format!("{}/", endpoint_url(endpoint)))
            .form(&params)
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        crate::metrics::record_upstream_duration(
            "aliyun",
            request.action(),
            started.elapsed().as_secs_f64(),
        );

        let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        debug!(status = status.as_u16(), "RPC response received");

        if !status.is_success() {
            return Err(provider_error(Some(status.as_u16()), &body, default_error_code).into());
        }
        if body.is_null() {
            return Err(ProviderError::new(default_error_code, "Provider returned a non-JSON body")
                .with_status(status.as_u16())
                .into());
        }

        Ok(body)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vector_params() -> BTreeMap<String, String> {
        [
            ("AccessKeyId", "testid"),
            ("Action", "AssumeRole"),
            ("DurationSeconds", "3600"),
            ("Format", "JSON"),
            ("RoleArn", "acs:ram::123456789012:role/test-role"),
            ("RoleSessionName", "session-1"),
            ("SignatureMethod", "HMAC-SHA1"),
            ("SignatureNonce", "3ee8c1b8-83d3-44af-a94f-4e0ad82fd6cf"),
            ("SignatureVersion", "1.0"),
            ("Timestamp", "2016-02-23T12:46:24Z"),
            ("Version", "2015-04-01"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_percent_encode_rfc3986() {
        assert_eq!(percent_encode("a b*c~d/é"), "a%20b%2Ac~d%2F%C3%A9");
        assert_eq!(percent_encode("A-Z_a.z~09"), "A-Z_a.z~09");
        assert_eq!(percent_encode("+=&"), "%2B%3D%26");
    }

    #[test]
    fn test_canonical_query_vector() {
        assert_eq!(
            canonical_query(&vector_params()),
            "AccessKeyId=testid&Action=AssumeRole&DurationSeconds=3600&Format=JSON\
             &RoleArn=acs%3Aram%3A%3A123456789012%3Arole%2Ftest-role&RoleSessionName=session-1\
             &SignatureMethod=HMAC-SHA1&SignatureNonce=3ee8c1b8-83d3-44af-a94f-4e0ad82fd6cf\
             &SignatureVersion=1.0&Timestamp=2016-02-23T12%3A46%3A24Z&Version=2015-04-01"
        );
    }

    #[test]
    fn test_string_to_sign_vector() {
        let canonical = canonical_query(&vector_params());
        assert_eq!(
            string_to_sign("POST", &canonical),
            "POST&%2F&AccessKeyId%3Dtestid%26Action%3DAssumeRole%26DurationSeconds%3D3600\
             %26Format%3DJSON%26RoleArn%3Dacs%253Aram%253A%253A123456789012%253Arole%252Ftest-role\
             %26RoleSessionName%3Dsession-1%26SignatureMethod%3DHMAC-SHA1\
             %26SignatureNonce%3D3ee8c1b8-83d3-44af-a94f-4e0ad82fd6cf%26SignatureVersion%3D1.0\
             %26Timestamp%3D2016-02-23T12%253A46%253A24Z%26Version%3D2015-04-01"
        );
    }

    #[test]
    fn test_sign_rpc_golden_vector() {
        let signature = sign_rpc("POST", &vector_params(), "testsecret").unwrap();
        assert_eq!(signature, "fYPo3bSh7GZ42nG+YVfosL2z++A=");
    }

    #[test]
    fn test_signed_params_match_golden_vector() {
        let request = RpcRequest::new("AssumeRole", "2015-04-01")
            .param("RoleArn", "acs:ram::123456789012:role/test-role")
            .param("RoleSessionName", "session-1")
            .param("DurationSeconds", "3600");
        let creds = CredentialSet::aliyun("testid", "testsecret");

        let params = request
            .signed_params(
                &creds,
                "3ee8c1b8-83d3-44af-a94f-4e0ad82fd6cf",
                "2016-02-23T12:46:24Z",
            )
            .unwrap();

        assert_eq!(params["Signature"], "fYPo3bSh7GZ42nG+YVfosL2z++A=");
        assert!(!params.contains_key("SecurityToken"));
    }

    #[test]
    fn test_security_token_is_signed() {
        let creds = CredentialSet::aliyun("STS.id", "secret").with_session_token("tok");
        let params = RpcRequest::new("GetDocStructureResult", "2022-07-11")
            .param("Id", "docmind-1")
            .signed_params(&creds, "nonce", "2024-01-01T00:00:00Z")
            .unwrap();

        assert_eq!(params["SecurityToken"], "tok");
        let mut unsigned = params.clone();
        let signature = unsigned.remove("Signature").unwrap();
        assert_eq!(sign_rpc("POST", &unsigned, "secret").unwrap(), signature);
    }

    #[test]
    fn test_empty_secret_is_invalid_input() {
        assert!(matches!(
            sign_rpc("POST", &BTreeMap::new(), ""),
            Err(AppError::InvalidSigningInput(_))
        ));
    }

    #[test]
    fn test_param_opt() {
        let request = RpcRequest::new("A", "v")
            .param_opt("Present", Some("1"))
            .param_opt("Absent", None::<String>);
        assert!(request.params.contains_key("Present"));
        assert!(!request.params.contains_key("Absent"));
    }

    #[test]
    fn test_provider_error_from_envelope() {
        let err = provider_error(
            Some(400),
            &json!({ "RequestId": "req-1", "Code": "InvalidParameter", "Message": "bad" }),
            "AliyunError",
        );
        assert_eq!(err.code, "InvalidParameter");
        assert_eq!(err.message, "bad");
        assert_eq!(err.request_id.as_deref(), Some("req-1"));
        assert_eq!(err.status, Some(400));
    }

    #[test]
    fn test_provider_error_defaults() {
        let err = provider_error(None, &Value::Null, "AliyunSTSError");
        assert_eq!(err.code, "AliyunSTSError");
        assert!(err.request_id.is_none());
    }
}
