//! Alibaba Cloud STS role assumption.
//!
//! Exchanges a long-lived access key and a RAM role ARN for short-lived
//! delegated credentials (`AssumeRole`, API version 2015-04-01).
//!
//! The response has been seen in two casings, `Credentials{AccessKeyId,...}`
//! and `credentials{accessKeyId,...}`; both normalize to [`AssumedCredential`].
//! A success envelope without a complete credential object is an error, never
//! a half-populated credential.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::rpc::{RpcClient, RpcRequest, provider_error};
use crate::credentials::CredentialSet;
use crate::error::{AppError, AppResult, ProviderError};

pub const STS_VERSION: &str = "2015-04-01";
pub const DEFAULT_STS_REGION: &str = "cn-hangzhou";
pub const DEFAULT_STS_ENDPOINT: &str = "sts.cn-hangzhou.aliyuncs.com";

/// Error code used when the provider did not supply one.
const DEFAULT_ERROR_CODE: &str = "AliyunSTSError";

/// Input to [`StsClient::assume_role`].
#[derive(Debug, Clone)]
pub struct AssumeRoleRequest {
    pub access_key_id: String,
    pub access_key_secret: SecretString,
    pub role_arn: String,
    pub role_session_name: String,
    /// Forwarded unmodified; the provider enforces its own bounds.
    pub duration_seconds: Option<u32>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

impl AssumeRoleRequest {
    /// Endpoint to call: explicit endpoint, else the regional one, else the default.
    pub fn sts_endpoint(&self, default_endpoint: &str) -> String {
        match (&self.endpoint, &self.region) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, Some(region)) => format!("sts.{region}.aliyuncs.com"),
            (None, None) => default_endpoint.to_string(),
        }
    }

    fn rpc_request(&self) -> RpcRequest {
        RpcRequest::new("AssumeRole", STS_VERSION)
            .param("RoleArn", self.role_arn.as_str())
            .param("RoleSessionName", self.role_session_name.as_str())
            .param_opt("DurationSeconds", self.duration_seconds.map(|d| d.to_string()))
    }
}

/// Delegated credentials returned by `AssumeRole`.
#[derive(Debug, Clone)]
pub struct AssumedCredential {
    pub credentials: CredentialSet,
    pub expiration: DateTime<Utc>,
    pub request_id: Option<String>,
}

/// STS client over the shared RPC transport.
#[derive(Clone)]
pub struct StsClient {
    rpc: RpcClient,
    default_endpoint: String,
}

impl StsClient {
    pub fn new(rpc: RpcClient, default_endpoint: impl Into<String>) -> Self {
        Self {
            rpc,
            default_endpoint: default_endpoint.into(),
        }
    }

    /// Assume a RAM role.
    ///
    /// # Errors
    ///
    /// - `Provider` for any provider-side rejection, including a success
    ///   envelope that lacks credentials
    /// - `Upstream` when STS cannot be reached
    #[instrument(skip(self, request), fields(role_arn = %request.role_arn, session = %request.role_session_name))]
    pub async fn assume_role(&self, request: &AssumeRoleRequest) -> AppResult<AssumedCredential> {
        let endpoint = request.sts_endpoint(&self.default_endpoint);
        let caller = CredentialSet::aliyun(
            request.access_key_id.as_str(),
            request.access_key_secret.expose_secret(),
        );

        let result = self
            .rpc
            .call(&endpoint, &request.rpc_request(), &caller, DEFAULT_ERROR_CODE)
            .await
            .and_then(parse_assume_role_response);

        match &result {
            Ok(assumed) => {
                crate::metrics::record_sts_request("success");
                info!(
                    expiration = %assumed.expiration,
                    request_id = assumed.request_id.as_deref().unwrap_or("-"),
                    "Role assumed"
                );
            }
            Err(e) => {
                crate::metrics::record_sts_request("failure");
                warn!(error = %e, "AssumeRole failed");
            }
        }

        result
    }
}

/// Normalize an `AssumeRole` response body.
pub fn parse_assume_role_response(body: Value) -> AppResult<AssumedCredential> {
    let field = |obj: &Value, pascal: &str, camel: &str| {
        obj.get(pascal)
            .or_else(|| obj.get(camel))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let request_id = field(&body, "RequestId", "requestId");
    let Some(creds) = body
        .get("Credentials")
        .or_else(|| body.get("credentials"))
        .filter(|c| c.is_object())
    else {
        return Err(provider_error(None, &body, DEFAULT_ERROR_CODE).into());
    };

    let incomplete = |what: &str| -> AppError {
        ProviderError::new(
            DEFAULT_ERROR_CODE,
            format!("AssumeRole response is missing {what}"),
        )
        .with_request_id(request_id.clone())
        .into()
    };

    let access_key_id =
        field(creds, "AccessKeyId", "accessKeyId").ok_or_else(|| incomplete("AccessKeyId"))?;
    let access_key_secret = field(creds, "AccessKeySecret", "accessKeySecret")
        .ok_or_else(|| incomplete("AccessKeySecret"))?;
    let security_token =
        field(creds, "SecurityToken", "securityToken").ok_or_else(|| incomplete("SecurityToken"))?;
    let expiration = field(creds, "Expiration", "expiration")
        .and_then(|e| DateTime::parse_from_rfc3339(&e).ok())
        .map(|e| e.with_timezone(&Utc))
        .ok_or_else(|| incomplete("a valid Expiration"))?;

    Ok(AssumedCredential {
        credentials: CredentialSet::aliyun(access_key_id, access_key_secret)
            .with_session_token(security_token),
        expiration,
        request_id,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> AssumeRoleRequest {
        AssumeRoleRequest {
            access_key_id: "AK".into(),
            access_key_secret: SecretString::from("SK".to_string()),
            role_arn: "acs:ram::1:role/r".into(),
            role_session_name: "s".into(),
            duration_seconds: None,
            region: None,
            endpoint: None,
        }
    }

    #[test]
    fn test_pascal_case_response() {
        let assumed = parse_assume_role_response(json!({
            "RequestId": "req-1",
            "Credentials": {
                "AccessKeyId": "STS.AK",
                "AccessKeySecret": "STS.SK",
                "SecurityToken": "TOKEN",
                "Expiration": "2030-01-01T00:00:00Z"
            }
        }))
        .unwrap();

        assert_eq!(assumed.credentials.access_key_id, "STS.AK");
        assert!(assumed.credentials.is_delegated());
        assert_eq!(assumed.expiration.to_rfc3339(), "2030-01-01T00:00:00+00:00");
        assert_eq!(assumed.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn test_camel_case_response_normalizes_identically() {
        let pascal = parse_assume_role_response(json!({
            "Credentials": {
                "AccessKeyId": "A", "AccessKeySecret": "B",
                "SecurityToken": "C", "Expiration": "2030-01-01T00:00:00Z"
            }
        }))
        .unwrap();
        let camel = parse_assume_role_response(json!({
            "credentials": {
                "accessKeyId": "A", "accessKeySecret": "B",
                "securityToken": "C", "expiration": "2030-01-01T00:00:00Z"
            }
        }))
        .unwrap();

        assert_eq!(pascal.credentials.access_key_id, camel.credentials.access_key_id);
        assert_eq!(
            pascal.credentials.access_key_secret.expose_secret(),
            camel.credentials.access_key_secret.expose_secret()
        );
        assert_eq!(pascal.expiration, camel.expiration);
    }

    #[test]
    fn test_missing_credentials_preserves_provider_diagnostics() {
        let err = parse_assume_role_response(json!({
            "RequestId": "req-9",
            "Code": "NoPermission",
            "Message": "You are not authorized"
        }))
        .unwrap_err();

        match err {
            AppError::Provider(e) => {
                assert_eq!(e.code, "NoPermission");
                assert_eq!(e.message, "You are not authorized");
                assert_eq!(e.request_id.as_deref(), Some("req-9"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_credentials_without_code_uses_default() {
        let err = parse_assume_role_response(json!({})).unwrap_err();
        assert!(matches!(err, AppError::Provider(ref e) if e.code == "AliyunSTSError"));
    }

    #[test]
    fn test_half_populated_credentials_are_rejected() {
        let err = parse_assume_role_response(json!({
            "RequestId": "req-2",
            "Credentials": { "AccessKeyId": "A", "AccessKeySecret": "B" }
        }))
        .unwrap_err();

        match err {
            AppError::Provider(e) => {
                assert!(e.message.contains("SecurityToken"));
                assert_eq!(e.request_id.as_deref(), Some("req-2"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_duration_is_forwarded_unmodified() {
        let mut req = request();
        req.duration_seconds = Some(99_999);
        let params = req
            .rpc_request()
            .signed_params(&CredentialSet::aliyun("AK", "SK"), "n", "t")
            .unwrap();
        assert_eq!(params["DurationSeconds"], "99999");
        assert_eq!(params["Action"], "AssumeRole");
        assert_eq!(params["Version"], STS_VERSION);
    }

    #[test]
    fn test_duration_omitted_when_absent() {
        let params = request()
            .rpc_request()
            .signed_params(&CredentialSet::aliyun("AK", "SK"), "n", "t")
            .unwrap();
        assert!(!params.contains_key("DurationSeconds"));
    }

    #[test]
    fn test_sts_endpoint_selection() {
        let mut req = request();
        assert_eq!(req.sts_endpoint(DEFAULT_STS_ENDPOINT), DEFAULT_STS_ENDPOINT);

        req.region = Some("cn-shanghai".into());
        assert_eq!(req.sts_endpoint(DEFAULT_STS_ENDPOINT), "sts.cn-shanghai.aliyuncs.com");

        req.endpoint = Some("http://127.0.0.1:9000".into());
        assert_eq!(req.sts_endpoint(DEFAULT_STS_ENDPOINT), "http://127.0.0.1:9000");
    }
}
