use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::credentials::CredentialPayload;
use crate::providers::aliyun::docmind::ParserJobOptions;

/// Success envelope shared by every JSON endpoint: `{"success": true, "data": ...}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
}

/// Request to issue a signed bearer token.
///
/// Carries either an Alibaba Cloud (`accessKeyId`/`accessKeySecret`) or a
/// Tencent Cloud (`secretId`/`secretKey`) pair, optionally temporary.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenRequest {
    #[serde(flatten)]
    pub credentials: CredentialPayload,
    /// Lifetime override; the configured TTL applies when absent.
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

/// Request to assume a RAM role through STS.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssumeRoleBody {
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub access_key_secret: Option<String>,
    #[serde(default)]
    pub role_arn: Option<String>,
    #[serde(default)]
    pub role_session_name: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    /// STS region; also stamped into the returned credentials.
    #[serde(default, alias = "region")]
    pub region_id: Option<String>,
    /// STS endpoint override.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// DocMind endpoint stamped into the returned credentials.
    #[serde(default)]
    pub docmind_endpoint: Option<String>,
}

/// Delegated credentials as handed back to the caller.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedCredentials {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub security_token: String,
    pub expiration: String,
    pub region_id: String,
    pub endpoint: String,
}

/// Response of `POST /api/auth/sts`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssumeRoleResponse {
    /// Unsigned base64 blob, usable as a bearer token until `expires_at`.
    pub token: String,
    pub credentials: DelegatedCredentials,
    pub expires_at: String,
    /// Milliseconds since the epoch.
    pub expires_at_ts: i64,
    /// Milliseconds since the epoch.
    pub server_time_ts: i64,
}

/// `POST /api/submit/url`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitUrlRequest {
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// `POST /api/parser/submit/url`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitParserRequest {
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub formula_enhancement: Option<bool>,
    #[serde(default)]
    pub llm_enhancement: Option<bool>,
    #[serde(default)]
    pub option: Option<String>,
    #[serde(default)]
    pub oss_bucket: Option<String>,
    #[serde(default)]
    pub oss_endpoint: Option<String>,
    #[serde(default)]
    pub page_index: Option<String>,
    #[serde(default)]
    pub output_html_table: Option<bool>,
    #[serde(default)]
    pub vl_parse_prompt: Option<String>,
}

impl SubmitParserRequest {
    pub fn options(&self) -> ParserJobOptions {
        ParserJobOptions {
            formula_enhancement: self.formula_enhancement,
            llm_enhancement: self.llm_enhancement,
            option: self.option.clone(),
            oss_bucket: self.oss_bucket.clone(),
            oss_endpoint: self.oss_endpoint.clone(),
            page_index: self.page_index.clone(),
            output_html_table: self.output_html_table,
            vl_parse_prompt: self.vl_parse_prompt.clone(),
        }
    }
}

/// Body of the single-job lookups (`/api/result`, `/api/parser/status`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobIdRequest {
    #[serde(default)]
    pub id: Option<String>,
}

/// `POST /api/parser/result`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserResultRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub layout_step_size: Option<u32>,
    #[serde(default)]
    pub layout_num: Option<u32>,
}

/// Which DocMind job family a wait targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    #[default]
    Structure,
    Parser,
}

/// `POST /api/jobs/wait` (and `/api/wait`, which always targets structure jobs).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub kind: JobKind,
    #[serde(default)]
    pub interval_ms: Option<u64>,
    #[serde(default)]
    pub max_wait_ms: Option<u64>,
}

/// `POST /api/tencent/call`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TencentCallRequest {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

/// `POST /api/tencent/sign`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TencentSignRequest {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub payload: Value,
    /// Unix seconds; the current time when absent.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Result of signing without sending.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedRequest {
    pub authorization: String,
    pub timestamp: i64,
    /// Exact body the signature covers.
    pub payload: String,
    pub headers: serde_json::Map<String, Value>,
}

/// `POST /api/tencent/parser/result`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TencentResultRequest {
    #[serde(default, alias = "id")]
    pub task_id: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_issue_token_request_flattens_credentials() {
        let request: IssueTokenRequest = serde_json::from_value(json!({
            "accessKeyId": "AK",
            "accessKeySecret": "SK",
            "regionId": "cn-shanghai",
            "ttlSeconds": 60
        }))
        .unwrap();

        assert_eq!(request.ttl_seconds, Some(60));
        let creds = request.credentials.into_credentials().unwrap();
        assert_eq!(creds.access_key_id, "AK");
        assert_eq!(creds.region.as_deref(), Some("cn-shanghai"));
    }

    #[test]
    fn test_wait_request_defaults_to_structure() {
        let request: WaitRequest = serde_json::from_value(json!({ "id": "job" })).unwrap();
        assert_eq!(request.kind, JobKind::Structure);
        assert!(request.interval_ms.is_none());

        let parser: WaitRequest =
            serde_json::from_value(json!({ "id": "job", "kind": "parser", "maxWaitMs": 10 }))
                .unwrap();
        assert_eq!(parser.kind, JobKind::Parser);
        assert_eq!(parser.max_wait_ms, Some(10));
    }

    #[test]
    fn test_tencent_call_payload_defaults_to_null() {
        let request: TencentCallRequest =
            serde_json::from_value(json!({ "action": "DescribeRegions" })).unwrap();
        assert!(request.payload.is_null());
    }

    #[test]
    fn test_success_envelope() {
        let body = serde_json::to_value(ApiResponse::ok(json!({ "a": 1 }))).unwrap();
        assert_eq!(body, json!({ "success": true, "data": { "a": 1 } }));
    }

    #[test]
    fn test_sts_response_is_camel_case() {
        let response = AssumeRoleResponse {
            token: "t".into(),
            credentials: DelegatedCredentials {
                access_key_id: "A".into(),
                access_key_secret: "B".into(),
                security_token: "C".into(),
                expiration: "2030-01-01T00:00:00Z".into(),
                region_id: "cn-hangzhou".into(),
                endpoint: "docmind-api.cn-hangzhou.aliyuncs.com".into(),
            },
            expires_at: "2030-01-01T00:00:00Z".into(),
            expires_at_ts: 1_893_456_000_000,
            server_time_ts: 1_700_000_000_000,
        };
        let body = serde_json::to_value(response).unwrap();
        assert_eq!(body["expiresAtTs"], 1_893_456_000_000_i64);
        assert_eq!(body["credentials"]["securityToken"], "C");
        assert_eq!(body["credentials"]["regionId"], "cn-hangzhou");
    }
}
