//! Credential exchange endpoints.
//!
//! # Endpoints
//!
//! - `POST /api/auth/token` - Wrap caller credentials in a signed bearer token
//! - `POST /api/auth/sts` - Assume a RAM role and return delegated credentials
//!
//! Neither endpoint needs a bearer token; both sit behind the IP allow-list.

use std::time::Duration;

use axum::Json;
use axum::extract::State;
use chrono::{SecondsFormat, Utc};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, instrument};

use crate::credentials::Provider;
use crate::error::{AppError, AppResult};
use crate::extract::JsonBody;
use crate::models::{
    ApiResponse, AssumeRoleBody, AssumeRoleResponse, DelegatedCredentials, IssueTokenRequest,
};
use crate::providers::aliyun::AssumeRoleRequest;
use crate::state::AppState;
use crate::token::{IssuedToken, encode_blob};
use crate::validation::{require, validate_role_session_name};

/// Issue a signed bearer token.
///
/// Alibaba Cloud credentials without a region or endpoint get the configured
/// defaults stamped in, so the token is self-contained.
///
/// # Request Body
///
/// ```json
/// {
///   "accessKeyId": "LTAI...",
///   "accessKeySecret": "...",
///   "regionId": "cn-hangzhou",
///   "ttlSeconds": 3600
/// }
/// ```
///
/// Tencent Cloud callers send `secretId`/`secretKey` instead.
#[instrument(skip(state, request))]
pub async fn issue_token(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<IssueTokenRequest>,
) -> AppResult<Json<ApiResponse<IssuedToken>>> {
    let credentials = request.credentials.into_credentials().map_err(|_| {
        AppError::MissingParams("accessKeyId, accessKeySecret (or secretId, secretKey)".into())
    })?;

    let credentials = match credentials.provider {
        Provider::Aliyun => {
            credentials.fill_defaults(&state.config.aliyun_region, &state.config.docmind_endpoint)
        }
        Provider::Tencent => credentials,
    };

    let ttl = request
        .ttl_seconds
        .map_or(state.codec.default_ttl(), Duration::from_secs);
    let issued = state
        .codec
        .issue_at(&credentials, ttl, Utc::now().timestamp())?;

    info!(
        provider = credentials.provider.as_str(),
        expires_in = issued.expires_in,
        "Bearer token issued"
    );
    Ok(Json(ApiResponse::ok(issued)))
}

/// Assume a RAM role and return the delegated credentials.
///
/// The returned `token` is an unsigned base64 blob of the delegated
/// credentials; it is accepted as a bearer token until the provider's
/// `expiration`.
///
/// # Request Body
///
/// ```json
/// {
///   "accessKeyId": "LTAI...",
///   "accessKeySecret": "...",
///   "roleArn": "acs:ram::123456789012:role/docmind",
///   "roleSessionName": "gateway",
///   "durationSeconds": 3600
/// }
/// ```
#[instrument(skip(state, body))]
pub async fn assume_role(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<AssumeRoleBody>,
) -> AppResult<Json<ApiResponse<AssumeRoleResponse>>> {
    require(&[
        ("accessKeyId", body.access_key_id.as_deref()),
        ("accessKeySecret", body.access_key_secret.as_deref()),
        ("roleArn", body.role_arn.as_deref()),
        ("roleSessionName", body.role_session_name.as_deref()),
    ])?;
    let role_session_name = body.role_session_name.unwrap_or_default();
    validate_role_session_name(&role_session_name)?;

    let request = AssumeRoleRequest {
        access_key_id: body.access_key_id.unwrap_or_default(),
        access_key_secret: SecretString::from(body.access_key_secret.unwrap_or_default()),
        role_arn: body.role_arn.unwrap_or_default(),
        role_session_name,
        duration_seconds: body.duration_seconds,
        region: body.region_id.clone(),
        endpoint: body.endpoint,
    };
    let assumed = state.sts.assume_role(&request).await?;

    let region = body
        .region_id
        .unwrap_or_else(|| state.config.aliyun_region.clone());
    let endpoint = body
        .docmind_endpoint
        .unwrap_or_else(|| state.config.docmind_endpoint.clone());
    let credentials = assumed
        .credentials
        .with_region(region.as_str())
        .with_endpoint(endpoint.as_str());

    let token = encode_blob(&credentials, Some(assumed.expiration))?;
    let expires_at = assumed
        .expiration
        .to_rfc3339_opts(SecondsFormat::Secs, true);

    Ok(Json(ApiResponse::ok(AssumeRoleResponse {
        token,
        credentials: DelegatedCredentials {
            access_key_id: credentials.access_key_id.clone(),
            access_key_secret: credentials.access_key_secret.expose_secret().to_string(),
            security_token: credentials
                .session_token
                .as_ref()
                .map(|t| t.expose_secret().to_string())
                .unwrap_or_default(),
            expiration: expires_at.clone(),
            region_id: region,
            endpoint,
        },
        expires_at,
        expires_at_ts: assumed.expiration.timestamp_millis(),
        server_time_ts: Utc::now().timestamp_millis(),
    })))
}
