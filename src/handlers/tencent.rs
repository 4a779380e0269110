//! Tencent Cloud handlers.
//!
//! # Endpoints
//!
//! - `POST /api/tencent/sign` - Compute TC3 headers without sending
//! - `POST /api/tencent/call` - Sign and send an arbitrary action
//! - `POST /api/tencent/parser/submit` - Start a document reconstruction task
//! - `POST /api/tencent/parser/result` - Fetch a reconstruction result
//!
//! The bearer token must carry Tencent Cloud credentials.

use axum::extract::State;
use axum::{Extension, Json};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::credentials::CredentialSet;
use crate::error::{AppError, AppResult};
use crate::extract::JsonBody;
use crate::models::{
    ApiResponse, SignedRequest, TencentCallRequest, TencentResultRequest, TencentSignRequest,
};
use crate::providers::tencent::{ReconstructTaskOptions, encode_payload};
use crate::state::AppState;
use crate::validation::{require, validate_action};

/// Sign a request the caller will send themselves.
///
/// # Request Body
///
/// ```json
/// { "action": "DescribeInstances", "payload": { "Limit": 1 }, "timestamp": 1551113065 }
/// ```
///
/// # Response Body
///
/// ```json
/// {
///   "success": true,
///   "data": {
///     "authorization": "TC3-HMAC-SHA256 Credential=...",
///     "timestamp": 1551113065,
///     "payload": "{\"Limit\":1}",
///     "headers": { "Authorization": "...", "X-TC-Action": "DescribeInstances", ... }
///   }
/// }
/// ```
///
/// `payload` is the exact body the signature covers; send it byte for byte.
#[instrument(skip(state, credentials, request))]
pub async fn sign(
    State(state): State<AppState>,
    Extension(credentials): Extension<CredentialSet>,
    JsonBody(request): JsonBody<TencentSignRequest>,
) -> AppResult<Json<ApiResponse<SignedRequest>>> {
    let action = request.action.unwrap_or_default();
    validate_action(&action)?;

    let body = encode_payload(&request.payload)?;
    let timestamp = request.timestamp.unwrap_or_else(|| Utc::now().timestamp());
    let headers = state.tencent.sign(&credentials, &action, &body, timestamp)?;

    let authorization = headers
        .iter()
        .find(|(name, _)| *name == "Authorization")
        .map(|(_, value)| value.clone())
        .ok_or_else(|| AppError::Internal("Authorization header was not produced".into()))?;
    let payload = String::from_utf8(body)
        .map_err(|e| AppError::Internal(format!("Encoded payload is not UTF-8: {e}")))?;

    debug!(action = %action, timestamp, "Request signed");
    Ok(Json(ApiResponse::ok(SignedRequest {
        authorization,
        timestamp,
        payload,
        headers: headers
            .into_iter()
            .map(|(name, value)| (name.to_string(), Value::String(value)))
            .collect(),
    })))
}

/// Sign and send an action, returning the unwrapped `Response` object.
#[instrument(skip(state, credentials, request))]
pub async fn call(
    State(state): State<AppState>,
    Extension(credentials): Extension<CredentialSet>,
    JsonBody(request): JsonBody<TencentCallRequest>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let action = request.action.unwrap_or_default();
    validate_action(&action)?;

    let data = state
        .tencent
        .call(&credentials, &action, &request.payload)
        .await?;
    Ok(Json(ApiResponse::ok(data)))
}

/// Start a `CreateReconstructDocumentFlow` task.
///
/// One of `fileUrl` or `fileBase64` is required; `fileType` defaults to `PDF`.
#[instrument(skip(state, credentials, options))]
pub async fn parser_submit(
    State(state): State<AppState>,
    Extension(credentials): Extension<CredentialSet>,
    JsonBody(options): JsonBody<ReconstructTaskOptions>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let data = state
        .tencent
        .create_reconstruct_task(&credentials, &options)
        .await?;
    Ok(Json(ApiResponse::ok(data)))
}

#[instrument(skip(state, credentials, request))]
pub async fn parser_result(
    State(state): State<AppState>,
    Extension(credentials): Extension<CredentialSet>,
    JsonBody(request): JsonBody<TencentResultRequest>,
) -> AppResult<Json<ApiResponse<Value>>> {
    require(&[("taskId", request.task_id.as_deref())])?;
    let task_id = request.task_id.unwrap_or_default();

    let data = state
        .tencent
        .reconstruct_result(&credentials, &task_id)
        .await?;
    Ok(Json(ApiResponse::ok(data)))
}
