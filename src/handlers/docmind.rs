//! DocMind job handlers.
//!
//! # Endpoints
//!
//! - `POST /api/submit/url` - Submit a document structure job
//! - `POST /api/result` - Fetch a structure job once
//! - `POST /api/wait` - Wait for a structure job to complete
//! - `POST /api/parser/submit/url` - Submit a document parser job
//! - `POST /api/parser/status` - Fetch a parser job's status once
//! - `POST /api/parser/result` - Fetch a parser job's result
//! - `POST /api/jobs/wait` - Wait for either kind of job
//!
//! All routes require a bearer token (or the default credential chain). The
//! provider's JSON is returned untouched under `data`.

use axum::extract::State;
use axum::{Extension, Json};
use serde_json::Value;
use tracing::instrument;

use crate::credentials::CredentialSet;
use crate::error::AppResult;
use crate::extract::JsonBody;
use crate::models::{
    ApiResponse, JobIdRequest, JobKind, ParserResultRequest, SubmitParserRequest,
    SubmitUrlRequest, WaitRequest,
};
use crate::poller::{JobStatus, wait_for};
use crate::state::AppState;
use crate::validation::{require, validate_job_id};

fn job_id(id: Option<String>) -> AppResult<String> {
    let id = id.unwrap_or_default();
    validate_job_id(&id)?;
    Ok(id)
}

/// Submit a structure job for a document reachable by URL.
///
/// # Request Body
///
/// ```json
/// { "fileUrl": "https://example.com/report.pdf", "fileName": "report.pdf" }
/// ```
#[instrument(skip(state, credentials, request))]
pub async fn submit_url(
    State(state): State<AppState>,
    Extension(credentials): Extension<CredentialSet>,
    JsonBody(request): JsonBody<SubmitUrlRequest>,
) -> AppResult<Json<ApiResponse<Value>>> {
    require(&[
        ("fileUrl", request.file_url.as_deref()),
        ("fileName", request.file_name.as_deref()),
    ])?;

    let data = state
        .docmind
        .submit_structure_job(
            &credentials,
            request.file_url.as_deref().unwrap_or_default(),
            request.file_name.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(ApiResponse::ok(data)))
}

#[instrument(skip(state, credentials, request))]
pub async fn structure_result(
    State(state): State<AppState>,
    Extension(credentials): Extension<CredentialSet>,
    JsonBody(request): JsonBody<JobIdRequest>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let id = job_id(request.id)?;
    let data = state.docmind.structure_result(&credentials, &id).await?;
    Ok(Json(ApiResponse::ok(data)))
}

/// Submit a parser job for a document reachable by URL.
///
/// Optional knobs (`formulaEnhancement`, `llmEnhancement`, `pageIndex`, ...)
/// are forwarded as-is.
#[instrument(skip(state, credentials, request))]
pub async fn submit_parser_url(
    State(state): State<AppState>,
    Extension(credentials): Extension<CredentialSet>,
    JsonBody(request): JsonBody<SubmitParserRequest>,
) -> AppResult<Json<ApiResponse<Value>>> {
    require(&[
        ("fileUrl", request.file_url.as_deref()),
        ("fileName", request.file_name.as_deref()),
    ])?;

    let data = state
        .docmind
        .submit_parser_job(
            &credentials,
            request.file_url.as_deref().unwrap_or_default(),
            request.file_name.as_deref().unwrap_or_default(),
            &request.options(),
        )
        .await?;
    Ok(Json(ApiResponse::ok(data)))
}

#[instrument(skip(state, credentials, request))]
pub async fn parser_status(
    State(state): State<AppState>,
    Extension(credentials): Extension<CredentialSet>,
    JsonBody(request): JsonBody<JobIdRequest>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let id = job_id(request.id)?;
    let status = state.docmind.parser_status(&credentials, &id).await?;
    Ok(Json(ApiResponse::ok(status.body)))
}

#[instrument(skip(state, credentials, request))]
pub async fn parser_result(
    State(state): State<AppState>,
    Extension(credentials): Extension<CredentialSet>,
    JsonBody(request): JsonBody<ParserResultRequest>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let id = job_id(request.id)?;
    let data = state
        .docmind
        .parser_result(
            &credentials,
            &id,
            request.layout_step_size,
            request.layout_num,
        )
        .await?;
    Ok(Json(ApiResponse::ok(data)))
}

/// Poll a job until it completes, times out or the server shuts down.
async fn wait(
    state: &AppState,
    credentials: &CredentialSet,
    request: WaitRequest,
) -> AppResult<JobStatus> {
    let id = job_id(request.id)?;
    let options = state
        .poll_options()
        .with_overrides(request.interval_ms, request.max_wait_ms);
    let cancel = state.poll_token();

    match request.kind {
        JobKind::Structure => {
            wait_for(
                &id,
                || state.docmind.structure_status(credentials, &id),
                options,
                &cancel,
            )
            .await
        }
        JobKind::Parser => {
            wait_for(
                &id,
                || state.docmind.parser_status(credentials, &id),
                options,
                &cancel,
            )
            .await
        }
    }
}

/// Wait for a structure job and return the final provider body.
///
/// # Request Body
///
/// ```json
/// { "id": "docmind-...", "intervalMs": 2000, "maxWaitMs": 120000 }
/// ```
///
/// Fails with 504 `TIMEOUT` once `maxWaitMs` passes.
#[instrument(skip(state, credentials, request))]
pub async fn wait_structure(
    State(state): State<AppState>,
    Extension(credentials): Extension<CredentialSet>,
    JsonBody(request): JsonBody<WaitRequest>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let request = WaitRequest {
        kind: JobKind::Structure,
        ..request
    };
    let status = wait(&state, &credentials, request).await?;
    Ok(Json(ApiResponse::ok(status.body)))
}

/// Wait for a structure or parser job and return its final status.
///
/// # Response Body
///
/// ```json
/// {
///   "success": true,
///   "data": { "jobId": "docmind-...", "completed": true, "body": { ... } }
/// }
/// ```
#[instrument(skip(state, credentials, request))]
pub async fn wait_job(
    State(state): State<AppState>,
    Extension(credentials): Extension<CredentialSet>,
    JsonBody(request): JsonBody<WaitRequest>,
) -> AppResult<Json<ApiResponse<JobStatus>>> {
    let status = wait(&state, &credentials, request).await?;
    Ok(Json(ApiResponse::ok(status)))
}
