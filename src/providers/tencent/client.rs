use std::time::Instant;

use chrono::Utc;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use super::signer::{SigningInput, signed_headers};
use crate::config::Config;
use crate::credentials::{CredentialSet, Provider};
use crate::error::{AppError, AppResult, ProviderError};
use crate::providers::{endpoint_host, endpoint_url};

const DEFAULT_ERROR_CODE: &str = "TencentCloudError";

/// Options for `CreateReconstructDocumentFlow`.
///
/// Exactly one of `file_url` / `file_base64` is sent; the URL wins when both
/// are given.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructTaskOptions {
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_base64: Option<String>,
    #[serde(default)]
    pub file_start_page_number: Option<u32>,
    #[serde(default)]
    pub file_end_page_number: Option<u32>,
    #[serde(default)]
    pub config: Option<Value>,
}

impl ReconstructTaskOptions {
    fn payload(&self) -> AppResult<Value> {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());

        let mut payload = Map::new();
        payload.insert(
            "FileType".into(),
            Value::String(non_empty(&self.file_type).unwrap_or_else(|| "PDF".to_string())),
        );
        match (non_empty(&self.file_url), non_empty(&self.file_base64)) {
            (Some(url), _) => {
                payload.insert("FileUrl".into(), Value::String(url));
            }
            (None, Some(data)) => {
                payload.insert("FileBase64".into(), Value::String(data));
            }
            (None, None) => return Err(AppError::MissingParams("fileUrl or fileBase64".into())),
        }
        if let Some(n) = self.file_start_page_number {
            payload.insert("FileStartPageNumber".into(), json!(n));
        }
        if let Some(n) = self.file_end_page_number {
            payload.insert("FileEndPageNumber".into(), json!(n));
        }
        if let Some(config) = &self.config {
            payload.insert("Config".into(), config.clone());
        }
        Ok(Value::Object(payload))
    }
}

/// Signed JSON calls against one Tencent Cloud service.
#[derive(Debug, Clone)]
pub struct TencentClient {
    http: reqwest::Client,
    endpoint: String,
    service: String,
    version: String,
    region: String,
}

impl TencentClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        service: impl Into<String>,
        version: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            service: service.into(),
            version: version.into(),
            region: region.into(),
        }
    }

    pub fn from_config(http: reqwest::Client, config: &Config) -> Self {
        Self::new(
            http,
            config.tencent_endpoint.as_str(),
            config.tencent_service.as_str(),
            config.tencent_version.as_str(),
            config.tencent_region.as_str(),
        )
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Region and endpoint for a call: the credential's own, else the client's.
    fn target<'a>(&'a self, credentials: &'a CredentialSet) -> AppResult<(&'a str, &'a str)> {
        if credentials.provider != Provider::Tencent {
            return Err(AppError::BadRequest(
                "Token does not carry Tencent Cloud credentials".to_string(),
            ));
        }
        Ok((
            credentials.region_or(&self.region),
            credentials.endpoint_or(&self.endpoint),
        ))
    }

    /// Headers for one signed call, without sending it.
    pub fn sign(
        &self,
        credentials: &CredentialSet,
        action: &str,
        payload: &[u8],
        timestamp: i64,
    ) -> AppResult<Vec<(&'static str, String)>> {
        let (region, endpoint) = self.target(credentials)?;
        let input = SigningInput {
            secret_id: &credentials.access_key_id,
            secret_key: credentials.access_key_secret.expose_secret(),
            service: &self.service,
            action,
            region,
            host: endpoint_host(endpoint),
            payload,
            timestamp,
        };
        signed_headers(
            &input,
            &self.version,
            credentials.session_token.as_ref().map(|t| t.expose_secret()),
        )
    }

    /// Send a signed call and return the `Response` object.
    ///
    /// # Errors
    ///
    /// - `Provider` when the body carries `Response.Error`, with its code,
    ///   message and `RequestId`
    /// - `Upstream` when the endpoint cannot be reached
    /// - `BadRequest` for credentials that are not Tencent Cloud's
    #[instrument(skip(self, credentials, payload), fields(service = %self.service))]
    pub async fn call(
        &self,
        credentials: &CredentialSet,
        action: &str,
        payload: &Value,
    ) -> AppResult<Value> {
        let (_, endpoint) = self.target(credentials)?;
        let body = encode_payload(payload)?;
        let headers = self.sign(credentials, action, &body, Utc::now().timestamp())?;

        let mut request = self.http.post(format!("{}/", endpoint_url(endpoint)));
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let started = Instant::now();
        let response = request.body(body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        crate::metrics::record_upstream_duration("tencent", action, started.elapsed().as_secs_f64());
        debug!(status = status.as_u16(), "Tencent Cloud response received");

        let parsed: Value = serde_json::from_slice(&bytes).map_err(|_| {
            ProviderError::new(DEFAULT_ERROR_CODE, "Provider returned a non-JSON body")
                .with_status(status.as_u16())
        })?;
        let http_status = (!status.is_success()).then_some(status.as_u16());
        parse_response(parsed, http_status)
    }

    #[instrument(skip(self, credentials, options))]
    pub async fn create_reconstruct_task(
        &self,
        credentials: &CredentialSet,
        options: &ReconstructTaskOptions,
    ) -> AppResult<Value> {
        let payload = options.payload()?;
        self.call(credentials, "CreateReconstructDocumentFlow", &payload)
            .await
    }

    #[instrument(skip(self, credentials))]
    pub async fn reconstruct_result(
        &self,
        credentials: &CredentialSet,
        task_id: &str,
    ) -> AppResult<Value> {
        self.call(
            credentials,
            "GetReconstructDocumentResult",
            &json!({ "TaskId": task_id }),
        )
        .await
    }
}

/// Request body bytes; a missing payload is sent as `{}`.
pub fn encode_payload(payload: &Value) -> AppResult<Vec<u8>> {
    match payload {
        Value::Null => Ok(b"{}".to_vec()),
        other => Ok(serde_json::to_vec(other)?),
    }
}

/// Unwrap the `{"Response": {...}}` envelope.
fn parse_response(body: Value, http_status: Option<u16>) -> AppResult<Value> {
    let Some(Value::Object(mut response)) = body.get("Response").cloned() else {
        let error = ProviderError::new(DEFAULT_ERROR_CODE, "Response envelope is missing");
        return Err(match http_status {
            Some(status) => error.with_status(status),
            None => error,
        }
        .into());
    };

    if let Some(error) = response.remove("Error") {
        let field = |key: &str| error.get(key).and_then(Value::as_str).map(str::to_string);
        let request_id = response
            .get("RequestId")
            .and_then(Value::as_str)
            .map(str::to_string);
        let error = ProviderError::new(
            field("Code").unwrap_or_else(|| DEFAULT_ERROR_CODE.to_string()),
            field("Message").unwrap_or_else(|| "Provider returned an error".to_string()),
        )
        .with_request_id(request_id);
        return Err(match http_status {
            Some(status) => error.with_status(status),
            None => error,
        }
        .into());
    }

    Ok(Value::Object(response))
}
