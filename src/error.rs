use std::fmt;

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Why the IP allow-list turned a request away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionReason {
    /// No client address could be determined from headers or the socket.
    IpNotDetected,
    /// The client address matched no allow-list entry.
    IpNotAllowed,
}

impl AdmissionReason {
    /// Wire code returned in the `error` field of the 403 body.
    pub fn code(self) -> &'static str {
        match self {
            AdmissionReason::IpNotDetected => "IP_NOT_DETECTED",
            AdmissionReason::IpNotAllowed => "IP_NOT_ALLOWED",
        }
    }
}

impl fmt::Display for AdmissionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Diagnostic fields reported by a cloud provider on a failed call.
///
/// `code`, `message` and `request_id` are passed through verbatim so operators
/// can correlate them with the provider's own logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ProviderError {
    /// HTTP status returned by the provider, when one was received.
    pub status: Option<u16>,
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: code.into(),
            message: message.into(),
            request_id: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }
}

/// Application-wide error types with appropriate HTTP status codes.
///
/// # Authentication Failures
///
/// Every token-related failure has its own variant so the boundary can report
/// the precise reason (`reason` field of the 401 body) instead of a generic
/// rejection:
///
/// - `MissingHeader` / `InvalidScheme` - the `Authorization` header itself is wrong
/// - `MalformedToken` - the bearer value cannot be decoded
/// - `Expired` / `InvalidSignature` - the token decoded but failed verification
/// - `NoCredentials` - nothing was presented and the default chain is off or empty
///
/// No variant ever carries key material in its message.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Request denied by IP allow-list: {0}")]
    AdmissionDenied(AdmissionReason),

    #[error("Missing Authorization header")]
    MissingHeader,

    #[error("Authorization header must be `Bearer <token>`")]
    InvalidScheme,

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Token has expired")]
    Expired,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("No credentials available for this request")]
    NoCredentials,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Invalid signing input: {0}")]
    InvalidSigningInput(String),

    #[error("Timed out waiting for job {job_id}")]
    Timeout { job_id: String },

    #[error("Stopped waiting for job {job_id}")]
    Cancelled { job_id: String },

    #[error("Missing required parameters: {0}")]
    MissingParams(String),

    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Machine-readable reason for a 401, or `None` for any other error.
    pub fn auth_reason(&self) -> Option<&'static str> {
        match self {
            AppError::MissingHeader => Some("missing_header"),
            AppError::InvalidScheme => Some("invalid_scheme"),
            AppError::MalformedToken(_) => Some("malformed_token"),
            AppError::Expired => Some("expired"),
            AppError::InvalidSignature => Some("invalid_signature"),
            AppError::NoCredentials => Some("no_credentials"),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest errors may embed the full URL; keep only the kind
        let kind = if e.is_timeout() {
            "request timed out"
        } else if e.is_connect() {
            "connection failed"
        } else if e.is_decode() {
            "response could not be decoded"
        } else {
            "request failed"
        };
        AppError::Upstream(kind.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::MissingJsonContentType(_) => AppError::InvalidJson(
                "Expected request with `Content-Type: application/json`".to_string(),
            ),
            JsonRejection::JsonSyntaxError(_) => {
                AppError::InvalidJson("Malformed JSON in request body".to_string())
            }
            rejection if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                AppError::PayloadTooLarge
            }
            rejection => AppError::InvalidJson(sanitize_serde_message(&rejection.body_text())),
        }
    }
}

/// Error response body for API endpoints.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    success: bool,
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

impl ErrorResponse {
    fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.to_string(),
            message: message.into(),
            reason: None,
            code: None,
            request_id: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full error server-side; clients only see sanitized messages
        match &self {
            AppError::Provider(_)
            | AppError::Upstream(_)
            | AppError::Internal(_)
            | AppError::SerializationError(_)
            | AppError::ConfigError(_) => tracing::error!(error = %self, "Request failed"),
            _ => tracing::warn!(error = %self, "Request rejected"),
        }

        if let Some(reason) = self.auth_reason() {
            let message = match &self {
                AppError::MalformedToken(detail) => format!("Malformed token: {detail}"),
                other => other.to_string(),
            };
            let body = ErrorResponse {
                reason: Some(reason),
                ..ErrorResponse::new("AUTH_FAILED", message)
            };
            return (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                axum::Json(body),
            )
                .into_response();
        }

        let (status, body) = match self {
            AppError::AdmissionDenied(reason) => (
                StatusCode::FORBIDDEN,
                ErrorResponse::new(
                    reason.code(),
                    match reason {
                        AdmissionReason::IpNotDetected => "Unable to determine client IP address",
                        AdmissionReason::IpNotAllowed => "Client IP address is not allowed",
                    },
                ),
            ),
            AppError::Provider(e) => {
                let status = e
                    .status
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (
                    status,
                    ErrorResponse {
                        code: Some(e.code),
                        request_id: e.request_id,
                        ..ErrorResponse::new("PROVIDER_ERROR", e.message)
                    },
                )
            }
            AppError::Upstream(_) => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse::new(
                    "UPSTREAM_UNAVAILABLE",
                    "Cloud provider could not be reached. Please try again.",
                ),
            ),
            AppError::InvalidSigningInput(detail) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("INVALID_SIGNING_INPUT", detail),
            ),
            AppError::Timeout { job_id } => (
                StatusCode::GATEWAY_TIMEOUT,
                ErrorResponse::new("TIMEOUT", format!("Timed out waiting for job {job_id}")),
            ),
            AppError::Cancelled { job_id } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new(
                    "CANCELLED",
                    format!("Stopped waiting for job {job_id}: server is shutting down"),
                ),
            ),
            AppError::MissingParams(fields) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("MISSING_PARAMS", format!("Required: {fields}")),
            ),
            AppError::InvalidJson(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("INVALID_JSON", msg),
            ),
            AppError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorResponse::new("PAYLOAD_TOO_LARGE", "Request body exceeds the size limit"),
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("BAD_REQUEST", msg),
            ),
            AppError::Internal(_) | AppError::SerializationError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(
                    "INTERNAL_ERROR",
                    "An internal error occurred. Please contact support if the issue persists.",
                ),
            ),
            AppError::ConfigError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(
                    "CONFIG_ERROR",
                    "Service configuration error. Please contact support.",
                ),
            ),
            // Covered by the auth_reason() branch above
            AppError::MissingHeader
            | AppError::InvalidScheme
            | AppError::MalformedToken(_)
            | AppError::Expired
            | AppError::InvalidSignature
            | AppError::NoCredentials => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new("AUTH_FAILED", "Authentication failed"),
            ),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Sanitize serde error messages to avoid leaking internal type information.
fn sanitize_serde_message(msg: &str) -> String {
    if msg.contains("missing field")
        && let Some(start) = msg.find('`')
        && let Some(end) = msg[start + 1..].find('`')
    {
        let field = &msg[start + 1..start + 1 + end];
        return format!("Missing required field: {field}");
    }

    if msg.contains("invalid type") {
        return "Invalid data type in request body".to_string();
    }

    if msg.contains("EOF while parsing") || msg.contains("expected") {
        return "Malformed JSON in request body".to_string();
    }

    "Invalid request format".to_string()
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
