//! Request extractors whose rejections use the API error envelope.
//!
//! Axum's own `Json` extractor answers bad bodies with a plain-text 400/422.
//! [`JsonBody`] wraps it and converts the rejection into
//! [`AppError::InvalidJson`], so clients always get
//! `{"success": false, "error": "INVALID_JSON", ...}`.

use axum::extract::FromRequest;

use crate::error::AppError;

/// JSON request body.
///
/// ```rust,ignore
/// pub async fn handler(JsonBody(request): JsonBody<JobIdRequest>) -> AppResult<...>
/// ```
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum::response::IntoResponse;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct TokenBody {
        ttl_seconds: Option<u64>,
    }

    fn request(content_type: Option<&str>, body: &'static str) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn reject(req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let err = JsonBody::<TokenBody>::from_request(req, &()).await.unwrap_err();
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_valid_body_is_extracted() {
        let req = request(Some("application/json"), r#"{"ttlSeconds":5}"#);
        let JsonBody(body) = JsonBody::<TokenBody>::from_request(req, &()).await.unwrap();
        assert_eq!(body.ttl_seconds, Some(5));
    }

    #[tokio::test]
    async fn test_truncated_body_is_invalid_json() {
        let (status, body) = reject(request(Some("application/json"), r#"{"id": "#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "INVALID_JSON");
        assert_eq!(body["message"], "Malformed JSON in request body");
    }

    #[tokio::test]
    async fn test_wrong_type_does_not_leak_target_type() {
        let req = request(Some("application/json"), r#"{"ttlSeconds":"soon"}"#);
        let (status, body) = reject(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_JSON");
        assert_eq!(body["message"], "Invalid data type in request body");
    }

    #[tokio::test]
    async fn test_missing_content_type() {
        let (status, body) = reject(request(None, "{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_JSON");
        assert!(body["message"].as_str().unwrap().contains("application/json"));
    }
}
