//! Per-request context: correlation ID and request timing.
//!
//! - Propagates a client-supplied `X-Request-Id`, or generates a UUIDv4
//! - Echoes the ID on the response
//! - Records `gateway_request_duration_seconds` by path, method and status
//!
//! ```bash
//! curl -H "X-Request-Id: my-correlation-id" http://localhost:3000/health
//! ```

use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::header::HeaderValue;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::{Span, debug};
use uuid::Uuid;

use crate::metrics::record_request_duration;

/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client-supplied ID that is propagated; longer ones are replaced.
const MAX_REQUEST_ID_LEN: usize = 128;

#[derive(Clone, Default)]
pub struct RequestContextLayer;

impl RequestContextLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestContextLayer {
    type Service = RequestContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestContextService { inner }
    }
}

#[derive(Clone)]
pub struct RequestContextService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestContextService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let request_id = request_id_header(&req);
        req.headers_mut()
            .insert(REQUEST_ID_HEADER, request_id.clone());

        if let Ok(id) = request_id.to_str() {
            Span::current().record("request_id", id);
            debug!(request_id = %id, "Processing request");
        }

        let path = req.uri().path().to_string();
        let method = req.method().to_string();
        let started = Instant::now();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut response = inner.call(req).await?;

            record_request_duration(
                &path,
                &method,
                response.status().as_str(),
                started.elapsed().as_secs_f64(),
            );
            response.headers_mut().insert(REQUEST_ID_HEADER, request_id);

            Ok(response)
        })
    }
}

/// Reuse a sane client-supplied request ID or generate a new one.
fn request_id_header<B>(req: &Request<B>) -> HeaderValue {
    if let Some(value) = req.headers().get(REQUEST_ID_HEADER)
        && !value.is_empty()
        && value.len() <= MAX_REQUEST_ID_LEN
        && value.to_str().is_ok()
    {
        return value.clone();
    }

    // A hyphenated UUID is always a valid header value
    HeaderValue::from_str(&Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::ServiceExt;

    #[test]
    fn test_existing_request_id_is_kept() {
        let req = Request::builder()
            .header("x-request-id", "existing-id-123")
            .body(Body::empty())
            .unwrap();

        assert_eq!(request_id_header(&req), "existing-id-123");
    }

    #[test]
    fn test_missing_request_id_is_generated() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let id = request_id_header(&req);
        assert!(Uuid::parse_str(id.to_str().unwrap()).is_ok());
    }

    #[test]
    fn test_oversized_request_id_is_replaced() {
        let long = "x".repeat(MAX_REQUEST_ID_LEN + 1);
        let req = Request::builder()
            .header("x-request-id", long.as_str())
            .body(Body::empty())
            .unwrap();

        let id = request_id_header(&req);
        assert!(Uuid::parse_str(id.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_request_id_is_echoed_on_response() {
        let svc = RequestContextLayer::new().layer(tower::service_fn(
            |req: Request<Body>| async move {
                // Handlers see the header too
                assert!(req.headers().contains_key(REQUEST_ID_HEADER));
                Ok::<_, Infallible>(Response::new(Body::empty()))
            },
        ));

        let resp = svc
            .oneshot(
                Request::builder()
                    .header("x-request-id", "abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.headers().get(REQUEST_ID_HEADER).unwrap(), "abc");
    }
}
