//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (applied in order)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │ Request Context  │ ← Adds X-Request-Id header, records duration
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │   IP Allow-List  │ ← 403 if not admitted (bypassed for /health)
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Cross-origin headers
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │   Bearer Auth    │ ← 401 if invalid (protected routes only)
//! └────────┬─────────┘
//!          │
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - `/health` - Liveness (no token)
//! - `/api/auth/*` - Token issuance and STS exchange (no token)
//! - `/api/submit/url`, `/api/result`, `/api/wait`, `/api/parser/*`,
//!   `/api/jobs/wait` - Alibaba Cloud DocMind
//! - `/api/tencent/*` - Tencent Cloud signing and calls

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers;
use crate::middleware::{
    AllowList, AllowListLayer, BearerAuth, FAILURE_PRUNE_INTERVAL, RequestContextLayer,
};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`; the
/// allow-list falls back to the peer address when no proxy header is present,
/// and rejects the request with `IP_NOT_DETECTED` if neither is available.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    let cors = build_cors_layer(&config.cors_allowed_origins);

    // =========================================================================
    // Protected Routes (bearer token or default chain)
    // =========================================================================
    if state.resolver.default_chain_enabled() {
        info!("Requests without a bearer token fall back to the default credential chain");
    }
    let bearer_auth = BearerAuth::new(state.resolver.clone());
    if bearer_auth
        .spawn_pruner(FAILURE_PRUNE_INTERVAL, state.background_token())
        .is_none()
    {
        warn!("No Tokio runtime; auth failure counters will not be pruned");
    }
    let protected = Router::new()
        // Alibaba Cloud DocMind
        .route("/api/submit/url", post(handlers::submit_url))
        .route("/api/result", post(handlers::structure_result))
        .route("/api/wait", post(handlers::wait_structure))
        .route("/api/parser/submit/url", post(handlers::submit_parser_url))
        .route("/api/parser/status", post(handlers::parser_status))
        .route("/api/parser/result", post(handlers::parser_result))
        .route("/api/jobs/wait", post(handlers::wait_job))
        // Tencent Cloud
        .route("/api/tencent/sign", post(handlers::tencent_sign))
        .route("/api/tencent/call", post(handlers::tencent_call))
        .route(
            "/api/tencent/parser/submit",
            post(handlers::tencent_parser_submit),
        )
        .route(
            "/api/tencent/parser/result",
            post(handlers::tencent_parser_result),
        )
        .route_layer(bearer_auth);

    // =========================================================================
    // Public Routes
    // =========================================================================
    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/auth/token", post(handlers::issue_token))
        .route("/api/auth/sts", post(handlers::assume_role))
        .merge(protected);

    // =========================================================================
    // Apply Middleware Stack (order matters - applied bottom to top)
    // =========================================================================

    // 1. Request body size limit (documents may be sent inline as base64)
    info!(
        max_size_mb = config.max_request_body_size / (1024 * 1024),
        "Request body size limit configured"
    );
    router = router.layer(DefaultBodyLimit::max(config.max_request_body_size));

    // 2. CORS
    router = router.layer(cors);

    // 3. Tracing
    router = router.layer(TraceLayer::new_for_http());

    // 4. IP allow-list
    router = router.layer(AllowListLayer::new(
        AllowList::parse(&config.allowed_ips),
        config.allowlist_bypass_paths.clone(),
    ));

    // 5. Request context - applied last, runs first so denials carry an ID
    router = router.layer(RequestContextLayer::new());

    router.with_state(state)
}

/// Build CORS layer from configuration.
///
/// # Arguments
///
/// * `allowed_origins` - List of allowed origins, or `["*"]` for any origin
///
/// # Security Note
///
/// Using `*` (any origin) is convenient for development but should be
/// avoided in production. Specify explicit origins instead.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::net::SocketAddr;

    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::middleware::REQUEST_ID_HEADER;

    fn router(allowed_ips: &[&str]) -> Router {
        let config = Config {
            allowed_ips: allowed_ips.iter().map(|s| s.to_string()).collect(),
            ..Config::default()
        };
        build_router(AppState::new(config).unwrap())
    }

    fn request(method: &str, uri: &str, peer: &str) -> Request<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let addr: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    #[test]
    fn test_build_cors_layer_any() {
        let origins = vec!["*".to_string()];
        let _layer = build_cors_layer(&origins);
    }

    #[test]
    fn test_build_cors_layer_specific() {
        let origins = vec![
            "https://example.com".to_string(),
            "https://app.example.com".to_string(),
        ];
        let _layer = build_cors_layer(&origins);
    }

    #[tokio::test]
    async fn test_health_bypasses_allow_list() {
        let response = router(&["10.0.0.1"])
            .oneshot(request("GET", "/health", "192.0.2.1:5000"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn test_unlisted_ip_is_forbidden() {
        let response = router(&["10.0.0.1"])
            .oneshot(request("POST", "/api/auth/token", "192.0.2.1:5000"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let response = router(&["127.0.0.1"])
            .oneshot(request("POST", "/api/result", "127.0.0.1:5000"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("www-authenticate"));
    }

    #[tokio::test]
    async fn test_public_route_does_not_require_token() {
        let response = router(&["127.0.0.1"])
            .oneshot(request("POST", "/api/auth/sts", "127.0.0.1:5000"))
            .await
            .unwrap();

        // Reaches the handler, which reports the missing fields
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
