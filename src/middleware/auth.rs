//! Bearer-token authentication middleware.
//!
//! Resolves the [`CredentialSet`] a request runs with and stores it in the
//! request extensions, where handlers pick it up with
//! `Extension<CredentialSet>`.
//!
//! ```bash
//! curl -H "Authorization: Bearer $TOKEN" -X POST http://localhost:3000/api/result -d '{"id":"..."}'
//! ```
//!
//! # Failure Reasons
//!
//! Every rejection is a 401 with a distinct `reason`:
//! `missing_header`, `invalid_scheme`, `malformed_token`, `expired`,
//! `invalid_signature`, `no_credentials`.
//!
//! Without an `Authorization` header the process default credential chain
//! is consulted, but only when `ALLOW_DEFAULT_CREDENTIALS` is on. A header
//! that is present but wrong never falls back.
//!
//! # Brute Force Protection
//!
//! Failures are counted per client IP. Once an IP exceeds the failure quota,
//! further failures are answered with 429 instead of 401 until the quota
//! refills. Successful requests are never throttled. Counters that have fully
//! refilled are dropped by [`BearerAuth::spawn_pruner`].

use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use axum::response::IntoResponse;
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};
use tracing::{debug, error};

use super::ip::client_key;
use crate::credentials::CredentialResolver;
use crate::error::{AppError, AppResult};
use crate::token::extract_bearer;

/// Maximum auth failures per IP per minute.
const AUTH_FAILURE_LIMIT: NonZeroU32 = NonZeroU32::new(10).unwrap();

/// Burst capacity for auth failures.
const AUTH_FAILURE_BURST: NonZeroU32 = NonZeroU32::new(5).unwrap();

/// How often refilled failure counters are dropped.
pub const FAILURE_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

type AuthFailureLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Bearer authentication layer.
///
/// Apply with `route_layer` so unmatched paths still produce 404s.
#[derive(Clone)]
pub struct BearerAuth {
    resolver: CredentialResolver,
    failure_limiter: Arc<AuthFailureLimiter>,
}

impl BearerAuth {
    pub fn new(resolver: CredentialResolver) -> Self {
        Self::with_quota(
            resolver,
            Quota::per_minute(AUTH_FAILURE_LIMIT).allow_burst(AUTH_FAILURE_BURST),
        )
    }

    fn with_quota(resolver: CredentialResolver, quota: Quota) -> Self {
        Self {
            resolver,
            failure_limiter: Arc::new(RateLimiter::keyed(quota)),
        }
    }

    /// Number of client addresses with a live failure counter.
    pub fn tracked_clients(&self) -> usize {
        self.failure_limiter.len()
    }

    /// Drop failure counters every `every` until `cancel` fires.
    ///
    /// Counter keys are client addresses taken from proxy headers, so the map
    /// would otherwise keep one entry per address ever seen. Returns `None`
    /// when called outside a Tokio runtime.
    pub fn spawn_pruner(
        &self,
        every: Duration,
        cancel: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let limiter = self.failure_limiter.clone();

        Some(runtime.spawn(async move {
            let mut ticker = interval(every);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Auth failure pruner received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => prune_failures(&limiter),
                }
            }
        }))
    }
}

/// Forget clients whose failure quota has fully refilled.
fn prune_failures(limiter: &AuthFailureLimiter) {
    let before = limiter.len();
    limiter.retain_recent();
    limiter.shrink_to_fit();
    let after = limiter.len();
    if after < before {
        debug!(before, after, "Pruned auth failure counters");
    }
}

impl<S> Layer<S> for BearerAuth {
    type Service = BearerAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthService {
            inner,
            resolver: self.resolver.clone(),
            failure_limiter: self.failure_limiter.clone(),
        }
    }
}

#[derive(Clone)]
pub struct BearerAuthService<S> {
    inner: S,
    resolver: CredentialResolver,
    failure_limiter: Arc<AuthFailureLimiter>,
}

impl<S> Service<Request<Body>> for BearerAuthService<S>
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
        let resolver = self.resolver.clone();
        let failure_limiter = self.failure_limiter.clone();
        let mut inner = self.inner.clone();

        let presented = presented_token(&req, resolver.default_chain_enabled());

        Box::pin(async move {
            let resolved = match presented {
                Ok(token) => resolver.resolve(token.as_deref()).await,
                Err(e) => Err(e),
            };

            match resolved {
                Ok(credentials) => {
                    debug!(
                        provider = credentials.provider.as_str(),
                        delegated = credentials.is_delegated(),
                        "Request authenticated"
                    );
                    req.extensions_mut().insert(credentials);
                    inner.call(req).await
                }
                Err(e) => {
                    let client_ip = client_key(&req).into_owned();
                    if let Err(not_until) = failure_limiter.check_key(&client_ip) {
                        let retry_after = not_until
                            .wait_time_from(DefaultClock::default().now())
                            .as_secs()
                            .max(1);
                        error!(
                            client_ip = %client_ip,
                            retry_after_secs = retry_after,
                            "IP blocked due to excessive auth failures"
                        );
                        return Ok(rate_limited_response(retry_after));
                    }

                    debug!(
                        client_ip = %client_ip,
                        path = %req.uri().path(),
                        reason = e.auth_reason().unwrap_or("error"),
                        "Authentication failed"
                    );
                    Ok(e.into_response())
                }
            }
        })
    }
}

/// Token presented with the request.
///
/// `Ok(None)` only when the header is absent and the default chain may be
/// used; otherwise the header must be a well-formed bearer value.
fn presented_token<B>(req: &Request<B>, default_chain_enabled: bool) -> AppResult<Option<String>> {
    let header = match req.headers().get(header::AUTHORIZATION) {
        None if default_chain_enabled => return Ok(None),
        None => None,
        Some(value) => Some(value.to_str().map_err(|_| AppError::InvalidScheme)?),
    };

    extract_bearer(header).map(|token| Some(token.to_string()))
}

fn rate_limited_response(retry_after: u64) -> Response<Body> {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            ("Retry-After", retry_after.to_string()),
            ("Content-Type", "application/json".to_string()),
        ],
        r#"{"success":false,"error":"TOO_MANY_REQUESTS","message":"Too many failed authentication attempts. Please wait before retrying."}"#.to_string(),
    )
        .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    use axum::http::HeaderValue;
    use secrecy::SecretString;
    use tower::ServiceExt;

    use crate::credentials::{CredentialSet, DefaultCredentialChain, EnvironmentProvider};
    use crate::token::TokenCodec;

    fn codec() -> Arc<TokenCodec> {
        Arc::new(TokenCodec::new(
            &SecretString::from("auth-middleware-secret".to_string()),
            Duration::from_secs(3600),
        ))
    }

    fn env_chain() -> DefaultCredentialChain {
        DefaultCredentialChain::new(
            vec![Box::new(EnvironmentProvider::from_values(
                Some("ENV_AK".into()),
                Some("ENV_SK".into()),
                None,
            ))],
            "cn-hangzhou",
            "docmind-api.cn-hangzhou.aliyuncs.com",
        )
    }

    /// Echoes the resolved access key id.
    async fn echo(req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let id = req
            .extensions()
            .get::<CredentialSet>()
            .map(|c| c.access_key_id.clone())
            .unwrap_or_default();
        Ok(Response::new(Body::from(id)))
    }

    async fn send(layer: &BearerAuth, auth: Option<&str>) -> Response<Body> {
        send_from(layer, "10.0.0.1", auth).await
    }

    async fn send_from(layer: &BearerAuth, ip: &str, auth: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder()
            .uri("/api/result")
            .header("x-real-ip", ip);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let svc = layer.layer(tower::service_fn(echo));
        svc.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn reason(resp: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        json["reason"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler() {
        let codec = codec();
        let token = codec.issue(&CredentialSet::aliyun("AK", "SK")).unwrap().token;
        let layer = BearerAuth::new(CredentialResolver::new(codec, None));

        let resp = send(&layer, Some(&format!("Bearer {token}"))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"AK");
    }

    #[tokio::test]
    async fn test_distinct_failure_reasons() {
        let layer = BearerAuth::new(CredentialResolver::new(codec(), None));

        let resp = send(&layer, None).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(header::WWW_AUTHENTICATE),
            Some(&HeaderValue::from_static("Bearer"))
        );
        assert_eq!(reason(resp).await, "missing_header");

        assert_eq!(
            reason(send(&layer, Some("Basic abc")).await).await,
            "invalid_scheme"
        );
        assert_eq!(
            reason(send(&layer, Some("Bearer !!!")).await).await,
            "malformed_token"
        );
    }

    #[tokio::test]
    async fn test_missing_header_uses_default_chain_when_enabled() {
        let layer = BearerAuth::new(CredentialResolver::new(codec(), Some(env_chain())));

        let resp = send(&layer, None).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_bad_header_never_falls_back_to_default_chain() {
        let layer = BearerAuth::new(CredentialResolver::new(codec(), Some(env_chain())));

        let resp = send(&layer, Some("Token abc")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(reason(resp).await, "invalid_scheme");
    }

    #[tokio::test]
    async fn test_repeated_failures_are_rate_limited() {
        let layer = BearerAuth::new(CredentialResolver::new(codec(), None));

        let mut statuses = Vec::new();
        for _ in 0..10 {
            statuses.push(send(&layer, Some("Bearer !!!")).await.status());
        }

        assert_eq!(statuses[0], StatusCode::UNAUTHORIZED);
        assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS));
    }

    /// Quota that refills within a few milliseconds.
    fn fast_refill(codec: Arc<TokenCodec>) -> BearerAuth {
        BearerAuth::with_quota(
            CredentialResolver::new(codec, None),
            Quota::with_period(Duration::from_millis(1))
                .unwrap()
                .allow_burst(NonZeroU32::new(5).unwrap()),
        )
    }

    #[tokio::test]
    async fn test_prune_drops_refilled_counters() {
        let layer = fast_refill(codec());
        for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            let resp = send_from(&layer, ip, Some("Bearer !!!")).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        }
        assert_eq!(layer.tracked_clients(), 3);

        tokio::time::sleep(Duration::from_millis(50)).await;
        prune_failures(&layer.failure_limiter);
        assert_eq!(layer.tracked_clients(), 0);
    }

    #[tokio::test]
    async fn test_pruner_runs_until_cancelled() {
        let layer = fast_refill(codec());
        for ip in ["10.0.1.1", "10.0.1.2"] {
            send_from(&layer, ip, Some("Basic abc")).await;
        }
        assert_eq!(layer.tracked_clients(), 2);

        let cancel = CancellationToken::new();
        let task = layer
            .spawn_pruner(Duration::from_millis(10), cancel.clone())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(layer.tracked_clients(), 0);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_pruner_needs_a_runtime() {
        let layer = BearerAuth::new(CredentialResolver::new(codec(), None));
        assert!(
            layer
                .spawn_pruner(FAILURE_PRUNE_INTERVAL, CancellationToken::new())
                .is_none()
        );
    }
}
