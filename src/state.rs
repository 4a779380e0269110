//! Shared application state for Axum handlers.
//!
//! Everything in here is built once at startup and is read-only afterwards:
//!
//! - **Configuration**: the immutable [`Config`]
//! - **Token codec**: signing key and default TTL for bearer tokens
//! - **Resolver**: token verification plus the optional default credential chain
//! - **Provider clients**: STS, DocMind and Tencent Cloud over one connection pool
//!
//! # Cancellation
//!
//! Long-running handlers (job waits) take a child of the state's
//! `CancellationToken` from [`AppState::poll_token`]. [`AppState::shutdown`]
//! cancels the parent, so in-flight waits end with `Cancelled` instead of
//! holding the server open until their deadline. Background tasks (the auth
//! failure pruner) use [`AppState::background_token`] the same way.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::credentials::{CredentialResolver, DefaultCredentialChain};
use crate::error::AppResult;
use crate::poller::PollOptions;
use crate::providers::aliyun::{DocMindClient, RpcClient, StsClient};
use crate::providers::build_http_client;
use crate::providers::tencent::TencentClient;
use crate::token::TokenCodec;

/// Shared application state for Axum handlers.
///
/// Cloned for each request; all internal data is behind `Arc` or is itself a
/// cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Timestamp when the application started
    pub started_at: Instant,
    pub codec: Arc<TokenCodec>,
    pub resolver: CredentialResolver,
    pub sts: StsClient,
    pub docmind: DocMindClient,
    pub tencent: TencentClient,
    /// Parent of every per-request poll token
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Build state from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the outbound HTTP client cannot be
    /// built or the default credential chain cannot be loaded.
    pub fn new(config: Config) -> AppResult<Self> {
        let http = build_http_client(config.upstream_timeout)?;

        let codec = Arc::new(match &config.token_secret {
            Some(secret) => TokenCodec::new(secret, config.token_ttl),
            None => {
                warn!(
                    "TOKEN_SECRET not set; using a random per-process key. \
                     Issued tokens will not survive a restart"
                );
                TokenCodec::ephemeral(config.token_ttl)
            }
        });

        let default_chain = if config.allow_default_credentials {
            let chain = DefaultCredentialChain::from_config(&config, http.clone())?;
            info!(sources = chain.len(), "Default credential chain enabled");
            Some(chain)
        } else {
            info!("Default credential chain disabled (ALLOW_DEFAULT_CREDENTIALS=false)");
            None
        };

        let rpc = RpcClient::new(http.clone());

        Ok(Self {
            resolver: CredentialResolver::new(codec.clone(), default_chain),
            sts: StsClient::new(rpc.clone(), config.sts_endpoint.clone()),
            docmind: DocMindClient::new(rpc, config.docmind_endpoint.clone()),
            tencent: TencentClient::from_config(http, &config),
            codec,
            config: Arc::new(config),
            started_at: Instant::now(),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Configured poll cadence, before per-call overrides.
    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            interval: self.config.poll_interval,
            max_wait: self.config.poll_max_wait,
        }
    }

    /// Token for one job wait; cancelled on shutdown.
    pub fn poll_token(&self) -> CancellationToken {
        self.cancellation_token.child_token()
    }

    /// Token for a background task; cancelled on shutdown.
    pub fn background_token(&self) -> CancellationToken {
        self.cancellation_token.child_token()
    }

    /// Stop all in-flight job waits and background tasks.
    pub fn shutdown(&self) {
        info!("Cancelling in-flight job waits and background tasks");
        self.cancellation_token.cancel();
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_state_from_default_config() {
        let state = AppState::new(Config::default()).unwrap();
        assert!(!state.resolver.default_chain_enabled());
        assert_eq!(state.poll_options(), PollOptions::default());
    }

    #[test]
    fn test_shutdown_cancels_poll_tokens() {
        let state = AppState::new(Config::default()).unwrap();
        let token = state.poll_token();
        assert!(!token.is_cancelled());

        state.shutdown();
        assert!(token.is_cancelled());
        assert!(state.poll_token().is_cancelled());
        assert!(state.background_token().is_cancelled());
    }

    #[test]
    fn test_poll_options_follow_config() {
        let config = Config {
            poll_interval: Duration::from_millis(5),
            poll_max_wait: Duration::from_millis(50),
            ..Config::default()
        };
        let state = AppState::new(config).unwrap();
        assert_eq!(state.poll_options().interval, Duration::from_millis(5));
    }
}
