//! # Credential Gateway
//!
//! A multi-provider credential broker and request-signing gateway with Axum,
//! featuring:
//!
//! - **Admission**: IP allow-list with CIDR support in front of every route
//! - **Credential exchange**: signed bearer tokens, STS role assumption and an
//!   optional process default credential chain
//! - **Signing**: Alibaba Cloud RPC (HMAC-SHA1) and Tencent Cloud TC3-HMAC-SHA256
//! - **Jobs**: DocMind submit/result/wait with cancellable deadline polling
//! - **Observability**: Request IDs, structured logging, Prometheus metrics
//! - **CLI**: the `docmind` binary submits and waits for DocMind jobs directly
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Request Context → Allow-List → Bearer Auth)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, auth, docmind, tencent)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Credentials (token codec, resolver, default chain)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Providers (RPC signer, STS, DocMind, TC3 signer, poller)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Alibaba Cloud / Tencent Cloud HTTPS APIs                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//! use credential_gateway::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config.clone())?;
//!     let app = build_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind(config.server_addr()).await?;
//!     axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Security Configuration
//!
//! Set a stable token key so issued tokens survive restarts:
//! ```bash
//! TOKEN_SECRET=$(openssl rand -hex 32) cargo run
//! ```
//!
//! Admit a private network:
//! ```bash
//! ALLOWED_IPS=127.0.0.1,10.0.0.0/8 cargo run
//! ```

pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod poller;
pub mod providers;
pub mod routes;
pub mod state;
pub mod token;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use credentials::{CredentialSet, Provider};
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::AppState;
