//! HTTP middleware for admission control, authentication, and observability.
//!
//! # Architecture
//!
//! ```text
//! Request → Request Context → Allow-List → [Bearer Auth] → Handler → Response
//!                 ↓                ↓             ↓
//!          X-Request-Id     403 IP_NOT_*    401 AUTH_FAILED / 429
//! ```
//!
//! Bearer auth is applied only to the protected route group; `/api/auth/*`
//! and `/health` do not need a token.

pub mod allowlist;
pub mod auth;
pub mod ip;
pub mod request_context;

pub use allowlist::{AllowList, AllowListLayer, CidrRange, admit};
pub use auth::{BearerAuth, FAILURE_PRUNE_INTERVAL};
pub use ip::{UNKNOWN_IP, client_ip, client_key};
pub use request_context::{REQUEST_ID_HEADER, RequestContextLayer};
