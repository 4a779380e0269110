//! IP allow-list admission control.
//!
//! Every request outside the bypass paths must come from an address that
//! matches an allow-list entry. Deny by default.
//!
//! # Entry Syntax
//!
//! - `10.0.0.0/8`, `2001:db8::/32` - CIDR block, matched by masked comparison
//! - `127.0.0.1`, `::1` - literal, matched by exact string equality
//!
//! An entry that fails to parse never matches, but the remaining entries are
//! still tried. Such entries are reported once, at startup.
//!
//! # Responses
//!
//! | Situation | Status | `error` |
//! |-----------|--------|---------|
//! | No client IP determinable | 403 | `IP_NOT_DETECTED` |
//! | IP matches no entry | 403 | `IP_NOT_ALLOWED` |

use std::net::IpAddr;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{debug, info, warn};

use super::ip::client_ip;
use crate::error::{AdmissionReason, AppError};

// =============================================================================
// CIDR Matching
// =============================================================================

/// Parsed CIDR network range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse `network/prefix` (e.g. `"10.0.0.0/8"` or `"fd00::/8"`).
    ///
    /// Returns `None` for a missing or non-numeric prefix, a prefix wider than
    /// the address family, or an unparseable network address.
    pub fn parse(cidr: &str) -> Option<Self> {
        let (network, prefix) = cidr.trim().split_once('/')?;
        let network: IpAddr = network.trim().parse().ok()?;
        let prefix_len: u8 = prefix.trim().parse().ok()?;

        let max_prefix = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix_len > max_prefix {
            return None;
        }

        Some(Self {
            network,
            prefix_len,
        })
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Check if an address falls inside this range. Families never mix.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix_len)
                };
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u128::MAX << (128 - self.prefix_len)
                };
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

// =============================================================================
// Allow-List
// =============================================================================

#[derive(Debug, Clone)]
enum AllowEntry {
    Exact(String),
    /// `None` when the block failed to parse; such an entry never matches.
    Cidr(Option<CidrRange>),
}

impl AllowEntry {
    fn parse(entry: &str) -> Self {
        let entry = entry.trim();
        if entry.contains('/') {
            AllowEntry::Cidr(CidrRange::parse(entry))
        } else {
            AllowEntry::Exact(entry.to_string())
        }
    }

    fn matches(&self, ip: &str, parsed: Option<&IpAddr>) -> bool {
        match self {
            AllowEntry::Exact(literal) => literal == ip,
            AllowEntry::Cidr(Some(range)) => parsed.is_some_and(|addr| range.contains(addr)),
            AllowEntry::Cidr(None) => false,
        }
    }
}

/// Ordered allow-list of IP literals and CIDR blocks.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    entries: Vec<AllowEntry>,
}

impl AllowList {
    /// Parse entries in order. Unparseable CIDR blocks are kept as
    /// never-matching entries and logged.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Self {
        let entries = entries
            .iter()
            .map(|raw| {
                let entry = AllowEntry::parse(raw.as_ref());
                if matches!(entry, AllowEntry::Cidr(None)) {
                    warn!(entry = %raw.as_ref(), "Invalid CIDR block in ALLOWED_IPS, it will never match");
                }
                entry
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `ip` matches any entry.
    pub fn admits(&self, ip: &str) -> bool {
        let ip = ip.trim();
        if ip.is_empty() {
            return false;
        }
        let parsed = ip.parse::<IpAddr>().ok().map(|addr| addr.to_canonical());
        self.entries
            .iter()
            .any(|entry| entry.matches(ip, parsed.as_ref()))
    }
}

/// Pure admission predicate over raw allow-list entries.
pub fn admit<S: AsRef<str>>(ip: &str, allow_list: &[S]) -> bool {
    let ip = ip.trim();
    if ip.is_empty() {
        return false;
    }
    let parsed = ip.parse::<IpAddr>().ok().map(|addr| addr.to_canonical());
    allow_list
        .iter()
        .any(|raw| AllowEntry::parse(raw.as_ref()).matches(ip, parsed.as_ref()))
}

// =============================================================================
// Middleware
// =============================================================================

/// Tower layer enforcing the allow-list.
///
/// # Example
///
/// ```rust,ignore
/// let layer = AllowListLayer::new(AllowList::parse(&config.allowed_ips), vec!["/health".into()]);
/// let app = Router::new().route("/api", post(handler)).layer(layer);
/// ```
#[derive(Clone)]
pub struct AllowListLayer {
    allow_list: Arc<AllowList>,
    bypass_paths: Arc<Vec<String>>,
}

impl AllowListLayer {
    pub fn new(allow_list: AllowList, bypass_paths: Vec<String>) -> Self {
        info!(
            entries = allow_list.len(),
            bypass_paths = ?bypass_paths,
            "IP allow-list enabled"
        );
        Self {
            allow_list: Arc::new(allow_list),
            bypass_paths: Arc::new(bypass_paths),
        }
    }
}

impl<S> Layer<S> for AllowListLayer {
    type Service = AllowListService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AllowListService {
            inner,
            allow_list: self.allow_list.clone(),
            bypass_paths: self.bypass_paths.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AllowListService<S> {
    inner: S,
    allow_list: Arc<AllowList>,
    bypass_paths: Arc<Vec<String>>,
}

impl<S> Service<Request<Body>> for AllowListService<S>
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

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let allow_list = self.allow_list.clone();
        let bypass_paths = self.bypass_paths.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let path = req.uri().path();
            if bypass_paths.iter().any(|p| p == path) {
                debug!(path, "Bypassing allow-list");
                return inner.call(req).await;
            }

            let denial = match client_ip(&req) {
                None => Some((AdmissionReason::IpNotDetected, None)),
                Some(ip) if !allow_list.admits(&ip) => Some((AdmissionReason::IpNotAllowed, Some(ip))),
                Some(_) => None,
            };

            match denial {
                None => inner.call(req).await,
                Some((reason, ip)) => {
                    warn!(
                        client_ip = ip.as_deref().unwrap_or("-"),
                        path = %req.uri().path(),
                        reason = reason.code(),
                        "Request denied by IP allow-list"
                    );
                    crate::metrics::record_admission_denied(reason.code());
                    Ok(AppError::AdmissionDenied(reason).into_response())
                }
            }
        })
    }
}
