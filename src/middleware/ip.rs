//! Client IP extraction shared by the allow-list and auth middleware.
//!
//! # Precedence
//!
//! 1. `X-Real-IP`
//! 2. First entry of `X-Forwarded-For`
//! 3. Transport peer address (`ConnectInfo<SocketAddr>`)
//!
//! Empty header values are skipped. Peer addresses are canonicalized, so an
//! IPv4-mapped IPv6 peer (`::ffff:10.0.0.1`) is reported as `10.0.0.1`.
//!
//! # Security Warning: IP Spoofing Risk
//!
//! **Header values are trusted as-is.** Deploy behind a reverse proxy that
//! overwrites (not appends to) both headers, and block direct access to this
//! service. Otherwise a client can claim any allow-listed address:
//!
//! ```nginx
//! proxy_set_header X-Real-IP $remote_addr;
//! proxy_set_header X-Forwarded-For $remote_addr;
//! ```

use std::borrow::Cow;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::trace;

/// Limiter key for requests whose client IP cannot be determined.
pub const UNKNOWN_IP: &str = "unknown";

/// Where a client IP came from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ExtractedIp<'a> {
    FromRealIp(&'a str),
    FromXff(&'a str),
    FromPeer(String),
    NotFound,
}

#[inline]
fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn extract_ip<B>(req: &Request<B>) -> ExtractedIp<'_> {
    if let Some(ip) = req
        .headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(non_empty)
    {
        return ExtractedIp::FromRealIp(ip);
    }

    // Format: "client, proxy1, proxy2" - the first entry is the client
    if let Some(ip) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(non_empty)
    {
        return ExtractedIp::FromXff(ip);
    }

    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return ExtractedIp::FromPeer(addr.ip().to_canonical().to_string());
    }

    ExtractedIp::NotFound
}

/// Determine the client IP, or `None` if no source yields one.
pub fn client_ip<B>(req: &Request<B>) -> Option<String> {
    match extract_ip(req) {
        ExtractedIp::FromRealIp(ip) => {
            trace!(client_ip = %ip, "Client IP from X-Real-IP");
            Some(ip.to_string())
        }
        ExtractedIp::FromXff(ip) => {
            trace!(client_ip = %ip, "Client IP from X-Forwarded-For");
            Some(ip.to_string())
        }
        ExtractedIp::FromPeer(ip) => {
            trace!(client_ip = %ip, "Client IP from peer address");
            Some(ip)
        }
        ExtractedIp::NotFound => None,
    }
}

/// Client IP as a limiter key; requests without one share [`UNKNOWN_IP`].
#[inline]
pub fn client_key<B>(req: &Request<B>) -> Cow<'static, str> {
    match client_ip(req) {
        Some(ip) => Cow::Owned(ip),
        None => Cow::Borrowed(UNKNOWN_IP),
    }
}
