//! Outbound cloud provider clients.
//!
//! - [`aliyun`] - RPC-style signing, STS `AssumeRole`, DocMind jobs
//! - [`tencent`] - TC3-HMAC-SHA256 signing and API calls
//!
//! Clients share one `reqwest::Client` (connection pool) built by
//! [`build_http_client`].

pub mod aliyun;
pub mod tencent;

use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Build the shared outbound HTTP client.
pub fn build_http_client(timeout: Duration) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("credential-gateway/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))
}

/// Base URL for an endpoint given as a bare host or with an explicit scheme.
pub fn endpoint_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    }
}

/// Host (with port, if any) of an endpoint; used for signed `Host` headers.
pub fn endpoint_host(endpoint: &str) -> &str {
    let endpoint = endpoint.trim();
    let rest = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))
        .unwrap_or(endpoint);
    rest.split('/').next().unwrap_or(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_defaults_to_https() {
        assert_eq!(
            endpoint_url("sts.cn-hangzhou.aliyuncs.com"),
            "https://sts.cn-hangzhou.aliyuncs.com"
        );
    }

    #[test]
    fn test_endpoint_url_keeps_explicit_scheme() {
        assert_eq!(endpoint_url("http://127.0.0.1:8080/"), "http://127.0.0.1:8080");
        assert_eq!(endpoint_url("https://example.com"), "https://example.com");
    }

    #[test]
    fn test_endpoint_host() {
        assert_eq!(endpoint_host("lkeap.tencentcloudapi.com"), "lkeap.tencentcloudapi.com");
        assert_eq!(endpoint_host("http://127.0.0.1:8080/"), "127.0.0.1:8080");
        assert_eq!(endpoint_host("https://host.example.com/path"), "host.example.com");
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(Duration::from_secs(5)).is_ok());
    }
}
