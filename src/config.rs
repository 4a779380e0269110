//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded once at startup from environment variables (or a
//! `.env` file) into an immutable [`Config`]. Components receive the values they
//! need through `AppState`; nothing reads the environment after startup.
//!
//! # Security Configuration
//!
//! - `ALLOWED_IPS`: Comma-separated IP literals and CIDR blocks (default: `127.0.0.1,::1`)
//! - `TOKEN_SECRET` (alias `JWT_SECRET`): HMAC key for issued bearer tokens. Empty values
//!   and the well-known placeholder are rejected. When unset, a random per-process key
//!   is generated and tokens do not survive a restart.
//! - `ALLOW_DEFAULT_CREDENTIALS`: Let requests without a bearer token fall back to the
//!   process default credential chain (default: `false`)
//!
//! # Provider Endpoints
//!
//! Endpoints may be given as bare hosts (`sts.cn-hangzhou.aliyuncs.com`) or with an
//! explicit `http://`/`https://` scheme. Bare hosts are called over HTTPS.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::{AppError, AppResult};

/// Placeholder secret shipped in sample `.env` files. Refused at startup.
pub const PLACEHOLDER_TOKEN_SECRET: &str = "your-secret-key-change-in-production";

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Maximum request body size in bytes (default: 20MB)
    pub max_request_body_size: usize,

    /// Comma-separated list of allowed CORS origins
    /// Use "*" to allow all origins (not recommended for production)
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Admission Control
    // =========================================================================
    /// Allow-list entries, IP literals or CIDR blocks, in configured order.
    pub allowed_ips: Vec<String>,

    /// Paths served without an allow-list check (default: ["/health"]).
    /// Matched exactly against the request path.
    pub allowlist_bypass_paths: Vec<String>,

    // =========================================================================
    // Token Configuration
    // =========================================================================
    /// HMAC-SHA256 key for signed bearer tokens.
    /// `None` means a random key is generated at startup.
    pub token_secret: Option<SecretString>,

    /// Lifetime of issued tokens (default: 24 hours)
    pub token_ttl: Duration,

    /// Resolve requests without a bearer token through the default chain.
    pub allow_default_credentials: bool,

    // =========================================================================
    // Alibaba Cloud
    // =========================================================================
    /// Default region for DocMind and STS (default: "cn-hangzhou")
    pub aliyun_region: String,

    /// DocMind API endpoint (default: "docmind-api.cn-hangzhou.aliyuncs.com")
    pub docmind_endpoint: String,

    /// STS endpoint (default: "sts.cn-hangzhou.aliyuncs.com")
    pub sts_endpoint: String,

    /// Credentials file consulted by the default chain.
    /// Default: `~/.alibabacloud/credentials`
    pub credentials_file: Option<PathBuf>,

    /// Profile section read from the credentials file (default: "default")
    pub credentials_profile: String,

    /// ECS RAM role name for the instance metadata provider (optional)
    pub ecs_metadata_role: Option<String>,

    /// Instance metadata service base URL (default: "http://100.100.100.200")
    pub ecs_metadata_endpoint: String,

    // =========================================================================
    // Tencent Cloud
    // =========================================================================
    /// Default region (default: "ap-guangzhou")
    pub tencent_region: String,

    /// API endpoint, also used as the signed `host` header
    /// (default: "lkeap.tencentcloudapi.com")
    pub tencent_endpoint: String,

    /// Service name in the credential scope (default: "lkeap")
    pub tencent_service: String,

    /// API version sent as `X-TC-Version` (default: "2024-05-22")
    pub tencent_version: String,

    // =========================================================================
    // Job Polling and Upstream Calls
    // =========================================================================
    /// Delay between status checks (default: 2000ms)
    pub poll_interval: Duration,

    /// Give up waiting after this long (default: 120000ms)
    pub poll_max_wait: Duration,

    /// Timeout for each outbound provider request (default: 30 seconds)
    pub upstream_timeout: Duration,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format
    pub log_json: bool,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any value fails to parse or the
    /// combination is invalid (see [`Config::validate`]).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 20 * 1024 * 1024)?,
            cors_allowed_origins: Self::parse_list("CORS_ALLOWED_ORIGINS", "*"),

            // Admission control
            allowed_ips: Self::parse_list("ALLOWED_IPS", "127.0.0.1,::1"),
            allowlist_bypass_paths: Self::parse_list("ALLOWLIST_BYPASS_PATHS", "/health")
                .into_iter()
                .filter(|p| p.starts_with('/'))
                .collect(),

            // Tokens
            token_secret: Self::token_secret_from_env(),
            token_ttl: Duration::from_secs(Self::parse_env("TOKEN_TTL_SECS", 86_400)?),
            allow_default_credentials: Self::parse_bool("ALLOW_DEFAULT_CREDENTIALS", false)?,

            // Alibaba Cloud
            aliyun_region: env::var("ALIBABA_CLOUD_REGION_ID")
                .unwrap_or_else(|_| "cn-hangzhou".to_string()),
            docmind_endpoint: env::var("DOCMIND_ENDPOINT")
                .unwrap_or_else(|_| "docmind-api.cn-hangzhou.aliyuncs.com".to_string()),
            sts_endpoint: env::var("STS_ENDPOINT")
                .unwrap_or_else(|_| "sts.cn-hangzhou.aliyuncs.com".to_string()),
            credentials_file: env::var("ALIBABA_CLOUD_CREDENTIALS_FILE")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            credentials_profile: env::var("ALIBABA_CLOUD_PROFILE")
                .unwrap_or_else(|_| "default".to_string()),
            ecs_metadata_role: env::var("ALIBABA_CLOUD_ECS_METADATA")
                .ok()
                .filter(|r| !r.is_empty()),
            ecs_metadata_endpoint: env::var("ECS_METADATA_ENDPOINT")
                .unwrap_or_else(|_| "http://100.100.100.200".to_string()),

            // Tencent Cloud
            tencent_region: env::var("TENCENT_REGION")
                .unwrap_or_else(|_| "ap-guangzhou".to_string()),
            tencent_endpoint: env::var("TENCENT_ENDPOINT")
                .unwrap_or_else(|_| "lkeap.tencentcloudapi.com".to_string()),
            tencent_service: env::var("TENCENT_SERVICE").unwrap_or_else(|_| "lkeap".to_string()),
            tencent_version: env::var("TENCENT_VERSION")
                .unwrap_or_else(|_| "2024-05-22".to_string()),

            // Polling and upstream
            poll_interval: Duration::from_millis(Self::parse_env("POLL_INTERVAL_MS", 2000)?),
            poll_max_wait: Duration::from_millis(Self::parse_env("POLL_MAX_WAIT_MS", 120_000)?),
            upstream_timeout: Duration::from_secs(Self::parse_env("UPSTREAM_TIMEOUT_SECS", 30)?),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")),
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        if let Some(secret) = &self.token_secret {
            let exposed = secret.expose_secret();
            if exposed.trim().is_empty() {
                return Err(AppError::ConfigError(
                    "TOKEN_SECRET must not be empty".to_string(),
                ));
            }
            if exposed == PLACEHOLDER_TOKEN_SECRET {
                return Err(AppError::ConfigError(
                    "TOKEN_SECRET is still set to the sample placeholder".to_string(),
                ));
            }
        }

        if self.token_ttl.is_zero() {
            return Err(AppError::ConfigError(
                "TOKEN_TTL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.allowed_ips.is_empty() {
            return Err(AppError::ConfigError(
                "ALLOWED_IPS must list at least one address or CIDR block".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(AppError::ConfigError(
                "POLL_INTERVAL_MS must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval > self.poll_max_wait {
            return Err(AppError::ConfigError(format!(
                "POLL_INTERVAL_MS ({:?}) must be <= POLL_MAX_WAIT_MS ({:?})",
                self.poll_interval, self.poll_max_wait
            )));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("DOCMIND_ENDPOINT", &self.docmind_endpoint),
            ("STS_ENDPOINT", &self.sts_endpoint),
            ("TENCENT_ENDPOINT", &self.tencent_endpoint),
            ("TENCENT_SERVICE", &self.tencent_service),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::ConfigError(format!("{name} must not be empty")));
            }
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr + ToString,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a boolean flag. Accepts true/false, 1/0, yes/no, on/off.
    fn parse_bool(name: &str, default: bool) -> AppResult<bool> {
        match env::var(name) {
            Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" | "" => Ok(false),
                other => Err(AppError::ConfigError(format!(
                    "Invalid {name}: expected a boolean, got '{other}'"
                ))),
            },
            Err(_) => Ok(default),
        }
    }

    /// Parse a comma-separated list, trimming entries and dropping empties.
    fn parse_list(name: &str, default: &str) -> Vec<String> {
        split_list(&env::var(name).unwrap_or_else(|_| default.to_string()))
    }

    /// `TOKEN_SECRET` wins over the legacy `JWT_SECRET` name.
    fn token_secret_from_env() -> Option<SecretString> {
        env::var("TOKEN_SECRET")
            .or_else(|_| env::var("JWT_SECRET"))
            .ok()
            .map(SecretString::from)
    }
}

/// Split a comma-separated configuration value.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_request_body_size: 20 * 1024 * 1024, // 20MB
            cors_allowed_origins: vec!["*".to_string()],
            // Admission control
            allowed_ips: vec!["127.0.0.1".to_string(), "::1".to_string()],
            allowlist_bypass_paths: vec!["/health".to_string()],
            // Tokens
            token_secret: None,
            token_ttl: Duration::from_secs(86_400),
            allow_default_credentials: false,
            // Alibaba Cloud
            aliyun_region: "cn-hangzhou".to_string(),
            docmind_endpoint: "docmind-api.cn-hangzhou.aliyuncs.com".to_string(),
            sts_endpoint: "sts.cn-hangzhou.aliyuncs.com".to_string(),
            credentials_file: None,
            credentials_profile: "default".to_string(),
            ecs_metadata_role: None,
            ecs_metadata_endpoint: "http://100.100.100.200".to_string(),
            // Tencent Cloud
            tencent_region: "ap-guangzhou".to_string(),
            tencent_endpoint: "lkeap.tencentcloudapi.com".to_string(),
            tencent_service: "lkeap".to_string(),
            tencent_version: "2024-05-22".to_string(),
            // Polling and upstream
            poll_interval: Duration::from_millis(2000),
            poll_max_wait: Duration::from_millis(120_000),
            upstream_timeout: Duration::from_secs(30),
            // Observability
            log_level: "info".to_string(),
            log_json: false,
            metrics_port: 9090,
        }
    }
}
