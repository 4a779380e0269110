//! Process default credential chain.
//!
//! Consulted only when a request carries no bearer token and
//! `ALLOW_DEFAULT_CREDENTIALS` is on. Sources are tried in order and the first
//! fully-populated credential wins:
//!
//! 1. Environment (`ALIBABA_CLOUD_ACCESS_KEY_ID` / `_SECRET` / `_SECURITY_TOKEN`)
//! 2. Profile file (`~/.alibabacloud/credentials`, INI)
//! 3. ECS instance RAM role via the metadata service
//!
//! Environment and profile sources are read once when the chain is built and
//! never re-read. The metadata source stores only its role and endpoint; the
//! credentials it serves rotate on the instance, so they are fetched per call.

use std::env;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ini::Ini;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::CredentialSet;
use crate::config::Config;
use crate::error::{AppError, AppResult};

/// One source in the default chain.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Return a credential, `Ok(None)` if this source has nothing to offer.
    async fn provide(&self) -> AppResult<Option<CredentialSet>>;
}

// =============================================================================
// Environment
// =============================================================================

/// Snapshot of the access-key environment variables taken at startup.
#[derive(Debug, Default)]
pub struct EnvironmentProvider {
    snapshot: Option<CredentialSet>,
}

impl EnvironmentProvider {
    pub const ACCESS_KEY_ID: &'static str = "ALIBABA_CLOUD_ACCESS_KEY_ID";
    pub const ACCESS_KEY_SECRET: &'static str = "ALIBABA_CLOUD_ACCESS_KEY_SECRET";
    pub const SECURITY_TOKEN: &'static str = "ALIBABA_CLOUD_SECURITY_TOKEN";

    pub fn from_env() -> Self {
        let read = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self::from_values(
            read(Self::ACCESS_KEY_ID),
            read(Self::ACCESS_KEY_SECRET),
            read(Self::SECURITY_TOKEN),
        )
    }

    /// Build from explicit values; an incomplete id/secret pair yields an empty provider.
    pub fn from_values(
        access_key_id: Option<String>,
        access_key_secret: Option<String>,
        security_token: Option<String>,
    ) -> Self {
        let snapshot = access_key_id
            .zip(access_key_secret)
            .map(|(id, secret)| {
                let creds = CredentialSet::aliyun(id, secret);
                match security_token {
                    Some(token) => creds.with_session_token(token),
                    None => creds,
                }
            });
        Self { snapshot }
    }
}

#[async_trait]
impl CredentialProvider for EnvironmentProvider {
    fn name(&self) -> &'static str {
        "environment"
    }

    async fn provide(&self) -> AppResult<Option<CredentialSet>> {
        Ok(self.snapshot.clone())
    }
}

// =============================================================================
// Profile file
// =============================================================================

/// Credentials read from an Alibaba Cloud CLI style INI profile file.
///
/// ```ini
/// [default]
/// type = access_key
/// access_key_id = LTAI...
/// access_key_secret = ...
///
/// [temp]
/// type = sts
/// access_key_id = STS...
/// access_key_secret = ...
/// security_token = ...
/// ```
///
/// Sections with `enable = false` and other credential types are ignored.
#[derive(Debug, Default)]
pub struct ProfileProvider {
    snapshot: Option<CredentialSet>,
}

impl ProfileProvider {
    /// Default location: `~/.alibabacloud/credentials`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".alibabacloud").join("credentials"))
    }

    /// Load `profile` from `path`. A missing file or section is not an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the file exists but is not valid INI.
    pub fn load(path: &Path, profile: &str) -> AppResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Credentials file not found, profile source disabled");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| {
            AppError::ConfigError(format!(
                "Failed to read credentials file {}: {e}",
                path.display()
            ))
        })?;

        let Some(section) = ini.section(Some(profile)) else {
            debug!(profile, "Profile not present in credentials file");
            return Ok(Self::default());
        };

        if section
            .get("enable")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("false"))
        {
            debug!(profile, "Profile disabled");
            return Ok(Self::default());
        }

        let field = |key: &str| {
            section
                .get(key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let kind = field("type").unwrap_or_else(|| "access_key".to_string());
        let snapshot = match kind.as_str() {
            "access_key" => field("access_key_id")
                .zip(field("access_key_secret"))
                .map(|(id, secret)| CredentialSet::aliyun(id, secret)),
            "sts" => field("access_key_id")
                .zip(field("access_key_secret"))
                .zip(field("security_token"))
                .map(|((id, secret), token)| {
                    CredentialSet::aliyun(id, secret).with_session_token(token)
                }),
            other => {
                warn!(profile, kind = other, "Unsupported credential type in profile, skipping");
                None
            }
        };

        let snapshot = snapshot.map(|creds| match field("region_id") {
            Some(region) => creds.with_region(region),
            None => creds,
        });

        if snapshot.is_some() {
            info!(profile, path = %path.display(), "Loaded credentials profile");
        }

        Ok(Self { snapshot })
    }
}

#[async_trait]
impl CredentialProvider for ProfileProvider {
    fn name(&self) -> &'static str {
        "profile"
    }

    async fn provide(&self) -> AppResult<Option<CredentialSet>> {
        Ok(self.snapshot.clone())
    }
}

// =============================================================================
// ECS instance metadata
// =============================================================================

/// Temporary credentials of the RAM role attached to the ECS instance.
pub struct InstanceMetadataProvider {
    http: reqwest::Client,
    endpoint: String,
    role: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetadataCredentials {
    code: Option<String>,
    access_key_id: Option<String>,
    access_key_secret: Option<String>,
    security_token: Option<String>,
}

impl InstanceMetadataProvider {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            role: role.into(),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/latest/meta-data/ram/security-credentials/{}",
            self.endpoint.trim_end_matches('/'),
            self.role
        )
    }
}

#[async_trait]
impl CredentialProvider for InstanceMetadataProvider {
    fn name(&self) -> &'static str {
        "instance_metadata"
    }

    async fn provide(&self) -> AppResult<Option<CredentialSet>> {
        let response = self.http.get(self.url()).send().await?;
        if !response.status().is_success() {
            warn!(status = %response.status(), role = %self.role, "Metadata service refused credential request");
            return Ok(None);
        }

        let body: MetadataCredentials = response.json().await?;
        if body.code.as_deref().is_some_and(|c| c != "Success") {
            warn!(role = %self.role, "Metadata service returned a non-success code");
            return Ok(None);
        }

        Ok(body
            .access_key_id
            .zip(body.access_key_secret)
            .zip(body.security_token)
            .map(|((id, secret), token)| CredentialSet::aliyun(id, secret).with_session_token(token)))
    }
}

// =============================================================================
// Chain
// =============================================================================

/// Ordered list of credential sources plus the region/endpoint they default to.
pub struct DefaultCredentialChain {
    providers: Vec<Box<dyn CredentialProvider>>,
    region: String,
    endpoint: String,
}

impl DefaultCredentialChain {
    pub fn new(
        providers: Vec<Box<dyn CredentialProvider>>,
        region: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            providers,
            region: region.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Build the standard chain from configuration. Reads the environment and
    /// the profile file exactly once.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the credentials file is unreadable.
    pub fn from_config(config: &Config, http: reqwest::Client) -> AppResult<Self> {
        let mut providers: Vec<Box<dyn CredentialProvider>> =
            vec![Box::new(EnvironmentProvider::from_env())];

        if let Some(path) = config
            .credentials_file
            .clone()
            .or_else(ProfileProvider::default_path)
        {
            providers.push(Box::new(ProfileProvider::load(
                &path,
                &config.credentials_profile,
            )?));
        }

        if let Some(role) = &config.ecs_metadata_role {
            providers.push(Box::new(InstanceMetadataProvider::new(
                http,
                config.ecs_metadata_endpoint.clone(),
                role.clone(),
            )));
        }

        Ok(Self::new(
            providers,
            config.aliyun_region.clone(),
            config.docmind_endpoint.clone(),
        ))
    }

    /// Number of configured sources.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// First credential any source yields. Source failures are logged and
    /// skipped, so one unreachable source does not hide the next.
    pub async fn resolve(&self) -> Option<CredentialSet> {
        for provider in &self.providers {
            match provider.provide().await {
                Ok(Some(creds)) => {
                    debug!(source = provider.name(), "Resolved default credentials");
                    crate::metrics::record_default_chain_resolution(provider.name());
                    return Some(creds.fill_defaults(&self.region, &self.endpoint));
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(source = provider.name(), error = %e, "Credential source failed");
                }
            }
        }
        None
    }
}
