//! Credential sets and how a request obtains one.
//!
//! A [`CredentialSet`] is the (id, secret, optional session token, region,
//! endpoint) tuple needed to authorize a downstream call. Requests obtain one
//! through the [`CredentialResolver`]: an explicit bearer token always wins, the
//! process default chain is consulted only when enabled, and otherwise
//! resolution fails with `NoCredentials`.
//!
//! Provider field-name variants (`accessKeyId` vs `secretId`, `securityToken`
//! vs `sessionToken`, `regionId` vs `region`) are normalized here, at the wire
//! boundary, by [`CredentialPayload::into_credentials`].

mod chain;
mod resolver;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

pub use chain::{
    CredentialProvider, DefaultCredentialChain, EnvironmentProvider, InstanceMetadataProvider,
    ProfileProvider,
};
pub use resolver::CredentialResolver;

/// Cloud provider a credential set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aliyun,
    Tencent,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Aliyun => "aliyun",
            Provider::Tencent => "tencent",
        }
    }
}

/// Concrete credentials for one downstream call.
///
/// Secret fields are [`SecretString`]s so they are redacted from `Debug`
/// output and never end up in logs by accident.
#[derive(Debug, Clone)]
pub struct CredentialSet {
    pub provider: Provider,
    /// `accessKeyId` for Alibaba Cloud, `secretId` for Tencent Cloud.
    pub access_key_id: String,
    /// `accessKeySecret` for Alibaba Cloud, `secretKey` for Tencent Cloud.
    pub access_key_secret: SecretString,
    /// Present only for delegated (STS) credentials.
    pub session_token: Option<SecretString>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

impl CredentialSet {
    /// Long-lived Alibaba Cloud access key.
    pub fn aliyun(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            provider: Provider::Aliyun,
            access_key_id: access_key_id.into(),
            access_key_secret: SecretString::from(access_key_secret.into()),
            session_token: None,
            region: None,
            endpoint: None,
        }
    }

    /// Tencent Cloud `secretId`/`secretKey` pair.
    pub fn tencent(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            provider: Provider::Tencent,
            ..Self::aliyun(secret_id, secret_key)
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Whether this is a delegated credential carrying a session token.
    pub fn is_delegated(&self) -> bool {
        self.session_token.is_some()
    }

    /// Region to use, falling back to a configured default.
    pub fn region_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.region.as_deref().unwrap_or(default)
    }

    /// Endpoint to use, falling back to a configured default.
    pub fn endpoint_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.endpoint.as_deref().unwrap_or(default)
    }

    /// Fill region and endpoint only where they are unset.
    pub fn fill_defaults(mut self, region: &str, endpoint: &str) -> Self {
        if self.region.is_none() {
            self.region = Some(region.to_string());
        }
        if self.endpoint.is_none() {
            self.endpoint = Some(endpoint.to_string());
        }
        self
    }
}

/// Wire shape of credential material inside tokens and request bodies.
///
/// Accepts both the Alibaba Cloud (`accessKeyId`/`accessKeySecret`) and the
/// Tencent Cloud (`secretId`/`secretKey`) field names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(
        default,
        alias = "sessionToken",
        skip_serializing_if = "Option::is_none"
    )]
    pub security_token: Option<String>,
    #[serde(default, alias = "region", skip_serializing_if = "Option::is_none")]
    pub region_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Provider-issued expiry of delegated credentials (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
}

impl CredentialPayload {
    /// Normalize into a [`CredentialSet`].
    ///
    /// The Alibaba Cloud pair takes precedence; the Tencent pair is used when
    /// it is the only complete one. Empty strings count as absent.
    ///
    /// # Errors
    ///
    /// Returns a short description (never containing secret values) when no
    /// complete id/secret pair is present.
    pub fn into_credentials(self) -> Result<CredentialSet, String> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let aliyun_pair = non_empty(self.access_key_id).zip(non_empty(self.access_key_secret));
        let tencent_pair = non_empty(self.secret_id).zip(non_empty(self.secret_key));

        let (provider, (id, secret)) = match (aliyun_pair, tencent_pair) {
            (Some(pair), _) => (self.provider.unwrap_or(Provider::Aliyun), pair),
            (None, Some(pair)) => (self.provider.unwrap_or(Provider::Tencent), pair),
            (None, None) => {
                return Err("credential id and secret are required".to_string());
            }
        };

        Ok(CredentialSet {
            provider,
            access_key_id: id,
            access_key_secret: SecretString::from(secret),
            session_token: non_empty(self.security_token).map(SecretString::from),
            region: non_empty(self.region_id),
            endpoint: non_empty(self.endpoint),
        })
    }
}

impl From<&CredentialSet> for CredentialPayload {
    fn from(credentials: &CredentialSet) -> Self {
        let id = Some(credentials.access_key_id.clone());
        let secret = Some(credentials.access_key_secret.expose_secret().to_string());
        let (access_key_id, access_key_secret, secret_id, secret_key) = match credentials.provider
        {
            Provider::Aliyun => (id, secret, None, None),
            Provider::Tencent => (None, None, id, secret),
        };

        Self {
            provider: Some(credentials.provider),
            access_key_id,
            access_key_secret,
            secret_id,
            secret_key,
            security_token: credentials
                .session_token
                .as_ref()
                .map(|t| t.expose_secret().to_string()),
            region_id: credentials.region.clone(),
            endpoint: credentials.endpoint.clone(),
            expiration: None,
        }
    }
}
