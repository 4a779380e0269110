use std::sync::Arc;

use tracing::debug;

use super::{CredentialSet, DefaultCredentialChain};
use crate::error::{AppError, AppResult};
use crate::token::TokenCodec;

/// Picks the credential set a request runs with.
///
/// Precedence:
/// 1. A presented token is verified and used verbatim. Any verification
///    failure is returned as-is; there is no fallback to ambient identity.
/// 2. Without a token, the default chain is consulted if it is enabled.
/// 3. Otherwise resolution fails with `NoCredentials`.
#[derive(Clone)]
pub struct CredentialResolver {
    codec: Arc<TokenCodec>,
    default_chain: Option<Arc<DefaultCredentialChain>>,
}

impl CredentialResolver {
    /// `default_chain` is `None` when default-chain resolution is disabled.
    pub fn new(codec: Arc<TokenCodec>, default_chain: Option<DefaultCredentialChain>) -> Self {
        Self {
            codec,
            default_chain: default_chain.map(Arc::new),
        }
    }

    pub fn default_chain_enabled(&self) -> bool {
        self.default_chain.is_some()
    }

    pub async fn resolve(&self, token: Option<&str>) -> AppResult<CredentialSet> {
        if let Some(token) = token {
            return self.codec.verify(token);
        }

        match &self.default_chain {
            Some(chain) => {
                debug!("No bearer token presented, consulting default credential chain");
                chain.resolve().await.ok_or(AppError::NoCredentials)
            }
            None => Err(AppError::NoCredentials),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::credentials::EnvironmentProvider;
    use secrecy::SecretString;
    use std::time::Duration;

    fn codec() -> Arc<TokenCodec> {
        Arc::new(TokenCodec::new(
            &SecretString::from("resolver-test-secret".to_string()),
            Duration::from_secs(3600),
        ))
    }

    fn ambient_chain() -> DefaultCredentialChain {
        DefaultCredentialChain::new(
            vec![Box::new(EnvironmentProvider::from_values(
                Some("AMBIENT".into()),
                Some("AMBIENT_SECRET".into()),
                None,
            ))],
            "cn-hangzhou",
            "docmind-api.cn-hangzhou.aliyuncs.com",
        )
    }

    #[tokio::test]
    async fn test_token_wins_over_default_chain() {
        let codec = codec();
        let issued = codec.issue(&CredentialSet::aliyun("AK", "SK")).unwrap();
        let resolver = CredentialResolver::new(codec, Some(ambient_chain()));

        let creds = resolver.resolve(Some(&issued.token)).await.unwrap();
        assert_eq!(creds.access_key_id, "AK");
    }

    #[tokio::test]
    async fn test_invalid_token_does_not_fall_back() {
        let resolver = CredentialResolver::new(codec(), Some(ambient_chain()));

        let err = resolver.resolve(Some("!!not-base64!!")).await.unwrap_err();
        assert!(matches!(err, AppError::MalformedToken(_)));
    }

    #[tokio::test]
    async fn test_no_token_uses_chain_when_enabled() {
        let resolver = CredentialResolver::new(codec(), Some(ambient_chain()));
        assert!(resolver.default_chain_enabled());

        let creds = resolver.resolve(None).await.unwrap();
        assert_eq!(creds.access_key_id, "AMBIENT");
    }

    #[tokio::test]
    async fn test_no_token_and_chain_disabled_fails() {
        let resolver = CredentialResolver::new(codec(), None);

        let err = resolver.resolve(None).await.unwrap_err();
        assert!(matches!(err, AppError::NoCredentials));
    }

    #[tokio::test]
    async fn test_empty_chain_fails_with_no_credentials() {
        let resolver = CredentialResolver::new(
            codec(),
            Some(DefaultCredentialChain::new(vec![], "r", "e")),
        );

        let err = resolver.resolve(None).await.unwrap_err();
        assert!(matches!(err, AppError::NoCredentials));
    }
}
