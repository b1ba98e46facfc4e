//! Google sign-in via OIDC discovery and the UserInfo endpoint.

use async_trait::async_trait;
use huddle_access::{AuthFlowError, IdentityClaims, OAuthToken, ProviderKind};
use openidconnect::AccessToken;
use openidconnect::core::{CoreClient, CoreUserInfoClaims};
use openidconnect::ClientId;

use super::{
    IdentityProvider, ResolvedProvider, config_from_discovery, discover, require_credentials,
    user_info_failed,
};

pub const GOOGLE_ISSUER: &str = "https://accounts.google.com";

pub struct GoogleProvider {
    client_id: String,
    client_secret: String,
    issuer: String,
}

impl GoogleProvider {
    #[must_use]
    pub fn new(client_id: &str, client_secret: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            issuer: GOOGLE_ISSUER.to_string(),
        }
    }

    /// Points discovery at another issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    async fn configure(
        &self,
        http: &reqwest::Client,
        redirect_uri: &str,
    ) -> Result<ResolvedProvider, AuthFlowError> {
        require_credentials(self.kind(), &self.client_id, &self.client_secret)?;
        let metadata = discover(self.kind(), &self.issuer, http).await?;
        let config = config_from_discovery(
            self.kind(),
            &metadata,
            &self.client_id,
            self.client_secret.clone(),
            redirect_uri,
        )?;
        Ok(ResolvedProvider {
            config,
            discovery: Some(metadata),
        })
    }

    async fn resolve_identity(
        &self,
        http: &reqwest::Client,
        resolved: &ResolvedProvider,
        token: &OAuthToken,
    ) -> Result<IdentityClaims, AuthFlowError> {
        let metadata = resolved.require_discovery()?.clone();
        let client = CoreClient::from_provider_metadata(
            metadata,
            ClientId::new(resolved.config.client_id.clone()),
            None,
        );

        let claims: CoreUserInfoClaims = client
            .user_info(AccessToken::new(token.access_token.clone()), None)
            .map_err(|e| AuthFlowError::InternalConfig {
                reason: format!("google has no userinfo endpoint: {e}"),
            })?
            .request_async(http)
            .await
            .map_err(|e| user_info_failed(self.kind(), e))?;

        Ok(IdentityClaims {
            subject: claims.subject().as_str().to_string(),
            display_name: claims
                .name()
                .and_then(|n| n.get(None))
                .map(|n| n.as_str().to_string()),
            email: claims.email().map(|e| e.as_str().to_string()),
            email_verified: claims.email_verified().unwrap_or(false),
        })
    }
}
