//! Sign in with Apple.
//!
//! Apple has no userinfo endpoint. The identity comes from the `id_token` in
//! the token response, verified against Apple's published keys. The client
//! secret is a short-lived JWT signed per callback.

use async_trait::async_trait;
use huddle_access::{AppleSecretSigner, AuthFlowError, IdentityClaims, OAuthToken, ProviderKind};
use openidconnect::core::{CoreClient, CoreIdToken};
use openidconnect::{ClientId, Nonce};

use super::{
    IdentityProvider, ResolvedProvider, config_from_discovery, discover, require_credentials,
};

pub const APPLE_ISSUER: &str = "https://appleid.apple.com";

pub struct AppleProvider {
    signer: AppleSecretSigner,
    issuer: String,
}

impl AppleProvider {
    #[must_use]
    pub fn new(signer: AppleSecretSigner) -> Self {
        Self {
            signer,
            issuer: APPLE_ISSUER.to_string(),
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
impl IdentityProvider for AppleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Apple
    }

    async fn configure(
        &self,
        http: &reqwest::Client,
        redirect_uri: &str,
    ) -> Result<ResolvedProvider, AuthFlowError> {
        let secret = self.signer.sign()?;
        require_credentials(self.kind(), self.signer.client_id(), &secret)?;
        let metadata = discover(self.kind(), &self.issuer, http).await?;
        let config = config_from_discovery(
            self.kind(),
            &metadata,
            self.signer.client_id(),
            secret,
            redirect_uri,
        )?;
        Ok(ResolvedProvider {
            config,
            discovery: Some(metadata),
        })
    }

    async fn resolve_identity(
        &self,
        _http: &reqwest::Client,
        resolved: &ResolvedProvider,
        token: &OAuthToken,
    ) -> Result<IdentityClaims, AuthFlowError> {
        let metadata = resolved.require_discovery()?.clone();
        let raw = token
            .extras
            .id_token
            .as_deref()
            .ok_or_else(|| AuthFlowError::InvalidIdToken {
                reason: "token response has no id_token".to_string(),
            })?;
        let id_token = raw
            .parse::<CoreIdToken>()
            .map_err(|e| AuthFlowError::InvalidIdToken {
                reason: e.to_string(),
            })?;

        let client = CoreClient::from_provider_metadata(
            metadata,
            ClientId::new(resolved.config.client_id.clone()),
            None,
        );
        // Apple only echoes a nonce when the authorize request sent one.
        let claims = id_token
            .claims(&client.id_token_verifier(), |_: Option<&Nonce>| {
                Ok::<(), String>(())
            })
            .map_err(|e| AuthFlowError::InvalidIdToken {
                reason: e.to_string(),
            })?;

        // A verified Apple token vouches for the subject. Repeat logins
        // carry neither `email` nor `email_verified`.
        Ok(IdentityClaims {
            subject: claims.subject().as_str().to_string(),
            display_name: None,
            email: claims.email().map(|e| e.as_str().to_string()),
            email_verified: true,
        })
    }
}
