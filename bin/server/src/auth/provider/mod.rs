//! Identity provider strategies and the registry that dispatches to them.
//!
//! Each supported provider implements [`IdentityProvider`]: it builds the
//! OAuth2 client configuration for a callback and turns an access token into
//! [`IdentityClaims`]. The [`ProviderRegistry`] is built once at startup from
//! the enabled providers.

pub mod apple;
pub mod google;
pub mod microsoft;
pub mod slack;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use huddle_access::{AuthFlowError, IdentityClaims, OAuthToken, ProviderConfig, ProviderKind};
use openidconnect::IssuerUrl;
use openidconnect::core::CoreProviderMetadata;

use crate::config::ServerConfig;

pub use apple::AppleProvider;
pub use google::GoogleProvider;
pub use microsoft::MicrosoftProvider;
pub use slack::SlackProvider;

/// Scopes requested from OIDC providers.
pub const OIDC_SCOPES: [&str; 3] = ["openid", "profile", "email"];

/// Client configuration for one callback, plus discovery metadata for
/// providers that publish it.
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    pub config: ProviderConfig,
    pub discovery: Option<CoreProviderMetadata>,
}

impl ResolvedProvider {
    /// Returns the discovery metadata or fails if the provider needs it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthFlowError::InternalConfig`] when no metadata was resolved.
    pub fn require_discovery(&self) -> Result<&CoreProviderMetadata, AuthFlowError> {
        self.discovery
            .as_ref()
            .ok_or_else(|| AuthFlowError::InternalConfig {
                reason: format!("{} resolved without discovery metadata", self.config.kind),
            })
    }
}

/// One identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Builds the client configuration used for `redirect_uri`.
    async fn configure(
        &self,
        http: &reqwest::Client,
        redirect_uri: &str,
    ) -> Result<ResolvedProvider, AuthFlowError>;

    /// Resolves the signed-in user's identity from the exchanged token.
    async fn resolve_identity(
        &self,
        http: &reqwest::Client,
        resolved: &ResolvedProvider,
        token: &OAuthToken,
    ) -> Result<IdentityClaims, AuthFlowError>;
}

/// Lookup table of enabled providers.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from the enabled providers in `config`.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut registry = Self::new();
        if config.enable_google_oauth {
            registry.register(GoogleProvider::new(
                &config.google_client_id,
                &config.google_client_secret,
            ));
        }
        if config.enable_microsoft_oauth {
            registry.register(MicrosoftProvider::new(
                &config.microsoft_client_id,
                &config.microsoft_client_secret,
                &config.microsoft_tenant,
            ));
        }
        if config.enable_slack_oauth {
            registry.register(SlackProvider::new(
                &config.slack_client_id,
                &config.slack_client_secret,
            ));
        }
        if config.enable_apple_oauth {
            registry.register(AppleProvider::new(huddle_access::AppleSecretSigner::new(
                config.apple_private_key.as_str(),
                config.apple_team_id.as_str(),
                config.apple_client_id.as_str(),
                config.apple_key_id.as_str(),
            )));
        }
        for kind in registry.kinds() {
            tracing::info!(provider = %kind, "Identity provider enabled");
        }
        registry
    }

    pub fn register(&mut self, provider: impl IdentityProvider + 'static) {
        self.providers.insert(provider.kind(), Arc::new(provider));
    }

    /// Enabled providers in a stable order.
    #[must_use]
    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.providers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Looks up a provider by name.
    ///
    /// # Errors
    ///
    /// Returns [`AuthFlowError::UnknownProvider`] for names outside the
    /// supported set and [`AuthFlowError::ProviderDisabled`] for supported
    /// providers that are switched off.
    pub fn get(&self, name: &str) -> Result<Arc<dyn IdentityProvider>, AuthFlowError> {
        let kind: ProviderKind = name.parse()?;
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| AuthFlowError::ProviderDisabled {
                provider: kind.to_string(),
            })
    }

    /// Looks up a provider and builds its configuration for `redirect_uri`.
    ///
    /// # Errors
    ///
    /// See [`ProviderRegistry::get`] and [`IdentityProvider::configure`].
    pub async fn resolve(
        &self,
        http: &reqwest::Client,
        name: &str,
        redirect_uri: &str,
    ) -> Result<(Arc<dyn IdentityProvider>, ResolvedProvider), AuthFlowError> {
        let provider = self.get(name)?;
        let resolved = provider.configure(http, redirect_uri).await?;
        Ok((provider, resolved))
    }
}

/// Fails when a provider is enabled without client credentials.
pub(crate) fn require_credentials(
    kind: ProviderKind,
    client_id: &str,
    client_secret: &str,
) -> Result<(), AuthFlowError> {
    if client_id.is_empty() || client_secret.is_empty() {
        return Err(AuthFlowError::MissingClientCredentials {
            provider: kind.to_string(),
        });
    }
    Ok(())
}

/// Fetches the provider's OIDC discovery document and signing keys.
pub(crate) async fn discover(
    kind: ProviderKind,
    issuer: &str,
    http: &reqwest::Client,
) -> Result<CoreProviderMetadata, AuthFlowError> {
    let issuer_url =
        IssuerUrl::new(issuer.to_string()).map_err(|e| AuthFlowError::InternalConfig {
            reason: format!("invalid issuer URL '{issuer}': {e}"),
        })?;
    CoreProviderMetadata::discover_async(issuer_url, http)
        .await
        .map_err(|e| AuthFlowError::ProviderUnavailable {
            provider: kind.to_string(),
            reason: e.to_string(),
        })
}

/// Builds a configuration from discovered metadata.
pub(crate) fn config_from_discovery(
    kind: ProviderKind,
    metadata: &CoreProviderMetadata,
    client_id: &str,
    client_secret: String,
    redirect_uri: &str,
) -> Result<ProviderConfig, AuthFlowError> {
    let token_endpoint = metadata
        .token_endpoint()
        .ok_or_else(|| AuthFlowError::ProviderUnavailable {
            provider: kind.to_string(),
            reason: "discovery document has no token endpoint".to_string(),
        })?;
    Ok(ProviderConfig {
        kind,
        client_id: client_id.to_string(),
        client_secret,
        scopes: huddle_access::provider::scopes(&OIDC_SCOPES),
        authorization_endpoint: metadata.authorization_endpoint().url().to_string(),
        token_endpoint: token_endpoint.url().to_string(),
        user_info_endpoint: metadata.userinfo_endpoint().map(|u| u.url().to_string()),
        redirect_uri: redirect_uri.to_string(),
    })
}

/// Maps a reqwest failure during a user info call.
pub(crate) fn user_info_failed(kind: ProviderKind, e: impl std::fmt::Display) -> AuthFlowError {
    AuthFlowError::UserInfoFailed {
        provider: kind.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Discovery fixtures served by a mock server.

    use httpmock::prelude::*;
    use serde_json::json;

    /// Serves a discovery document and empty JWKS whose issuer is the server.
    pub async fn mock_discovery(server: &MockServer) {
        mock_discovery_with_keys(server, json!([])).await;
    }

    /// Serves a discovery document and the given JSON web keys.
    pub async fn mock_discovery_with_keys(server: &MockServer, keys: serde_json::Value) {
        let issuer = server.base_url();
        server
            .mock_async(|when, then| {
                when.method(GET).path("/.well-known/openid-configuration");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({
                        "issuer": issuer,
                        "authorization_endpoint": format!("{issuer}/authorize"),
                        "token_endpoint": format!("{issuer}/token"),
                        "userinfo_endpoint": format!("{issuer}/userinfo"),
                        "jwks_uri": format!("{issuer}/jwks"),
                        "response_types_supported": ["code"],
                        "subject_types_supported": ["public"],
                        "id_token_signing_alg_values_supported": ["RS256"],
                    }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/jwks");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({ "keys": keys }));
            })
            .await;
    }
}
