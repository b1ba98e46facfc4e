//! Microsoft identity platform (Azure AD v2) sign-in.
//!
//! Endpoints are fixed per tenant rather than discovered. The profile comes
//! from the Graph OIDC userinfo endpoint; Microsoft only returns mailbox
//! addresses it owns, so the email is treated as verified.

use async_trait::async_trait;
use huddle_access::{AuthFlowError, IdentityClaims, OAuthToken, ProviderConfig, ProviderKind};
use serde::Deserialize;

use super::{IdentityProvider, ResolvedProvider, require_credentials, user_info_failed};

const LOGIN_BASE: &str = "https://login.microsoftonline.com";
const GRAPH_USERINFO: &str = "https://graph.microsoft.com/oidc/userinfo";
const SCOPES: [&str; 4] = ["openid", "profile", "email", "offline_access"];

pub struct MicrosoftProvider {
    client_id: String,
    client_secret: String,
    tenant: String,
    login_base: String,
    user_info_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct GraphUserInfo {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl MicrosoftProvider {
    #[must_use]
    pub fn new(client_id: &str, client_secret: &str, tenant: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            tenant: tenant.to_string(),
            login_base: LOGIN_BASE.to_string(),
            user_info_endpoint: GRAPH_USERINFO.to_string(),
        }
    }

    /// Overrides the login host and userinfo URL.
    #[must_use]
    pub fn with_endpoints(
        mut self,
        login_base: impl Into<String>,
        user_info_endpoint: impl Into<String>,
    ) -> Self {
        self.login_base = login_base.into();
        self.user_info_endpoint = user_info_endpoint.into();
        self
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}/oauth2/v2.0/{name}", self.login_base, self.tenant)
    }
}

#[async_trait]
impl IdentityProvider for MicrosoftProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Microsoft
    }

    async fn configure(
        &self,
        _http: &reqwest::Client,
        redirect_uri: &str,
    ) -> Result<ResolvedProvider, AuthFlowError> {
        require_credentials(self.kind(), &self.client_id, &self.client_secret)?;
        Ok(ResolvedProvider {
            config: ProviderConfig {
                kind: self.kind(),
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                scopes: huddle_access::provider::scopes(&SCOPES),
                authorization_endpoint: self.endpoint("authorize"),
                token_endpoint: self.endpoint("token"),
                user_info_endpoint: Some(self.user_info_endpoint.clone()),
                redirect_uri: redirect_uri.to_string(),
            },
            discovery: None,
        })
    }

    async fn resolve_identity(
        &self,
        http: &reqwest::Client,
        resolved: &ResolvedProvider,
        token: &OAuthToken,
    ) -> Result<IdentityClaims, AuthFlowError> {
        let url = resolved
            .config
            .user_info_endpoint
            .as_deref()
            .unwrap_or(GRAPH_USERINFO);
        let info: GraphUserInfo = http
            .get(url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| user_info_failed(self.kind(), e))?
            .json()
            .await
            .map_err(|e| user_info_failed(self.kind(), e))?;

        Ok(IdentityClaims {
            subject: info.sub,
            display_name: info.name,
            email: info.email,
            email_verified: true,
        })
    }
}
