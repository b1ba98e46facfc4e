//! Slack sign-in.
//!
//! Slack's token response carries the authenticated user id; the profile is
//! then fetched from `users.profile.get`. Slack reports API failures as
//! `200 OK` with `"ok": false` and an `error` code.

use async_trait::async_trait;
use huddle_access::{AuthFlowError, IdentityClaims, OAuthToken, ProviderConfig, ProviderKind};
use serde::Deserialize;

use super::{IdentityProvider, ResolvedProvider, require_credentials, user_info_failed};

const AUTHORIZE_URL: &str = "https://slack.com/oauth/authorize";
const TOKEN_URL: &str = "https://slack.com/api/oauth.access";
const PROFILE_URL: &str = "https://slack.com/api/users.profile.get";
const SCOPES: [&str; 1] = ["users.profile:read"];

pub struct SlackProvider {
    client_id: String,
    client_secret: String,
    authorize_url: String,
    token_url: String,
    profile_url: String,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(default)]
    display_name_normalized: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl SlackProvider {
    #[must_use]
    pub fn new(client_id: &str, client_secret: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            profile_url: PROFILE_URL.to_string(),
        }
    }

    /// Overrides the Slack API host, keeping the standard paths.
    #[must_use]
    pub fn with_base_url(mut self, base: &str) -> Self {
        self.authorize_url = format!("{base}/oauth/authorize");
        self.token_url = format!("{base}/api/oauth.access");
        self.profile_url = format!("{base}/api/users.profile.get");
        self
    }
}

#[async_trait]
impl IdentityProvider for SlackProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Slack
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
                authorization_endpoint: self.authorize_url.clone(),
                token_endpoint: self.token_url.clone(),
                user_info_endpoint: Some(self.profile_url.clone()),
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
        let user_id = token
            .extras
            .user_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthFlowError::UserInfoFailed {
                provider: self.kind().to_string(),
                reason: "token response has no user id".to_string(),
            })?;
        let url = resolved
            .config
            .user_info_endpoint
            .as_deref()
            .unwrap_or(PROFILE_URL);

        let response: ProfileResponse = http
            .post(url)
            .bearer_auth(&token.access_token)
            .form(&[("user", user_id)])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| user_info_failed(self.kind(), e))?
            .json()
            .await
            .map_err(|e| user_info_failed(self.kind(), e))?;

        if let Some(error) = response.error.filter(|e| !e.is_empty()) {
            return Err(AuthFlowError::ProviderApi {
                provider: self.kind().to_string(),
                error,
            });
        }
        let profile = match response.profile {
            Some(profile) if response.ok => profile,
            _ => {
                return Err(AuthFlowError::ProviderApi {
                    provider: self.kind().to_string(),
                    error: "missing profile".to_string(),
                });
            }
        };

        let display_name = profile
            .display_name_normalized
            .filter(|n| !n.is_empty())
            .or(profile.real_name);
        Ok(IdentityClaims {
            subject: user_id.to_string(),
            display_name,
            email: profile.email,
            email_verified: true,
        })
    }
}
