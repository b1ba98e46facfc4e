//! OAuth2 client and token response shared by every provider.
//!
//! Providers disagree on the token response: Slack omits `token_type` and
//! returns the authenticated user id, Apple and Google add an `id_token`.
//! [`ProviderTokenResponse`] accepts all of them.

use std::time::Duration;

use chrono::Utc;
use huddle_access::{AuthFlowError, OAuthToken, ProviderConfig, TokenExtras};
use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::{
    AccessToken, AuthType, AuthUrl, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
    RedirectUrl, RefreshToken, Scope, StandardRevocableToken, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Deserializer, Serialize};

/// OAuth2 client with authorization and token endpoints set.
pub type ProviderClient = oauth2::Client<
    BasicErrorResponse,
    ProviderTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Slack v2 nests the user's identity under `authed_user`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthedUser {
    pub id: String,
}

/// Token endpoint response tolerant of provider quirks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTokenResponse {
    access_token: AccessToken,
    #[serde(default = "bearer", deserialize_with = "lenient_token_type")]
    token_type: BasicTokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<RefreshToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authed_user: Option<AuthedUser>,
}

fn bearer() -> BasicTokenType {
    BasicTokenType::Bearer
}

fn lenient_token_type<'de, D>(deserializer: D) -> Result<BasicTokenType, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("bearer") => BasicTokenType::Bearer,
        Some("mac") => BasicTokenType::Mac,
        Some(_) => BasicTokenType::Extension(raw.unwrap_or_default()),
    })
}

impl TokenResponse for ProviderTokenResponse {
    type TokenType = BasicTokenType;

    fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    fn token_type(&self) -> &BasicTokenType {
        &self.token_type
    }

    fn expires_in(&self) -> Option<Duration> {
        self.expires_in.map(Duration::from_secs)
    }

    fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }

    fn scopes(&self) -> Option<&Vec<Scope>> {
        None
    }
}

impl ProviderTokenResponse {
    /// Converts the response into the stored token form.
    ///
    /// `previous_refresh` is kept when a refresh grant does not rotate the
    /// refresh token.
    #[must_use]
    pub fn into_token(self, previous_refresh: Option<&str>) -> OAuthToken {
        let expiry = self
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        let token_type = match &self.token_type {
            BasicTokenType::Bearer => "Bearer".to_string(),
            BasicTokenType::Mac => "MAC".to_string(),
            BasicTokenType::Extension(other) => other.clone(),
        };
        OAuthToken {
            access_token: self.access_token.secret().clone(),
            refresh_token: self
                .refresh_token
                .map(|t| t.secret().clone())
                .or_else(|| previous_refresh.map(str::to_string)),
            token_type,
            expiry,
            extras: TokenExtras {
                id_token: self.id_token,
                user_id: self.user_id.or(self.authed_user.map(|u| u.id)),
            },
        }
    }
}

/// Builds the OAuth2 client for a resolved provider configuration.
///
/// # Errors
///
/// Returns [`AuthFlowError::InternalConfig`] if an endpoint or the redirect
/// URI is not a valid URL.
pub fn build_client(config: &ProviderConfig) -> Result<ProviderClient, AuthFlowError> {
    let invalid = |what: &str, e: oauth2::url::ParseError| AuthFlowError::InternalConfig {
        reason: format!("invalid {what} for {}: {e}", config.kind),
    };
    let auth_url = AuthUrl::new(config.authorization_endpoint.clone())
        .map_err(|e| invalid("authorization endpoint", e))?;
    let token_url =
        TokenUrl::new(config.token_endpoint.clone()).map_err(|e| invalid("token endpoint", e))?;
    let redirect_url =
        RedirectUrl::new(config.redirect_uri.clone()).map_err(|e| invalid("redirect URI", e))?;

    Ok(oauth2::Client::new(ClientId::new(config.client_id.clone()))
        .set_client_secret(ClientSecret::new(config.client_secret.clone()))
        .set_auth_uri(auth_url)
        .set_token_uri(token_url)
        .set_redirect_uri(redirect_url)
        .set_auth_type(AuthType::RequestBody))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slack_v1_response_parses_without_token_type() {
        let json = r#"{"ok":true,"access_token":"xoxp-1","scope":"users.profile:read","user_id":"U024BE7LH","team_id":"T1"}"#;
        let response: ProviderTokenResponse = serde_json::from_str(json).expect("parses");
        assert_eq!(response.token_type(), &BasicTokenType::Bearer);
        let token = response.into_token(None);
        assert_eq!(token.access_token, "xoxp-1");
        assert_eq!(token.extras.user_id.as_deref(), Some("U024BE7LH"));
        assert_eq!(token.expiry, None);
    }

    #[test]
    fn slack_v2_authed_user_is_extracted() {
        let json = r#"{"access_token":"xoxb-1","token_type":"bot","authed_user":{"id":"U1"}}"#;
        let response: ProviderTokenResponse = serde_json::from_str(json).expect("parses");
        let token = response.into_token(None);
        assert_eq!(token.extras.user_id.as_deref(), Some("U1"));
        assert_eq!(token.token_type, "bot");
    }

    #[test]
    fn oidc_response_keeps_id_token_and_expiry() {
        let json = r#"{"access_token":"ya29","token_type":"bearer","expires_in":3599,"refresh_token":"1//r","id_token":"eyJ.x.y"}"#;
        let response: ProviderTokenResponse = serde_json::from_str(json).expect("parses");
        assert_eq!(response.expires_in(), Some(Duration::from_secs(3599)));
        let token = response.into_token(None);
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.refresh_token.as_deref(), Some("1//r"));
        assert_eq!(token.extras.id_token.as_deref(), Some("eyJ.x.y"));
        assert!(token.expiry.is_some_and(|e| e > Utc::now()));
    }

    #[test]
    fn refresh_without_rotation_keeps_previous_refresh_token() {
        let json = r#"{"access_token":"new","token_type":"Bearer","expires_in":3600}"#;
        let response: ProviderTokenResponse = serde_json::from_str(json).expect("parses");
        let token = response.into_token(Some("old-refresh"));
        assert_eq!(token.refresh_token.as_deref(), Some("old-refresh"));
    }

    #[test]
    fn invalid_endpoint_is_internal_config() {
        let config = ProviderConfig {
            kind: huddle_access::ProviderKind::Slack,
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            scopes: Default::default(),
            authorization_endpoint: "not a url".to_string(),
            token_endpoint: "https://slack.com/api/oauth.access".to_string(),
            user_info_endpoint: None,
            redirect_uri: "https://api.example.com/oauth".to_string(),
        };
        assert!(matches!(
            build_client(&config),
            Err(AuthFlowError::InternalConfig { .. })
        ));
    }
}
