//! Identity provider names and resolved client configuration.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AuthFlowError;

/// The identity providers this service can sign users in with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Microsoft,
    Apple,
    Slack,
}

impl ProviderKind {
    pub const ALL: [Self; 4] = [Self::Google, Self::Microsoft, Self::Apple, Self::Slack];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Microsoft => "microsoft",
            Self::Apple => "apple",
            Self::Slack => "slack",
        }
    }

    /// Whether the provider publishes an OIDC discovery document we rely on.
    #[must_use]
    pub fn uses_discovery(&self) -> bool {
        matches!(self, Self::Google | Self::Apple)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = AuthFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Self::Google),
            "microsoft" => Ok(Self::Microsoft),
            "apple" => Ok(Self::Apple),
            "slack" => Ok(Self::Slack),
            other => Err(AuthFlowError::UnknownProvider {
                name: other.to_string(),
            }),
        }
    }
}

/// OAuth2 client configuration for one provider and one redirect URI.
///
/// The client secret is held as given; for Apple it is a freshly signed JWT.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: BTreeSet<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub user_info_endpoint: Option<String>,
    pub redirect_uri: String,
}

impl ProviderConfig {
    /// Scopes in a stable order, as sent on the authorization request.
    pub fn scope_list(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(String::as_str)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("user_info_endpoint", &self.user_info_endpoint)
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Builds a scope set from string literals.
#[must_use]
pub fn scopes(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|s| (*s).to_string()).collect()
}
