//! Provider tokens and the per-authorization-code credential cache entry.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use huddle_core::CredentialId;
use serde::{Deserialize, Serialize};

/// Refresh this long before the recorded expiry.
pub const EXPIRY_SKEW_SECONDS: i64 = 10;

/// Non-standard token response fields a later identity lookup needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenExtras {
    /// OIDC ID token (Apple derives the identity from it).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Authenticated user id returned by Slack alongside the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// An access token obtained from a provider.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expiry: Option<DateTime<Utc>>,
    pub extras: TokenExtras,
}

impl OAuthToken {
    /// Whether the token is expired, or about to be, at `now`.
    ///
    /// Tokens without an expiry never expire.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|expiry| expiry - Duration::seconds(EXPIRY_SKEW_SECONDS) <= now)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("expiry", &self.expiry)
            .field("has_id_token", &self.extras.id_token.is_some())
            .finish()
    }
}

/// A cached exchange result, keyed by the authorization code that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCredential {
    pub id: CredentialId,
    pub code: String,
    pub token: OAuthToken,
}

impl CachedCredential {
    #[must_use]
    pub fn new(code: impl Into<String>, token: OAuthToken) -> Self {
        Self {
            id: CredentialId::new(),
            code: code.into(),
            token,
        }
    }
}
