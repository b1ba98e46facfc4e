//! Bearer session tokens.
//!
//! A session token is an opaque UUIDv4 string handed to the client after a
//! successful login. Tokens have no server-side expiry; they live until the
//! user logs out of that session or of all sessions.

use std::fmt;

use chrono::{DateTime, Utc};
use huddle_core::{SessionTokenId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The bearer value presented in `Authorization: Bearer <value>`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenValue(String);

impl TokenValue {
    /// Generates a fresh, unguessable token value.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TokenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenValue(<redacted>)")
    }
}

impl From<String> for TokenValue {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TokenValue {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A persisted token-to-user association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    id: SessionTokenId,
    value: TokenValue,
    user_id: UserId,
    created_at: DateTime<Utc>,
}

impl SessionToken {
    /// Mints a new token for the given user.
    #[must_use]
    pub fn issue(user_id: UserId) -> Self {
        Self {
            id: SessionTokenId::new(),
            value: TokenValue::generate(),
            user_id,
            created_at: Utc::now(),
        }
    }

    /// Reconstitutes a token from storage.
    #[must_use]
    pub fn with_all_fields(
        id: SessionTokenId,
        value: TokenValue,
        user_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            value,
            user_id,
            created_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionTokenId {
        self.id
    }

    #[must_use]
    pub fn value(&self) -> &TokenValue {
        &self.value
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Reassigns the token to another account, used when a concurrent first
    /// login for the same identifier created the account first.
    #[must_use]
    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = user_id;
        self
    }
}
