//! Local user accounts and the provider identity that maps onto them.
//!
//! A [`UserAccount`] is keyed by its provider `identifier` (the subject
//! claim), never by email: email can be absent (Apple repeat logins, Slack
//! without the email scope) or unverified.

use serde::{Deserialize, Serialize};
use huddle_core::UserId;

/// The canonical identity resolved from a provider after login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Provider-scoped stable subject identifier.
    pub subject: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
}

impl IdentityClaims {
    /// Creates claims with a verified email, the common case.
    #[must_use]
    pub fn verified(subject: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            display_name: None,
            email: Some(email.into()),
            email_verified: true,
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Email, treating an empty string as absent.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().filter(|e| !e.is_empty())
    }

    /// Display name, treating an empty string as absent.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref().filter(|n| !n.is_empty())
    }
}

/// A local account created on first login for a given identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    id: UserId,
    identifier: String,
    display_name: Option<String>,
    email: Option<String>,
}

impl UserAccount {
    /// Creates a new account from freshly resolved claims.
    #[must_use]
    pub fn from_claims(claims: &IdentityClaims) -> Self {
        Self {
            id: UserId::new(),
            identifier: claims.subject.clone(),
            display_name: claims.display_name().map(str::to_string),
            email: claims.email().map(str::to_string),
        }
    }

    /// Reconstitutes an account from storage.
    #[must_use]
    pub fn with_all_fields(
        id: UserId,
        identifier: String,
        display_name: Option<String>,
        email: Option<String>,
    ) -> Self {
        Self {
            id,
            identifier,
            display_name,
            email,
        }
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Provider subject identifier; unique across accounts.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.display_name = Some(name.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_from_claims_keys_on_subject() {
        let claims = IdentityClaims::verified("sub-123", "ada@example.com").with_display_name("Ada");
        let account = UserAccount::from_claims(&claims);
        assert_eq!(account.identifier(), "sub-123");
        assert_eq!(account.email(), Some("ada@example.com"));
        assert_eq!(account.display_name(), Some("Ada"));
    }

    #[test]
    fn empty_claim_strings_are_absent() {
        let claims = IdentityClaims {
            subject: "001234.abcd".to_string(),
            display_name: Some(String::new()),
            email: Some(String::new()),
            email_verified: true,
        };
        assert_eq!(claims.email(), None);
        let account = UserAccount::from_claims(&claims);
        assert_eq!(account.display_name(), None);
        assert_eq!(account.email(), None);
    }

    #[test]
    fn rename_updates_display_name() {
        let mut account = UserAccount::from_claims(&IdentityClaims::verified("s", "a@b.c"));
        account.set_display_name("Grace");
        assert_eq!(account.display_name(), Some("Grace"));
    }
}
