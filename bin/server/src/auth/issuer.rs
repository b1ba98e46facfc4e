//! Turns a resolved identity into a session token.

use std::sync::Arc;

use huddle_access::{AccountStore, AllowList, AuthFlowError, IdentityClaims, SessionToken, UserAccount};
use tracing::instrument;

/// Gates identities against the allow-list and issues session tokens.
#[derive(Clone)]
pub struct SessionIssuer {
    accounts: Arc<dyn AccountStore>,
    allow_list: Arc<AllowList>,
}

impl SessionIssuer {
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountStore>, allow_list: AllowList) -> Self {
        Self {
            accounts,
            allow_list: Arc::new(allow_list),
        }
    }

    /// Issues a new session token for `claims`, creating the account on
    /// first login.
    ///
    /// Nothing is written when the identity is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`AuthFlowError::EmailNotAllowed`] or
    /// [`AuthFlowError::EmailNotVerified`] for rejected identities and
    /// [`AuthFlowError::Storage`] if persistence fails.
    #[instrument(skip(self, claims), fields(subject = %claims.subject))]
    pub async fn issue(&self, claims: &IdentityClaims) -> Result<SessionToken, AuthFlowError> {
        let existing = self
            .accounts
            .find_user_by_identifier(&claims.subject)
            .await?;

        // Providers may omit the email on repeat logins.
        let email = claims
            .email()
            .or_else(|| existing.as_ref().and_then(UserAccount::email))
            .unwrap_or_default();
        if !self.allow_list.is_allowed(email) {
            return Err(AuthFlowError::EmailNotAllowed {
                email: email.to_string(),
            });
        }
        if !claims.email_verified {
            return Err(AuthFlowError::EmailNotVerified {
                subject: claims.subject.clone(),
            });
        }

        let token = match existing {
            Some(account) => {
                let token = SessionToken::issue(account.id());
                self.accounts.insert_token(&token).await?;
                token
            }
            None => {
                let account = UserAccount::from_claims(claims);
                let token = SessionToken::issue(account.id());
                let owner = self
                    .accounts
                    .create_user_with_token(&account, &token)
                    .await?;
                if owner.id() == account.id() {
                    tracing::info!(user_id = %owner.id(), "Created account on first login");
                }
                token.for_user(owner.id())
            }
        };

        tracing::info!(user_id = %token.user_id(), token_id = %token.id(), "Issued session token");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_access::store::MemoryStore;

    fn issuer(store: &Arc<MemoryStore>, patterns: &[&str]) -> SessionIssuer {
        let allow_list = AllowList::compile(patterns.iter().copied()).expect("valid patterns");
        SessionIssuer::new(store.clone(), allow_list)
    }

    #[tokio::test]
    async fn first_login_creates_account_and_token() {
        let store = Arc::new(MemoryStore::new());
        let claims = IdentityClaims::verified("google-123", "a@co.com").with_display_name("Ann");

        let token = issuer(&store, &["*@co.com"])
            .issue(&claims)
            .await
            .expect("issued");

        let account = store
            .find_user(token.user_id())
            .await
            .expect("reads")
            .expect("created");
        assert_eq!(account.identifier(), "google-123");
        assert_eq!(account.display_name(), Some("Ann"));
        let found = store
            .find_token(token.value())
            .await
            .expect("reads")
            .expect("stored");
        assert_eq!(found.user_id(), account.id());
    }

    #[tokio::test]
    async fn same_identifier_joins_the_same_account() {
        let store = Arc::new(MemoryStore::new());
        let issuer = issuer(&store, &["*"]);

        let first = issuer
            .issue(&IdentityClaims::verified("sub-1", "old@co.com"))
            .await
            .expect("first");
        let second = issuer
            .issue(&IdentityClaims::verified("sub-1", "new@co.com"))
            .await
            .expect("second");

        assert_eq!(first.user_id(), second.user_id());
        assert_ne!(first.value(), second.value());
        assert_eq!(store.user_count(), 1);
        assert_eq!(store.token_count(), 2);
    }

    #[tokio::test]
    async fn shared_email_does_not_merge_accounts() {
        let store = Arc::new(MemoryStore::new());
        let issuer = issuer(&store, &["*"]);

        let google = issuer
            .issue(&IdentityClaims::verified("google-1", "a@co.com"))
            .await
            .expect("google");
        let slack = issuer
            .issue(&IdentityClaims::verified("U024BE7LH", "a@co.com"))
            .await
            .expect("slack");

        assert_ne!(google.user_id(), slack.user_id());
        assert_eq!(store.user_count(), 2);
    }

    #[tokio::test]
    async fn unverified_email_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let claims = IdentityClaims {
            email_verified: false,
            ..IdentityClaims::verified("sub-1", "a@co.com")
        };

        let err = issuer(&store, &["*"])
            .issue(&claims)
            .await
            .expect_err("unverified");
        assert_eq!(
            err,
            AuthFlowError::EmailNotVerified {
                subject: "sub-1".to_string()
            }
        );
        assert_eq!(store.user_count(), 0);
        assert_eq!(store.token_count(), 0);
    }

    #[tokio::test]
    async fn disallowed_email_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let err = issuer(&store, &["*@co.com"])
            .issue(&IdentityClaims::verified("sub-1", "eve@evil.com"))
            .await
            .expect_err("not allowed");
        assert_eq!(
            err,
            AuthFlowError::EmailNotAllowed {
                email: "eve@evil.com".to_string()
            }
        );
        assert_eq!(store.user_count(), 0);
        assert_eq!(store.token_count(), 0);
    }

    #[tokio::test]
    async fn missing_email_falls_back_to_the_account_email() {
        let store = Arc::new(MemoryStore::new());
        let issuer = issuer(&store, &["*@co.com"]);
        issuer
            .issue(&IdentityClaims::verified("apple-1", "a@co.com"))
            .await
            .expect("first login");

        let repeat = IdentityClaims {
            subject: "apple-1".to_string(),
            display_name: None,
            email: None,
            email_verified: true,
        };
        issuer.issue(&repeat).await.expect("repeat login");

        let unknown = IdentityClaims {
            subject: "apple-2".to_string(),
            ..repeat
        };
        let err = issuer.issue(&unknown).await.expect_err("no email to gate");
        assert!(matches!(err, AuthFlowError::EmailNotAllowed { .. }));
    }

    #[tokio::test]
    async fn storage_failure_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.fail_writes(true);
        let err = issuer(&store, &["*"])
            .issue(&IdentityClaims::verified("sub-1", "a@co.com"))
            .await
            .expect_err("storage down");
        assert!(matches!(err, AuthFlowError::Storage { .. }));
    }
}
