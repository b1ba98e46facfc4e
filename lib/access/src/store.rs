//! Persistence seams for accounts, session tokens and cached credentials.

use async_trait::async_trait;
use huddle_core::{SessionTokenId, UserId};

use crate::credential::{CachedCredential, OAuthToken};
use crate::error::StoreError;
use crate::session::{SessionToken, TokenValue};
use crate::user::UserAccount;

/// Storage for user accounts and their session tokens.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<UserAccount>, StoreError>;

    async fn find_user_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<UserAccount>, StoreError>;

    /// Creates `account` and `token` atomically.
    ///
    /// If another login created an account with the same identifier first,
    /// the token is attached to that account instead. Returns the account
    /// the token belongs to.
    async fn create_user_with_token(
        &self,
        account: &UserAccount,
        token: &SessionToken,
    ) -> Result<UserAccount, StoreError>;

    async fn insert_token(&self, token: &SessionToken) -> Result<(), StoreError>;

    async fn find_token(&self, value: &TokenValue) -> Result<Option<SessionToken>, StoreError>;

    /// Deletes one of the user's tokens. Returns false if it did not exist.
    async fn delete_token(&self, user_id: UserId, id: SessionTokenId) -> Result<bool, StoreError>;

    /// Deletes every token of the user, returning how many were removed.
    async fn delete_all_tokens(&self, user_id: UserId) -> Result<u64, StoreError>;

    async fn list_tokens(&self, user_id: UserId) -> Result<Vec<SessionToken>, StoreError>;

    /// Renames the user. Returns the updated account, or None if it is gone.
    async fn update_display_name(
        &self,
        user_id: UserId,
        name: &str,
    ) -> Result<Option<UserAccount>, StoreError>;
}

/// Storage for the authorization-code credential cache.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_credential(&self, code: &str) -> Result<Option<CachedCredential>, StoreError>;

    /// Inserts a cache entry. A duplicate code is not an error; returns false.
    async fn insert_credential(&self, credential: &CachedCredential) -> Result<bool, StoreError>;

    async fn update_credential(&self, code: &str, token: &OAuthToken) -> Result<(), StoreError>;
}

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Mutex, MutexGuard};

    use super::*;

    #[derive(Default)]
    struct Tables {
        users: HashMap<UserId, UserAccount>,
        tokens: Vec<SessionToken>,
        credentials: HashMap<String, CachedCredential>,
    }

    /// In-memory stores for tests and local runs.
    #[derive(Default)]
    pub struct MemoryStore {
        tables: Mutex<Tables>,
        fail_writes: AtomicBool,
    }

    impl MemoryStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every subsequent write fail with a database error.
        pub fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        #[must_use]
        pub fn user_count(&self) -> usize {
            self.tables.lock().map(|t| t.users.len()).unwrap_or_default()
        }

        #[must_use]
        pub fn token_count(&self) -> usize {
            self.tables.lock().map(|t| t.tokens.len()).unwrap_or_default()
        }

        #[must_use]
        pub fn credential_count(&self) -> usize {
            self.tables
                .lock()
                .map(|t| t.credentials.len())
                .unwrap_or_default()
        }

        fn read(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
            self.tables.lock().map_err(|e| StoreError::Database {
                details: e.to_string(),
            })
        }

        fn write(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Database {
                    details: "writes disabled".to_string(),
                });
            }
            self.read()
        }
    }

    #[async_trait]
    impl AccountStore for MemoryStore {
        async fn find_user(&self, id: UserId) -> Result<Option<UserAccount>, StoreError> {
            Ok(self.read()?.users.get(&id).cloned())
        }

        async fn find_user_by_identifier(
            &self,
            identifier: &str,
        ) -> Result<Option<UserAccount>, StoreError> {
            Ok(self
                .read()?
                .users
                .values()
                .find(|u| u.identifier() == identifier)
                .cloned())
        }

        async fn create_user_with_token(
            &self,
            account: &UserAccount,
            token: &SessionToken,
        ) -> Result<UserAccount, StoreError> {
            let mut tables = self.write()?;
            let winner = tables
                .users
                .values()
                .find(|u| u.identifier() == account.identifier())
                .cloned();
            let owner = match winner {
                Some(existing) => existing,
                None => {
                    tables.users.insert(account.id(), account.clone());
                    account.clone()
                }
            };
            tables.tokens.push(token.clone().for_user(owner.id()));
            Ok(owner)
        }

        async fn insert_token(&self, token: &SessionToken) -> Result<(), StoreError> {
            self.write()?.tokens.push(token.clone());
            Ok(())
        }

        async fn find_token(
            &self,
            value: &TokenValue,
        ) -> Result<Option<SessionToken>, StoreError> {
            Ok(self
                .read()?
                .tokens
                .iter()
                .find(|t| t.value() == value)
                .cloned())
        }

        async fn delete_token(
            &self,
            user_id: UserId,
            id: SessionTokenId,
        ) -> Result<bool, StoreError> {
            let mut tables = self.write()?;
            let before = tables.tokens.len();
            tables
                .tokens
                .retain(|t| !(t.id() == id && t.user_id() == user_id));
            Ok(tables.tokens.len() < before)
        }

        async fn delete_all_tokens(&self, user_id: UserId) -> Result<u64, StoreError> {
            let mut tables = self.write()?;
            let before = tables.tokens.len();
            tables.tokens.retain(|t| t.user_id() != user_id);
            Ok((before - tables.tokens.len()) as u64)
        }

        async fn list_tokens(&self, user_id: UserId) -> Result<Vec<SessionToken>, StoreError> {
            Ok(self
                .read()?
                .tokens
                .iter()
                .filter(|t| t.user_id() == user_id)
                .cloned()
                .collect())
        }

        async fn update_display_name(
            &self,
            user_id: UserId,
            name: &str,
        ) -> Result<Option<UserAccount>, StoreError> {
            let mut tables = self.write()?;
            Ok(tables.users.get_mut(&user_id).map(|user| {
                user.set_display_name(name);
                user.clone()
            }))
        }
    }

    #[async_trait]
    impl CredentialStore for MemoryStore {
        async fn find_credential(
            &self,
            code: &str,
        ) -> Result<Option<CachedCredential>, StoreError> {
            Ok(self.read()?.credentials.get(code).cloned())
        }

        async fn insert_credential(
            &self,
            credential: &CachedCredential,
        ) -> Result<bool, StoreError> {
            let mut tables = self.write()?;
            if tables.credentials.contains_key(&credential.code) {
                return Ok(false);
            }
            tables
                .credentials
                .insert(credential.code.clone(), credential.clone());
            Ok(true)
        }

        async fn update_credential(
            &self,
            code: &str,
            token: &OAuthToken,
        ) -> Result<(), StoreError> {
            if let Some(entry) = self.write()?.credentials.get_mut(code) {
                entry.token = token.clone();
            }
            Ok(())
        }
    }
}
