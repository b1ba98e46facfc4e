//! Postgres repositories for accounts, tokens and cached credentials.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use huddle_access::{
    AccountStore, CachedCredential, CredentialStore, OAuthToken, SessionToken, StoreError,
    TokenExtras, TokenValue, UserAccount,
};
use huddle_core::{CredentialId, SessionTokenId, UserId};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for user queries.
#[derive(FromRow)]
struct UserRow {
    id: String,
    identifier: String,
    user_name: Option<String>,
    email: Option<String>,
}

impl UserRow {
    fn try_into_account(self) -> Result<UserAccount, StoreError> {
        let id = parse_id::<UserId>(&self.id)?;
        Ok(UserAccount::with_all_fields(
            id,
            self.identifier,
            self.user_name,
            self.email,
        ))
    }
}

/// Row type for token queries.
#[derive(FromRow)]
struct TokenRow {
    id: String,
    token_id: String,
    user_id: String,
    created_at: DateTime<Utc>,
}

impl TokenRow {
    fn try_into_token(self) -> Result<SessionToken, StoreError> {
        Ok(SessionToken::with_all_fields(
            parse_id::<SessionTokenId>(&self.id)?,
            TokenValue::from(self.token_id),
            parse_id::<UserId>(&self.user_id)?,
            self.created_at,
        ))
    }
}

/// Row type for credential cache queries.
#[derive(FromRow)]
struct CredentialRow {
    id: String,
    code: String,
    access_token: String,
    refresh_token: Option<String>,
    token_type: String,
    expiry: Option<DateTime<Utc>>,
    extras: serde_json::Value,
}

impl CredentialRow {
    fn try_into_credential(self) -> Result<CachedCredential, StoreError> {
        let extras: TokenExtras =
            serde_json::from_value(self.extras).map_err(|e| StoreError::Corrupt {
                details: format!("invalid extras for credential '{}': {e}", self.id),
            })?;
        Ok(CachedCredential {
            id: parse_id::<CredentialId>(&self.id)?,
            code: self.code,
            token: OAuthToken {
                access_token: self.access_token,
                refresh_token: self.refresh_token,
                token_type: self.token_type,
                expiry: self.expiry,
                extras,
            },
        })
    }
}

fn parse_id<T>(raw: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    T::from_str(raw).map_err(|e| StoreError::Corrupt {
        details: format!("invalid id '{raw}': {e}"),
    })
}

fn database(e: sqlx::Error) -> StoreError {
    StoreError::Database {
        details: e.to_string(),
    }
}

fn extras_json(token: &OAuthToken) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(&token.extras).map_err(|e| StoreError::Corrupt {
        details: format!("failed to encode token extras: {e}"),
    })
}

const USER_COLUMNS: &str = "id, identifier, user_name, email";
const TOKEN_COLUMNS: &str = "id, token_id, user_id, created_at";

/// Repository for accounts and their session tokens.
#[derive(Clone)]
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for AccountRepository {
    async fn find_user(&self, id: UserId) -> Result<Option<UserAccount>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(database)?;
        row.map(UserRow::try_into_account).transpose()
    }

    async fn find_user_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<UserAccount>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE identifier = $1"
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(database)?;
        row.map(UserRow::try_into_account).transpose()
    }

    async fn create_user_with_token(
        &self,
        account: &UserAccount,
        token: &SessionToken,
    ) -> Result<UserAccount, StoreError> {
        let mut tx = self.pool.begin().await.map_err(database)?;

        // The no-op update makes RETURNING yield the row that won a race.
        let owner: UserRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO users (id, identifier, user_name, email)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (identifier) DO UPDATE SET identifier = EXCLUDED.identifier
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(account.id().to_string())
        .bind(account.identifier())
        .bind(account.display_name())
        .bind(account.email())
        .fetch_one(&mut *tx)
        .await
        .map_err(database)?;
        let owner = owner.try_into_account()?;

        sqlx::query(
            r#"
            INSERT INTO tokens (id, token_id, user_id, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(token.id().to_string())
        .bind(token.value().as_str())
        .bind(owner.id().to_string())
        .bind(token.created_at())
        .execute(&mut *tx)
        .await
        .map_err(database)?;

        tx.commit().await.map_err(database)?;
        Ok(owner)
    }

    async fn insert_token(&self, token: &SessionToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tokens (id, token_id, user_id, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(token.id().to_string())
        .bind(token.value().as_str())
        .bind(token.user_id().to_string())
        .bind(token.created_at())
        .execute(&self.pool)
        .await
        .map_err(database)?;
        Ok(())
    }

    async fn find_token(&self, value: &TokenValue) -> Result<Option<SessionToken>, StoreError> {
        let row: Option<TokenRow> = sqlx::query_as(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE token_id = $1"
        ))
        .bind(value.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(database)?;
        row.map(TokenRow::try_into_token).transpose()
    }

    async fn delete_token(&self, user_id: UserId, id: SessionTokenId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM tokens WHERE id = $1 AND user_id = $2")
            .bind(id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_tokens(&self, user_id: UserId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM tokens WHERE user_id = $1")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(database)?;
        Ok(result.rows_affected())
    }

    async fn list_tokens(&self, user_id: UserId) -> Result<Vec<SessionToken>, StoreError> {
        let rows: Vec<TokenRow> = sqlx::query_as(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE user_id = $1 ORDER BY created_at"
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(database)?;
        rows.into_iter().map(TokenRow::try_into_token).collect()
    }

    async fn update_display_name(
        &self,
        user_id: UserId,
        name: &str,
    ) -> Result<Option<UserAccount>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET user_name = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id.to_string())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(database)?;
        row.map(UserRow::try_into_account).transpose()
    }
}

/// Repository for the authorization-code credential cache.
#[derive(Clone)]
pub struct CredentialRepository {
    pool: PgPool,
}

impl CredentialRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for CredentialRepository {
    async fn find_credential(&self, code: &str) -> Result<Option<CachedCredential>, StoreError> {
        let row: Option<CredentialRow> = sqlx::query_as(
            r#"
            SELECT id, code, access_token, refresh_token, token_type, expiry, extras
            FROM credentials
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(database)?;
        row.map(CredentialRow::try_into_credential).transpose()
    }

    async fn insert_credential(&self, credential: &CachedCredential) -> Result<bool, StoreError> {
        let token = &credential.token;
        let result = sqlx::query(
            r#"
            INSERT INTO credentials
                (id, code, access_token, refresh_token, token_type, expiry, extras)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(credential.id.to_string())
        .bind(&credential.code)
        .bind(&token.access_token)
        .bind(token.refresh_token.as_deref())
        .bind(&token.token_type)
        .bind(token.expiry)
        .bind(extras_json(token)?)
        .execute(&self.pool)
        .await
        .map_err(database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_credential(&self, code: &str, token: &OAuthToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE credentials
            SET access_token = $2, refresh_token = $3, token_type = $4, expiry = $5, extras = $6
            WHERE code = $1
            "#,
        )
        .bind(code)
        .bind(&token.access_token)
        .bind(token.refresh_token.as_deref())
        .bind(&token.token_type)
        .bind(token.expiry)
        .bind(extras_json(token)?)
        .execute(&self.pool)
        .await
        .map_err(database)?;
        Ok(())
    }
}
