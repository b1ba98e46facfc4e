//! Authorization-code exchange with a credential cache keyed by code.
//!
//! A code can only be redeemed once at the provider, but clients resubmit
//! callbacks (double clicks, retries after a timeout). The first exchange is
//! cached so a resubmitted code yields the same token instead of an
//! `invalid_grant`.

use std::sync::Arc;

use huddle_access::{AuthFlowError, CachedCredential, CredentialStore, OAuthToken, ProviderConfig};
use oauth2::basic::BasicErrorResponse;
use oauth2::{AuthorizationCode, RefreshToken, RequestTokenError};
use tracing::instrument;

use super::token::build_client;

/// Redeems authorization codes, consulting the credential cache first.
#[derive(Clone)]
pub struct TokenExchanger {
    credentials: Arc<dyn CredentialStore>,
    http: reqwest::Client,
}

impl TokenExchanger {
    #[must_use]
    pub fn new(credentials: Arc<dyn CredentialStore>, http: reqwest::Client) -> Self {
        Self { credentials, http }
    }

    /// Returns a usable token for `code`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthFlowError::TokenExchangeFailed`] if a grant fails or a
    /// cached token expired without a refresh token, and
    /// [`AuthFlowError::Storage`] if the cache cannot be read.
    #[instrument(skip(self, config, code), fields(provider = %config.kind))]
    pub async fn exchange(
        &self,
        config: &ProviderConfig,
        code: &str,
    ) -> Result<OAuthToken, AuthFlowError> {
        match self.credentials.find_credential(code).await? {
            Some(cached) => self.reuse(config, cached).await,
            None => self.redeem(config, code).await,
        }
    }

    async fn redeem(&self, config: &ProviderConfig, code: &str) -> Result<OAuthToken, AuthFlowError> {
        let client = build_client(config)?;
        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| exchange_failed(config, &e))?
            .into_token(None);

        let credential = CachedCredential::new(code, token.clone());
        match self.credentials.insert_credential(&credential).await {
            Ok(true) => tracing::debug!(credential_id = %credential.id, "Cached credential"),
            Ok(false) => tracing::debug!("Credential already cached by a concurrent callback"),
            Err(e) => tracing::warn!(error = %e, "Failed to cache credential"),
        }
        Ok(token)
    }

    async fn reuse(
        &self,
        config: &ProviderConfig,
        cached: CachedCredential,
    ) -> Result<OAuthToken, AuthFlowError> {
        let token = cached.token;
        if !token.is_expired() {
            tracing::debug!(credential_id = %cached.id, "Reusing cached credential");
            return Ok(token);
        }
        let Some(refresh) = token.refresh_token.clone() else {
            return Err(AuthFlowError::TokenExchangeFailed {
                provider: config.kind.to_string(),
                reason: "cached token expired and cannot be refreshed".to_string(),
            });
        };

        let client = build_client(config)?;
        let mut refreshed = client
            .exchange_refresh_token(&RefreshToken::new(refresh.clone()))
            .request_async(&self.http)
            .await
            .map_err(|e| exchange_failed(config, &e))?
            .into_token(Some(&refresh));
        // Refresh responses omit the id_token and user id.
        if refreshed.extras.id_token.is_none() {
            refreshed.extras.id_token = token.extras.id_token.clone();
        }
        if refreshed.extras.user_id.is_none() {
            refreshed.extras.user_id = token.extras.user_id.clone();
        }

        if refreshed.access_token != token.access_token {
            if let Err(e) = self
                .credentials
                .update_credential(&cached.code, &refreshed)
                .await
            {
                tracing::warn!(credential_id = %cached.id, error = %e, "Failed to update cached credential");
            }
        }
        Ok(refreshed)
    }
}

fn exchange_failed<E>(
    config: &ProviderConfig,
    error: &RequestTokenError<E, BasicErrorResponse>,
) -> AuthFlowError
where
    E: std::error::Error + 'static,
{
    let reason = match error {
        RequestTokenError::ServerResponse(response) => response.to_string(),
        other => other.to_string(),
    };
    AuthFlowError::TokenExchangeFailed {
        provider: config.kind.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use httpmock::prelude::*;
    use huddle_access::store::MemoryStore;
    use huddle_access::{ProviderKind, TokenExtras};
    use serde_json::json;

    fn config(server: &MockServer) -> ProviderConfig {
        ProviderConfig {
            kind: ProviderKind::Google,
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            scopes: Default::default(),
            authorization_endpoint: server.url("/authorize"),
            token_endpoint: server.url("/token"),
            user_info_endpoint: None,
            redirect_uri: "https://api.example.com/oauth".to_string(),
        }
    }

    fn exchanger(store: &Arc<MemoryStore>) -> TokenExchanger {
        TokenExchanger::new(store.clone(), reqwest::Client::new())
    }

    #[tokio::test]
    async fn resubmitted_code_hits_the_token_endpoint_once() {
        let server = MockServer::start_async().await;
        let grant = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .body_contains("grant_type=authorization_code")
                    .body_contains("code=4%2F0Adeu5B");
                then.status(200).json_body(json!({
                    "access_token": "ya29.first",
                    "token_type": "Bearer",
                    "expires_in": 3599,
                    "refresh_token": "1//refresh",
                    "id_token": "eyJ.x.y",
                }));
            })
            .await;

        let store = Arc::new(MemoryStore::new());
        let exchanger = exchanger(&store);
        let config = config(&server);

        let first = exchanger.exchange(&config, "4/0Adeu5B").await.expect("first");
        let second = exchanger.exchange(&config, "4/0Adeu5B").await.expect("second");

        assert_eq!(grant.hits_async().await, 1);
        assert_eq!(first.access_token, "ya29.first");
        assert_eq!(second.access_token, first.access_token);
        assert_eq!(second.extras.id_token.as_deref(), Some("eyJ.x.y"));
        assert_eq!(store.credential_count(), 1);
    }

    #[tokio::test]
    async fn expired_cache_entry_is_refreshed_and_updated() {
        let server = MockServer::start_async().await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .body_contains("grant_type=refresh_token")
                    .body_contains("refresh_token=old-refresh");
                then.status(200).json_body(json!({
                    "access_token": "ya29.second",
                    "token_type": "Bearer",
                    "expires_in": 3599,
                }));
            })
            .await;

        let store = Arc::new(MemoryStore::new());
        let stale = OAuthToken {
            access_token: "ya29.first".to_string(),
            refresh_token: Some("old-refresh".to_string()),
            token_type: "Bearer".to_string(),
            expiry: Some(Utc::now() - Duration::minutes(5)),
            extras: TokenExtras {
                id_token: Some("eyJ.x.y".to_string()),
                user_id: None,
            },
        };
        store
            .insert_credential(&CachedCredential::new("code-1", stale))
            .await
            .expect("seeded");

        let token = exchanger(&store)
            .exchange(&config(&server), "code-1")
            .await
            .expect("refreshed");

        assert_eq!(refresh.hits_async().await, 1);
        assert_eq!(token.access_token, "ya29.second");
        assert_eq!(token.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(token.extras.id_token.as_deref(), Some("eyJ.x.y"));

        let cached = store
            .find_credential("code-1")
            .await
            .expect("reads")
            .expect("present");
        assert_eq!(cached.token.access_token, "ya29.second");
    }

    #[tokio::test]
    async fn expired_cache_entry_without_refresh_token_fails() {
        let server = MockServer::start_async().await;
        let store = Arc::new(MemoryStore::new());
        let stale = OAuthToken {
            access_token: "xoxp-1".to_string(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expiry: Some(Utc::now() - Duration::minutes(5)),
            extras: TokenExtras::default(),
        };
        store
            .insert_credential(&CachedCredential::new("code-2", stale))
            .await
            .expect("seeded");

        let err = exchanger(&store)
            .exchange(&config(&server), "code-2")
            .await
            .expect_err("cannot refresh");
        assert!(matches!(err, AuthFlowError::TokenExchangeFailed { .. }));
    }

    #[tokio::test]
    async fn rejected_grant_is_exchange_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(400).json_body(json!({
                    "error": "invalid_grant",
                    "error_description": "Bad Request",
                }));
            })
            .await;

        let store = Arc::new(MemoryStore::new());
        let err = exchanger(&store)
            .exchange(&config(&server), "used-code")
            .await
            .expect_err("rejected");
        match err {
            AuthFlowError::TokenExchangeFailed { provider, reason } => {
                assert_eq!(provider, "google");
                assert!(reason.contains("invalid_grant"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.credential_count(), 0);
    }

    #[tokio::test]
    async fn cache_write_failure_does_not_fail_the_exchange() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200)
                    .json_body(json!({ "access_token": "t", "token_type": "Bearer" }));
            })
            .await;

        let store = Arc::new(MemoryStore::new());
        store.fail_writes(true);
        let token = exchanger(&store)
            .exchange(&config(&server), "code-3")
            .await
            .expect("exchanged");
        assert_eq!(token.access_token, "t");
    }
}
