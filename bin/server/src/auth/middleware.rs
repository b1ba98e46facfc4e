//! Bearer-token authentication middleware and extractors for Axum.
//!
//! [`authenticate`] is fail-open: a request without a usable token proceeds
//! anonymously. Handlers that need a user say so with [`RequireUser`].

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{Method, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use huddle_access::{TokenValue, UserAccount};
use huddle_core::SessionTokenId;
use std::convert::Infallible;
use std::sync::Arc;

use super::AppState;
use crate::error::ApiError;

const BEARER_PREFIX: &str = "Bearer ";

/// The authenticated caller and the token it presented.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub account: UserAccount,
    pub token_id: SessionTokenId,
}

/// Resolves `Authorization: Bearer <token>` into a [`CurrentUser`] request
/// extension.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if !state.settings.oauth_enabled || request.method() == Method::OPTIONS {
        return next.run(request).await;
    }
    let Some(header) = request.headers().get(AUTHORIZATION) else {
        return next.run(request).await;
    };
    let Some(value) = header
        .to_str()
        .ok()
        .and_then(|h| h.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|v| !v.is_empty())
    else {
        return ApiError::BadRequest {
            reason: "authorization header must use the Bearer scheme".to_string(),
        }
        .into_response();
    };

    if let Some(user) = resolve(&state, TokenValue::from(value)).await {
        request.extensions_mut().insert(user);
    }
    next.run(request).await
}

async fn resolve(state: &AppState, value: TokenValue) -> Option<CurrentUser> {
    let token = match state.accounts.find_token(&value).await {
        Ok(Some(token)) => token,
        Ok(None) => {
            tracing::debug!("Unknown bearer token");
            return None;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to look up bearer token");
            return None;
        }
    };
    match state.accounts.find_user(token.user_id()).await {
        Ok(Some(account)) => Some(CurrentUser {
            account,
            token_id: token.id(),
        }),
        Ok(None) => {
            tracing::error!(
                token_id = %token.id(),
                user_id = %token.user_id(),
                "Bearer token refers to a missing user"
            );
            None
        }
        Err(e) => {
            tracing::error!(token_id = %token.id(), error = %e, "Failed to load user for token");
            None
        }
    }
}

/// Extractor for optionally getting the authenticated user.
pub struct OptionalUser(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalUser(parts.extensions.get::<CurrentUser>().cloned()))
    }
}

/// Extractor for requiring an authenticated user.
///
/// Rejects with `401 Unauthorized` when the request is anonymous.
pub struct RequireUser(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let OptionalUser(user) = OptionalUser::from_request_parts(parts, state)
            .await
            .unwrap_or(OptionalUser(None));
        user.map(RequireUser).ok_or(ApiError::Unauthorized)
    }
}
