//! Profile and session endpoints for the signed-in user.

use axum::{Json, extract::State};
use huddle_access::UserAccount;
use huddle_core::SessionTokenId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{AppState, RequireUser};
use crate::error::ApiError;

/// The caller's account as returned by the API.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserInfo {
    pub id: String,
    pub identifier: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl From<&UserAccount> for UserInfo {
    fn from(account: &UserAccount) -> Self {
        Self {
            id: account.id().to_string(),
            identifier: account.identifier().to_string(),
            name: account.display_name().map(str::to_string),
            email: account.email().map(str::to_string),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

/// Session ids still valid after a logout.
#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub remaining: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutAllResponse {
    pub revoked: u64,
}

/// `GET /api/user`
pub async fn current_user(RequireUser(user): RequireUser) -> Json<UserInfo> {
    Json(UserInfo::from(&user.account))
}

/// `PUT /api/user/name`
pub async fn rename(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    Json(request): Json<RenameRequest>,
) -> Result<Json<UserInfo>, ApiError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest {
            reason: "name must not be empty".to_string(),
        });
    }
    let account = state
        .accounts
        .update_display_name(user.account.id(), name)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            what: "user".to_string(),
        })?;
    tracing::info!(user_id = %account.id(), "Updated display name");
    Ok(Json(UserInfo::from(&account)))
}

/// Body of `POST /api/logout`.
#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    /// Session to revoke. Defaults to the one making the request.
    #[serde(default)]
    pub session: Option<String>,
}

/// `POST /api/logout`: revokes one of the caller's sessions.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    request: Option<Json<LogoutRequest>>,
) -> Result<Json<LogoutResponse>, ApiError> {
    let user_id = user.account.id();
    let target = match request.and_then(|Json(r)| r.session) {
        Some(raw) => raw
            .parse::<SessionTokenId>()
            .map_err(|e| ApiError::BadRequest {
                reason: format!("invalid session id: {e}"),
            })?,
        None => user.token_id,
    };
    if !state.accounts.delete_token(user_id, target).await? {
        return Err(ApiError::BadRequest {
            reason: "no such session".to_string(),
        });
    }
    let remaining = state
        .accounts
        .list_tokens(user_id)
        .await?
        .iter()
        .map(|t| t.id().to_string())
        .collect();
    tracing::info!(%user_id, token_id = %target, "Logged out");
    Ok(Json(LogoutResponse { remaining }))
}

/// `POST /api/logout/all`
pub async fn logout_all(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
) -> Result<Json<LogoutAllResponse>, ApiError> {
    let user_id = user.account.id();
    let revoked = state.accounts.delete_all_tokens(user_id).await?;
    tracing::info!(%user_id, revoked, "Logged out of every session");
    Ok(Json(LogoutAllResponse { revoked }))
}
