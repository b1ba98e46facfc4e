//! Media channel credentials for signed-in callers.

use axum::{Json, extract::State};
use huddle_access::MediaCredentials;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{AppState, RequireUser};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub channel: String,
    #[serde(default)]
    pub is_screen_share: bool,
    #[serde(default)]
    pub needs_rtm: bool,
    /// Mint for the dial-in bridge instead of an app participant.
    #[serde(default)]
    pub pstn: bool,
}

/// `POST /api/channel/credentials`
pub async fn credentials(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<MediaCredentials>, ApiError> {
    let minted = if request.pstn {
        state.minter.mint_pstn(&request.channel)?
    } else {
        state
            .minter
            .mint(&request.channel, request.is_screen_share, request.needs_rtm)?
    };
    tracing::debug!(
        user_id = %user.account.id(),
        channel = %request.channel,
        uid = minted.uid,
        "Minted channel credentials"
    );
    Ok(Json(minted))
}
