//! HTTP routing.

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{AppState, middleware::authenticate, routes};
use crate::{channel, user};

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/oauth", get(routes::callback).post(routes::callback_form))
        .route("/oauth/{provider}/authorize", get(routes::authorize))
        .route(
            "/oauth/{provider}/{platform}",
            get(routes::provider_callback).post(routes::provider_callback_form),
        )
        .route("/api/user", get(user::current_user))
        .route("/api/user/name", put(user::rename))
        .route("/api/logout", post(user::logout))
        .route("/api/logout/all", post(user::logout_all))
        .route("/api/channel/credentials", post(channel::credentials))
        .route("/health", get(health))
        .layer(from_fn_with_state(state.clone(), authenticate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
