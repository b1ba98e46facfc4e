//! OAuth routes: the provider callback and the authorization redirect.

use axum::{
    Form,
    extract::{OriginalUri, Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use huddle_access::{
    AuthFlowError, AuthState, Platform, ProviderKind, SessionToken, StateFields,
};
use oauth2::{CsrfToken, Scope};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;

use super::{AppState, token::build_client};
use crate::error::CallbackError;

/// Parameters a provider sends back to the callback, by query or form post.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: String,
    #[serde(default)]
    state: String,
}

/// Parameters for starting a sign-in.
#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeParams {
    #[serde(default)]
    redirect: String,
    #[serde(default)]
    backend: String,
    #[serde(default)]
    platform: Option<String>,
}

/// `GET /oauth`: provider and platform come from the state.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<CallbackParams>,
) -> Result<Response, CallbackError> {
    handle_callback(&state, params, None, uri.path()).await
}

/// `POST /oauth`: form-posted callback.
pub async fn callback_form(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    Form(params): Form<CallbackParams>,
) -> Result<Response, CallbackError> {
    handle_callback(&state, params, None, uri.path()).await
}

/// `GET /oauth/{provider}/{platform}`: the path overrides the state.
pub async fn provider_callback(
    State(state): State<Arc<AppState>>,
    Path(target): Path<(String, String)>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<CallbackParams>,
) -> Result<Response, CallbackError> {
    handle_callback(&state, params, Some(target), uri.path()).await
}

/// `POST /oauth/{provider}/{platform}`: Apple posts its callback as a form.
pub async fn provider_callback_form(
    State(state): State<Arc<AppState>>,
    Path(target): Path<(String, String)>,
    OriginalUri(uri): OriginalUri,
    Form(params): Form<CallbackParams>,
) -> Result<Response, CallbackError> {
    handle_callback(&state, params, Some(target), uri.path()).await
}

async fn handle_callback(
    state: &AppState,
    params: CallbackParams,
    target: Option<(String, String)>,
    path: &str,
) -> Result<Response, CallbackError> {
    let fail = |e: AuthFlowError| CallbackError::new(e, state.settings.expose_error_details);

    let mut auth_state = AuthState::decode(&params.code, &params.state).map_err(fail)?;
    if let Some((provider, platform)) = target {
        let platform: Platform = platform.parse().map_err(fail)?;
        auth_state = auth_state.with_provider(provider).with_platform(platform);
    }

    let token = within_deadline(state, sign_in(state, &auth_state, path))
        .await
        .map_err(fail)?;
    tracing::info!(
        provider = auth_state.provider(),
        platform = %auth_state.platform(),
        user_id = %token.user_id(),
        "Signed in"
    );

    let value = token.value().as_str();
    Ok(match auth_state.platform() {
        Platform::Web => Redirect::to(&format!("{}/{value}", auth_state.redirect())).into_response(),
        Platform::Desktop => Html(state.templates.desktop(value)).into_response(),
        Platform::Mobile => {
            Html(state.templates.mobile(value, &state.settings.scheme)).into_response()
        }
    })
}

async fn sign_in(
    state: &AppState,
    auth_state: &AuthState,
    path: &str,
) -> Result<SessionToken, AuthFlowError> {
    let redirect_uri = auth_state.redirect_uri(path);
    let (provider, resolved) = state
        .registry
        .resolve(&state.http, auth_state.provider(), &redirect_uri)
        .await?;
    let token = state
        .exchanger
        .exchange(&resolved.config, auth_state.code())
        .await?;
    let claims = provider
        .resolve_identity(&state.http, &resolved, &token)
        .await?;
    state.issuer.issue(&claims).await
}

/// `GET /oauth/{provider}/authorize`: redirects to the provider's consent page.
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(params): Query<AuthorizeParams>,
) -> Result<Redirect, CallbackError> {
    let fail = |e: AuthFlowError| CallbackError::new(e, state.settings.expose_error_details);

    let kind: ProviderKind = provider.parse().map_err(fail)?;
    let platform: Platform = match params.platform.as_deref() {
        None | Some("") => Platform::default(),
        Some(p) => p.parse().map_err(fail)?,
    };
    let backend = params.backend.trim_end_matches('/').to_string();
    if params.redirect.is_empty() || backend.is_empty() {
        return Err(fail(AuthFlowError::MalformedState {
            reason: "redirect and backend are required".to_string(),
        }));
    }

    let encoded = AuthState::encode(&StateFields {
        redirect: params.redirect,
        backend: backend.clone(),
        site: kind.to_string(),
        platform,
    });
    let redirect_uri = format!("{backend}/oauth/{kind}/{platform}");

    let lookup = state
        .registry
        .resolve(&state.http, kind.as_str(), &redirect_uri);
    let (_, resolved) = within_deadline(&state, lookup).await.map_err(fail)?;

    let client = build_client(&resolved.config).map_err(fail)?;
    let mut request = client.authorize_url(move || CsrfToken::new(encoded));
    for scope in resolved.config.scope_list() {
        request = request.add_scope(Scope::new(scope.to_string()));
    }
    if kind == ProviderKind::Apple {
        // Apple only returns email and name scopes through a form post.
        request = request.add_extra_param("response_mode", "form_post");
    }
    let (url, _) = request.url();

    tracing::debug!(provider = %kind, %platform, "Redirecting to provider");
    Ok(Redirect::to(url.as_str()))
}

async fn within_deadline<T>(
    state: &AppState,
    work: impl Future<Output = Result<T, AuthFlowError>>,
) -> Result<T, AuthFlowError> {
    tokio::time::timeout(state.settings.callback_timeout, work)
        .await
        .unwrap_or(Err(AuthFlowError::Timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::router;
    use crate::auth::provider::testing::mock_discovery;
    use crate::auth::provider::{GoogleProvider, SlackProvider};
    use crate::auth::{ProviderRegistry, testing};
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
    };
    use httpmock::prelude::*;
    use huddle_access::store::MemoryStore;
    use serde_json::json;
    use tower::ServiceExt;

    const GOOGLE_STATE: &str =
        "redirect%3Dhttps%3A%2F%2Fapp.example%2Fdone%26backend%3Dhttps%3A%2F%2Fapi.example.com%2F";

    async fn mock_google(server: &MockServer) {
        mock_discovery(server).await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .body_contains("code=4%2F0AX4XfWh")
                    .body_contains("redirect_uri=https%3A%2F%2Fapi.example.com%2Foauth");
                then.status(200).json_body(json!({
                    "access_token": "ya29.a0Af",
                    "token_type": "Bearer",
                    "expires_in": 3599,
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/userinfo");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({
                        "sub": "110169484474386276334",
                        "name": "Ann Example",
                        "email": "ann@co.com",
                        "email_verified": true,
                    }));
            })
            .await;
    }

    fn google_registry(server: &MockServer) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(GoogleProvider::new("client", "secret").with_issuer(server.base_url()));
        registry
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Option<String>, String) {
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|l| l.to_str().ok())
            .map(str::to_string);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, location, String::from_utf8(body.to_vec()).expect("utf8"))
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn google_web_login_redirects_with_token() {
        let server = MockServer::start_async().await;
        mock_google(&server).await;
        let store = Arc::new(MemoryStore::new());
        let app = router(testing::state(google_registry(&server), &store, json!({})));

        let (status, location, _) = send(
            app,
            get_request(&format!("/oauth?code=4%2F0AX4XfWh&state={GOOGLE_STATE}")),
        )
        .await;

        assert_eq!(status, StatusCode::SEE_OTHER);
        let location = location.expect("location header");
        let token = location
            .strip_prefix("https://app.example/done/")
            .expect("redirects to the app");
        assert_eq!(token.len(), 36);
        assert_eq!(store.user_count(), 1);
        assert_eq!(store.token_count(), 1);
    }

    #[tokio::test]
    async fn desktop_form_post_renders_template() {
        let server = MockServer::start_async().await;
        mock_discovery(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .body_contains("redirect_uri=https%3A%2F%2Fapi.example.com%2Foauth%2Fgoogle%2Fdesktop");
                then.status(200)
                    .json_body(json!({ "access_token": "ya29", "token_type": "Bearer" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/userinfo");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({ "sub": "1", "email": "ann@co.com", "email_verified": true }));
            })
            .await;
        let store = Arc::new(MemoryStore::new());
        let app = router(testing::state(google_registry(&server), &store, json!({})));

        let request = Request::builder()
            .method("POST")
            .uri("/oauth/google/desktop")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("code=abc&state={GOOGLE_STATE}")))
            .expect("request");
        let (status, _, body) = send(app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("huddle-token"));
        assert!(!body.contains("{token}"));
        assert_eq!(store.token_count(), 1);
    }

    #[tokio::test]
    async fn malformed_state_is_a_bad_request() {
        let store = Arc::new(MemoryStore::new());
        let app = router(testing::state(ProviderRegistry::new(), &store, json!({})));

        let (status, _, body) = send(app, get_request("/oauth?code=abc&state=backend%3Dx")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "invalid sign-in request");
    }

    #[tokio::test]
    async fn unknown_platform_in_path_is_a_bad_request() {
        let store = Arc::new(MemoryStore::new());
        let app = router(testing::state(ProviderRegistry::new(), &store, json!({})));

        let (status, _, _) = send(
            app,
            get_request(&format!("/oauth/google/tv?code=abc&state={GOOGLE_STATE}")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn disabled_provider_is_rejected_without_writes() {
        let store = Arc::new(MemoryStore::new());
        let app = router(testing::state(ProviderRegistry::new(), &store, json!({})));

        let (status, _, _) = send(
            app,
            get_request(&format!("/oauth?code=abc&state={GOOGLE_STATE}")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(store.user_count(), 0);
    }

    #[tokio::test]
    async fn disallowed_email_gets_policy_message() {
        let server = MockServer::start_async().await;
        mock_google(&server).await;
        let store = Arc::new(MemoryStore::new());
        let app = router(testing::state(
            google_registry(&server),
            &store,
            json!({ "allow_list": ["*@partner.org"] }),
        ));

        let (status, _, body) = send(
            app,
            get_request(&format!("/oauth?code=4%2F0AX4XfWh&state={GOOGLE_STATE}")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "your email is not authorized");
        assert_eq!(store.user_count(), 0);
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start_async().await;
        mock_discovery(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200)
                    .delay(std::time::Duration::from_secs(3))
                    .json_body(json!({ "access_token": "late", "token_type": "Bearer" }));
            })
            .await;
        let store = Arc::new(MemoryStore::new());
        let app = router(testing::state(
            google_registry(&server),
            &store,
            json!({ "callback_timeout_seconds": 1 }),
        ));

        let (status, _, _) = send(
            app,
            get_request(&format!("/oauth?code=abc&state={GOOGLE_STATE}")),
        )
        .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn authorize_redirects_with_encoded_state() {
        let store = Arc::new(MemoryStore::new());
        let mut registry = ProviderRegistry::new();
        registry.register(SlackProvider::new("slack-client", "secret"));
        let app = router(testing::state(registry, &store, json!({})));

        let (status, location, _) = send(
            app,
            get_request(
                "/oauth/slack/authorize?redirect=https%3A%2F%2Fapp.example%2Fdone&backend=https%3A%2F%2Fapi.example.com%2F&platform=mobile",
            ),
        )
        .await;

        assert_eq!(status, StatusCode::SEE_OTHER);
        let location = location.expect("location header");
        assert!(location.starts_with("https://slack.com/oauth/authorize?"));
        assert!(location.contains("client_id=slack-client"));
        assert!(location.contains(
            "redirect_uri=https%3A%2F%2Fapi.example.com%2Foauth%2Fslack%2Fmobile"
        ));

        let url = reqwest::Url::parse(&location).expect("url");
        let raw_state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .expect("state param");
        let decoded = AuthState::decode("code", &raw_state).expect("decodes");
        assert_eq!(decoded.redirect(), "https://app.example/done");
        assert_eq!(decoded.backend(), "https://api.example.com");
        assert_eq!(decoded.provider(), "slack");
        assert_eq!(decoded.platform(), Platform::Mobile);
    }

    #[tokio::test]
    async fn authorize_rejects_unknown_provider() {
        let store = Arc::new(MemoryStore::new());
        let app = router(testing::state(ProviderRegistry::new(), &store, json!({})));
        let (status, _, _) = send(
            app,
            get_request("/oauth/github/authorize?redirect=https%3A%2F%2Fa&backend=https%3A%2F%2Fb"),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
