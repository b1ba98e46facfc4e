//! Sign-in and bearer-token authentication.
//!
//! The callback flow runs state decoding, provider lookup, code exchange,
//! identity resolution and token issuance in that order. Every later API
//! call is authenticated by [`middleware::authenticate`], which resolves the
//! bearer token to a [`middleware::CurrentUser`].

pub mod db;
pub mod exchange;
pub mod issuer;
pub mod middleware;
pub mod provider;
pub mod routes;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use huddle_access::{AccountStore, AllowList, CredentialMinter, CredentialStore, HmacTokenBuilder};
use rootcause::prelude::Report;

use crate::config::{AllowListSource, ServerConfig};
use crate::error::StartupError;
use crate::templates::Templates;

pub use exchange::TokenExchanger;
pub use issuer::SessionIssuer;
pub use middleware::{CurrentUser, OptionalUser, RequireUser};
pub use provider::ProviderRegistry;

/// Runtime switches derived from configuration.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// When false, bearer tokens are ignored and every request is anonymous.
    pub oauth_enabled: bool,
    /// URL scheme substituted into the mobile template.
    pub scheme: String,
    pub expose_error_details: bool,
    /// Deadline for a whole callback.
    pub callback_timeout: Duration,
}

/// Shared application state.
pub struct AppState {
    pub registry: ProviderRegistry,
    pub exchanger: TokenExchanger,
    pub issuer: SessionIssuer,
    pub accounts: Arc<dyn AccountStore>,
    /// Outbound client for every provider call.
    pub http: reqwest::Client,
    pub settings: AuthSettings,
    pub templates: Templates,
    pub minter: CredentialMinter<HmacTokenBuilder>,
}

impl AppState {
    /// Builds the state from configuration, enabling the configured providers.
    ///
    /// # Errors
    ///
    /// Fails if the allow-list does not compile, a template cannot be read,
    /// or the HTTP client cannot be built.
    pub fn from_config(
        config: &ServerConfig,
        accounts: Arc<dyn AccountStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, Report<StartupError>> {
        Self::with_registry(
            config,
            ProviderRegistry::from_config(config),
            accounts,
            credentials,
        )
    }

    /// Builds the state with an explicit provider registry.
    ///
    /// # Errors
    ///
    /// See [`AppState::from_config`].
    pub fn with_registry(
        config: &ServerConfig,
        registry: ProviderRegistry,
        accounts: Arc<dyn AccountStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, Report<StartupError>> {
        let allow_list = build_allow_list(config)?;
        let templates = Templates::load(
            config.desktop_template.as_deref(),
            config.mobile_template.as_deref(),
        )?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| StartupError::HttpClient {
                details: e.to_string(),
            })?;

        let settings = AuthSettings {
            oauth_enabled: config.oauth_enabled(),
            scheme: config.scheme.clone(),
            expose_error_details: config.expose_error_details,
            callback_timeout: Duration::from_secs(config.callback_timeout_seconds),
        };
        if settings.oauth_enabled && registry.kinds().is_empty() {
            tracing::warn!("Authentication is enabled but no identity provider is configured");
        }
        if !settings.oauth_enabled {
            tracing::warn!("Authentication is disabled; bearer tokens are ignored");
        }
        if settings.expose_error_details {
            tracing::warn!("Sign-in failures will return raw error details");
        }

        Ok(Self {
            registry,
            exchanger: TokenExchanger::new(credentials, http.clone()),
            issuer: SessionIssuer::new(accounts.clone(), allow_list),
            accounts,
            http,
            settings,
            templates,
            minter: CredentialMinter::new(HmacTokenBuilder::new(
                config.app_id.clone(),
                config.app_certificate.clone(),
            )),
        })
    }
}

fn build_allow_list(config: &ServerConfig) -> Result<AllowList, StartupError> {
    let (patterns, source) = config.allow_list_patterns();
    match source {
        AllowListSource::Default => {
            tracing::warn!("ALLOW_LIST is not set; every email is allowed");
        }
        AllowListSource::ExplicitlyEmpty => {
            tracing::warn!("ALLOW_LIST is empty; every sign-in will be rejected");
        }
        AllowListSource::Configured => {
            tracing::info!(patterns = patterns.len(), "Loaded email allow-list");
        }
    }
    AllowList::compile(&patterns).map_err(|e| StartupError::InvalidAuthConfig {
        details: e.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! State fixtures for handler tests.

    use super::*;
    use huddle_access::store::MemoryStore;
    use serde_json::json;

    pub fn config(overrides: serde_json::Value) -> ServerConfig {
        let mut base = json!({
            "database_url": "postgres://localhost/huddle",
            "scheme": "huddle",
            "app_id": "app",
            "app_certificate": "cert",
            "enable_oauth": true,
            "allow_list": ["*@co.com"],
        });
        if let (Some(base), Some(overrides)) = (base.as_object_mut(), overrides.as_object()) {
            for (key, value) in overrides {
                base.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(base).expect("valid test config")
    }

    pub fn state(
        registry: ProviderRegistry,
        store: &Arc<MemoryStore>,
        overrides: serde_json::Value,
    ) -> Arc<AppState> {
        let state = AppState::with_registry(&config(overrides), registry, store.clone(), store.clone())
            .expect("test state");
        Arc::new(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invalid_template_path_fails_startup() {
        let config = testing::config(json!({ "desktop_template": "/nonexistent/desktop.html" }));
        let store = Arc::new(huddle_access::store::MemoryStore::new());
        let result = AppState::from_config(&config, store.clone(), store);
        assert!(result.is_err());
    }

    #[test]
    fn settings_follow_config() {
        let store = Arc::new(huddle_access::store::MemoryStore::new());
        let state = testing::state(
            ProviderRegistry::new(),
            &store,
            json!({ "callback_timeout_seconds": 5, "expose_error_details": true }),
        );
        assert!(state.settings.oauth_enabled);
        assert_eq!(state.settings.callback_timeout, Duration::from_secs(5));
        assert!(state.settings.expose_error_details);
        assert_eq!(state.settings.scheme, "huddle");
    }
}
