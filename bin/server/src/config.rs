//! Centralized server configuration.
//!
//! Loaded via the `config` crate from an optional `config.json` (or any other
//! format named `config.*` in the working directory) and then the process
//! environment, which wins. Keys are the upper-case environment names,
//! e.g. `GOOGLE_CLIENT_ID`.

use serde::Deserialize;

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Apply pending migrations on startup.
    #[serde(default)]
    pub run_migration: bool,

    /// Global authentication switch. Defaults to on iff any provider is enabled.
    #[serde(default)]
    pub enable_oauth: Option<bool>,

    #[serde(default)]
    pub enable_google_oauth: bool,
    #[serde(default)]
    pub enable_microsoft_oauth: bool,
    #[serde(default)]
    pub enable_slack_oauth: bool,
    #[serde(default)]
    pub enable_apple_oauth: bool,

    #[serde(default)]
    pub google_client_id: String,
    #[serde(default)]
    pub google_client_secret: String,

    #[serde(default)]
    pub microsoft_client_id: String,
    #[serde(default)]
    pub microsoft_client_secret: String,
    /// Azure AD tenant used for the v2 endpoints.
    #[serde(default = "default_microsoft_tenant")]
    pub microsoft_tenant: String,

    #[serde(default)]
    pub slack_client_id: String,
    #[serde(default)]
    pub slack_client_secret: String,

    #[serde(default)]
    pub apple_client_id: String,
    #[serde(default)]
    pub apple_team_id: String,
    #[serde(default)]
    pub apple_key_id: String,
    /// PKCS#8 PEM; literal `\n` sequences are accepted.
    #[serde(default)]
    pub apple_private_key: String,

    /// Email glob patterns. Unset means allow everyone.
    #[serde(default)]
    pub allow_list: Option<Vec<String>>,

    /// Custom URL scheme the mobile app registers for deep links.
    pub scheme: String,

    /// Media service app id and certificate used to sign channel tokens.
    pub app_id: String,
    pub app_certificate: String,

    /// Timeout for each outbound HTTP call to a provider.
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,

    /// Deadline for a whole OAuth callback.
    #[serde(default = "default_callback_timeout_seconds")]
    pub callback_timeout_seconds: u64,

    /// Paths of HTML templates overriding the built-in ones.
    #[serde(default)]
    pub desktop_template: Option<String>,
    #[serde(default)]
    pub mobile_template: Option<String>,

    /// Return raw error text in sign-in failure responses. Debug only.
    #[serde(default)]
    pub expose_error_details: bool,
}

fn default_port() -> u16 {
    8080
}

fn default_microsoft_tenant() -> String {
    "common".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    10
}

fn default_callback_timeout_seconds() -> u64 {
    30
}

/// Where the effective allow-list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowListSource {
    /// `ALLOW_LIST` was not set; everyone is allowed.
    Default,
    /// `ALLOW_LIST` was set but contained no patterns; nobody is allowed.
    ExplicitlyEmpty,
    Configured,
}

impl ServerConfig {
    /// Loads configuration from `config.*` and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(config::Environment::default())
    }

    fn load(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                environment
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("allow_list"),
            )
            .build()?
            .try_deserialize()
    }

    /// Whether any individual provider is switched on.
    #[must_use]
    pub fn any_provider_enabled(&self) -> bool {
        self.enable_google_oauth
            || self.enable_microsoft_oauth
            || self.enable_slack_oauth
            || self.enable_apple_oauth
    }

    /// Whether bearer authentication is active at all.
    #[must_use]
    pub fn oauth_enabled(&self) -> bool {
        self.enable_oauth
            .unwrap_or_else(|| self.any_provider_enabled())
    }

    /// Effective allow-list patterns and where they came from.
    #[must_use]
    pub fn allow_list_patterns(&self) -> (Vec<String>, AllowListSource) {
        match &self.allow_list {
            None => (
                vec![huddle_access::allow_list::ALLOW_ALL.to_string()],
                AllowListSource::Default,
            ),
            Some(patterns) => {
                let patterns: Vec<String> = patterns
                    .iter()
                    .map(|p| p.trim())
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect();
                if patterns.is_empty() {
                    (patterns, AllowListSource::ExplicitlyEmpty)
                } else {
                    (patterns, AllowListSource::Configured)
                }
            }
        }
    }
}
