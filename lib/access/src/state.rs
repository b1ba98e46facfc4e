//! The opaque OAuth `state` parameter.
//!
//! The state is a URL-escaped query string carrying where to send the user
//! after login (`redirect`), the public base URL of this backend (`backend`),
//! the provider (`site`) and the client platform (`platform`).

use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::error::AuthFlowError;

/// Provider assumed when the state does not name one.
pub const DEFAULT_SITE: &str = "google";

/// The client platform a login was started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Web,
    Desktop,
    Mobile,
}

impl Platform {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = AuthFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Self::Web),
            "desktop" => Ok(Self::Desktop),
            "mobile" => Ok(Self::Mobile),
            other => Err(malformed(format!("unknown platform '{other}'"))),
        }
    }
}

/// Fields carried inside the encoded state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateFields {
    pub redirect: String,
    pub backend: String,
    pub site: String,
    pub platform: Platform,
}

/// A decoded callback: the authorization code plus the state it came with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    code: String,
    redirect: String,
    backend: String,
    provider: String,
    platform: Platform,
}

impl AuthState {
    /// Decodes the raw `state` value that accompanied `code` on a callback.
    ///
    /// # Errors
    ///
    /// Returns [`AuthFlowError::MalformedState`] when either value is empty,
    /// the state cannot be unescaped, `redirect` or `backend` is missing, or
    /// the platform is not recognised.
    pub fn decode(code: &str, raw_state: &str) -> Result<Self, AuthFlowError> {
        if code.is_empty() {
            return Err(malformed("code is empty"));
        }
        if raw_state.is_empty() {
            return Err(malformed("state is empty"));
        }

        let query = unescape(raw_state)?;
        check_escapes(&query)?;

        let mut redirect = None;
        let mut backend = None;
        let mut site = None;
        let mut platform = None;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "redirect" => &mut redirect,
                "backend" => &mut backend,
                "site" => &mut site,
                "platform" => &mut platform,
                _ => continue,
            };
            // First occurrence wins, as with standard query parsing.
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        let redirect = redirect
            .filter(|r| !r.is_empty())
            .ok_or_else(|| malformed("redirect is missing"))?;
        let backend = backend.unwrap_or_default();
        let backend = backend.strip_suffix('/').unwrap_or(&backend).to_string();
        if backend.is_empty() {
            return Err(malformed("backend is missing"));
        }
        let provider = site
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SITE.to_string());
        let platform = match platform.as_deref() {
            None | Some("") => Platform::default(),
            Some(p) => p.parse()?,
        };

        Ok(Self {
            code: code.to_string(),
            redirect,
            backend,
            provider,
            platform,
        })
    }

    /// Encodes state fields into the value sent as the OAuth `state` parameter.
    #[must_use]
    pub fn encode(fields: &StateFields) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("redirect", &fields.redirect)
            .append_pair("backend", &fields.backend)
            .append_pair("site", &fields.site)
            .append_pair("platform", fields.platform.as_str())
            .finish();
        form_urlencoded::byte_serialize(query.as_bytes()).collect()
    }

    /// Overrides the provider, used when the callback path names it.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Overrides the platform, used when the callback path names it.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn redirect(&self) -> &str {
        &self.redirect
    }

    /// Backend base URL without a trailing slash.
    #[must_use]
    pub fn backend(&self) -> &str {
        &self.backend
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Builds the redirect URI the provider saw for this callback.
    #[must_use]
    pub fn redirect_uri(&self, path: &str) -> String {
        format!("{}{}", self.backend, path)
    }
}

fn malformed(reason: impl Into<String>) -> AuthFlowError {
    AuthFlowError::MalformedState {
        reason: reason.into(),
    }
}

/// Query-unescapes `raw`: `+` becomes a space and `%XX` must be well formed.
fn unescape(raw: &str) -> Result<String, AuthFlowError> {
    check_escapes(raw)?;
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| malformed(format!("state is not valid UTF-8: {e}")))
}

fn check_escapes(s: &str) -> Result<(), AuthFlowError> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return Err(malformed(format!("invalid escape at offset {i}")));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}
