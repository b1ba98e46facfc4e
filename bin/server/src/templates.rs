//! HTML pages returned to desktop and mobile clients after sign-in.
//!
//! Templates are plain HTML with `{token}` and `{scheme}` placeholders. The
//! built-in pages can be replaced by files named in configuration.

use crate::error::StartupError;

const DEFAULT_DESKTOP: &str = include_str!("../templates/desktop.html");
const DEFAULT_MOBILE: &str = include_str!("../templates/mobile.html");

#[derive(Debug, Clone)]
pub struct Templates {
    desktop: String,
    mobile: String,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            desktop: DEFAULT_DESKTOP.to_string(),
            mobile: DEFAULT_MOBILE.to_string(),
        }
    }
}

impl Templates {
    /// Loads the templates, falling back to the built-in page for each path
    /// that is not set.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::Template`] if a configured file cannot be read.
    pub fn load(desktop: Option<&str>, mobile: Option<&str>) -> Result<Self, StartupError> {
        Ok(Self {
            desktop: read_or(desktop, DEFAULT_DESKTOP)?,
            mobile: read_or(mobile, DEFAULT_MOBILE)?,
        })
    }

    #[must_use]
    pub fn desktop(&self, token: &str) -> String {
        self.desktop.replace("{token}", token)
    }

    #[must_use]
    pub fn mobile(&self, token: &str, scheme: &str) -> String {
        self.mobile
            .replace("{scheme}", scheme)
            .replace("{token}", token)
    }
}

fn read_or(path: Option<&str>, default: &str) -> Result<String, StartupError> {
    match path.filter(|p| !p.is_empty()) {
        Some(path) => {
            let body = std::fs::read_to_string(path).map_err(|e| StartupError::Template {
                path: path.to_string(),
                details: e.to_string(),
            })?;
            tracing::info!(path, "Loaded page template");
            Ok(body)
        }
        None => Ok(default.to_string()),
    }
}
