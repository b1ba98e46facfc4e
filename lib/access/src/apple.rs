//! Sign in with Apple client secret.
//!
//! Apple does not issue a static client secret. Each token request carries an
//! ES256-signed JWT derived from the team's private key, valid for at most
//! 180 days.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::error::AuthFlowError;

/// Audience Apple expects on client secrets.
pub const APPLE_AUDIENCE: &str = "https://appleid.apple.com";

/// Claims of an Apple client secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSecretClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs Apple client secrets from the configured key material.
///
/// The PEM is parsed on every call so a rotated or broken key is reported
/// where it is used.
#[derive(Clone)]
pub struct AppleSecretSigner {
    private_key_pem: String,
    team_id: String,
    client_id: String,
    key_id: String,
}

impl AppleSecretSigner {
    #[must_use]
    pub fn new(
        private_key_pem: impl Into<String>,
        team_id: impl Into<String>,
        client_id: impl Into<String>,
        key_id: impl Into<String>,
    ) -> Self {
        Self {
            private_key_pem: private_key_pem.into(),
            team_id: team_id.into(),
            client_id: client_id.into(),
            key_id: key_id.into(),
        }
    }

    /// Signs a fresh client secret valid from now.
    ///
    /// # Errors
    ///
    /// Returns [`AuthFlowError::InvalidSigningKey`] if the PEM is missing or
    /// is not a PKCS#8 P-256 key.
    pub fn sign(&self) -> Result<String, AuthFlowError> {
        self.sign_at(Utc::now())
    }

    /// Signs a client secret issued at `now`.
    ///
    /// # Errors
    ///
    /// See [`AppleSecretSigner::sign`].
    pub fn sign_at(&self, now: DateTime<Utc>) -> Result<String, AuthFlowError> {
        if self.private_key_pem.trim().is_empty() {
            return Err(AuthFlowError::InvalidSigningKey {
                reason: "no private key configured".to_string(),
            });
        }
        let key = EncodingKey::from_ec_pem(pem_bytes(&self.private_key_pem).as_bytes())
            .map_err(|e| AuthFlowError::InvalidSigningKey {
                reason: e.to_string(),
            })?;

        let claims = ClientSecretClaims {
            iss: self.team_id.clone(),
            sub: self.client_id.clone(),
            aud: APPLE_AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: (now + validity()).timestamp(),
        };
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());

        jsonwebtoken::encode(&header, &claims, &key).map_err(|e| {
            AuthFlowError::InvalidSigningKey {
                reason: e.to_string(),
            }
        })
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl fmt::Debug for AppleSecretSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppleSecretSigner")
            .field("team_id", &self.team_id)
            .field("client_id", &self.client_id)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Apple's maximum lifetime: 180 days minus one second.
fn validity() -> Duration {
    Duration::days(180) - Duration::seconds(1)
}

/// Environment variables often carry the PEM with literal `\n` sequences.
fn pem_bytes(pem: &str) -> String {
    if pem.contains("\\n") {
        pem.replace("\\n", "\n")
    } else {
        pem.to_string()
    }
}
