//! Error types for the sign-in flow and its persistence seams.
//!
//! - `AuthFlowError`: every failure the callback flow can produce, each
//!   tagged with an [`ErrorClass`] that the HTTP layer maps to a status code.
//! - `StoreError`: failures from the account/credential stores.

use std::fmt;

/// Broad failure classes of the sign-in flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The caller sent a malformed request.
    Caller,
    /// Operator configuration is wrong; needs attention, not a retry.
    Config,
    /// An identity provider failed or misbehaved.
    Upstream,
    /// The user is not permitted to sign in.
    Policy,
    /// Persistence failed.
    Data,
}

/// Errors from the OAuth callback flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFlowError {
    /// The `code`/`state` parameters are missing or malformed.
    MalformedState { reason: String },
    /// The requested provider is not one we know.
    UnknownProvider { name: String },
    /// The provider is known but switched off by the operator.
    ProviderDisabled { provider: String },
    /// A provider is enabled without a client id or secret.
    MissingClientCredentials { provider: String },
    /// The Apple signing key could not be parsed or used.
    InvalidSigningKey { reason: String },
    /// An allow-list pattern failed to compile.
    InvalidAllowListPattern { pattern: String, reason: String },
    /// Provider wiring is inconsistent (e.g. missing discovery handle).
    InternalConfig { reason: String },
    /// Discovery of the provider's metadata failed.
    ProviderUnavailable { provider: String, reason: String },
    /// The authorization-code or refresh grant failed.
    TokenExchangeFailed { provider: String, reason: String },
    /// The ID token was missing or failed verification.
    InvalidIdToken { reason: String },
    /// The provider answered with an explicit API error.
    ProviderApi { provider: String, error: String },
    /// Fetching or parsing the user profile failed.
    UserInfoFailed { provider: String, reason: String },
    /// The whole callback ran past its deadline.
    Timeout,
    /// The resolved email matched no allow-list pattern.
    EmailNotAllowed { email: String },
    /// The provider reports the email as unverified.
    EmailNotVerified { subject: String },
    /// A persistence call failed.
    Storage { details: String },
}

impl AuthFlowError {
    /// Returns the failure class used for status mapping and alerting.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::MalformedState { .. } | Self::ProviderDisabled { .. } => ErrorClass::Caller,
            Self::UnknownProvider { .. }
            | Self::MissingClientCredentials { .. }
            | Self::InvalidSigningKey { .. }
            | Self::InvalidAllowListPattern { .. }
            | Self::InternalConfig { .. } => ErrorClass::Config,
            Self::ProviderUnavailable { .. }
            | Self::TokenExchangeFailed { .. }
            | Self::InvalidIdToken { .. }
            | Self::ProviderApi { .. }
            | Self::UserInfoFailed { .. }
            | Self::Timeout => ErrorClass::Upstream,
            Self::EmailNotAllowed { .. } | Self::EmailNotVerified { .. } => ErrorClass::Policy,
            Self::Storage { .. } => ErrorClass::Data,
        }
    }

    /// Returns a stable message that is safe to show an end user.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmailNotAllowed { .. } => "your email is not authorized",
            Self::EmailNotVerified { .. } => "please verify your email with the provider",
            _ if self.class() == ErrorClass::Caller => "invalid sign-in request",
            _ => "could not sign you in",
        }
    }
}

impl fmt::Display for AuthFlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedState { reason } => write!(f, "malformed state: {reason}"),
            Self::UnknownProvider { name } => write!(f, "unknown provider '{name}'"),
            Self::ProviderDisabled { provider } => {
                write!(f, "provider '{provider}' is not enabled")
            }
            Self::MissingClientCredentials { provider } => {
                write!(f, "provider '{provider}' has no client id or client secret")
            }
            Self::InvalidSigningKey { reason } => write!(f, "invalid signing key: {reason}"),
            Self::InvalidAllowListPattern { pattern, reason } => {
                write!(f, "invalid allow-list pattern '{pattern}': {reason}")
            }
            Self::InternalConfig { reason } => write!(f, "internal configuration error: {reason}"),
            Self::ProviderUnavailable { provider, reason } => {
                write!(f, "provider '{provider}' unavailable: {reason}")
            }
            Self::TokenExchangeFailed { provider, reason } => {
                write!(f, "token exchange with '{provider}' failed: {reason}")
            }
            Self::InvalidIdToken { reason } => write!(f, "invalid id token: {reason}"),
            Self::ProviderApi { provider, error } => {
                write!(f, "provider '{provider}' API error: {error}")
            }
            Self::UserInfoFailed { provider, reason } => {
                write!(f, "fetching user info from '{provider}' failed: {reason}")
            }
            Self::Timeout => write!(f, "sign-in timed out"),
            Self::EmailNotAllowed { email } => write!(f, "email '{email}' not found in allow list"),
            Self::EmailNotVerified { subject } => {
                write!(f, "email is not verified for subject '{subject}'")
            }
            Self::Storage { details } => write!(f, "storage error: {details}"),
        }
    }
}

impl std::error::Error for AuthFlowError {}

impl From<StoreError> for AuthFlowError {
    fn from(err: StoreError) -> Self {
        Self::Storage {
            details: err.to_string(),
        }
    }
}

/// Errors from the account and credential stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing database rejected or failed the operation.
    Database { details: String },
    /// A stored row could not be decoded into its domain type.
    Corrupt { details: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database { details } => write!(f, "database error: {details}"),
            Self::Corrupt { details } => write!(f, "corrupt row: {details}"),
        }
    }
}

impl std::error::Error for StoreError {}
