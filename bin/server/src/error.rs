//! HTTP error mapping.
//!
//! Sign-in failures carry an [`AuthFlowError`]; this module is the single
//! place that turns its class into a status code and a response body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use huddle_access::{AuthFlowError, ErrorClass, MediaTokenError, StoreError};
use serde_json::json;
use std::fmt;

/// A failed OAuth callback, rendered as a plain-text response.
#[derive(Debug)]
pub struct CallbackError {
    error: AuthFlowError,
    expose_details: bool,
}

impl CallbackError {
    #[must_use]
    pub fn new(error: AuthFlowError, expose_details: bool) -> Self {
        Self {
            error,
            expose_details,
        }
    }

    #[must_use]
    pub fn error(&self) -> &AuthFlowError {
        &self.error
    }
}

/// Status code for a sign-in failure.
#[must_use]
pub fn status_for(error: &AuthFlowError) -> StatusCode {
    match error.class() {
        ErrorClass::Caller | ErrorClass::Policy => StatusCode::BAD_REQUEST,
        ErrorClass::Upstream if matches!(error, AuthFlowError::Timeout) => {
            StatusCode::GATEWAY_TIMEOUT
        }
        ErrorClass::Config | ErrorClass::Upstream | ErrorClass::Data => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        let error = &self.error;
        match error.class() {
            ErrorClass::Config => {
                tracing::error!(alert = true, error = %error, "sign-in misconfigured");
            }
            ErrorClass::Upstream | ErrorClass::Data => {
                tracing::error!(error = %error, "sign-in failed");
            }
            ErrorClass::Caller | ErrorClass::Policy => {
                tracing::info!(error = %error, "sign-in rejected");
            }
        }

        let body = if self.expose_details {
            error.to_string()
        } else {
            error.user_message().to_string()
        };
        (status_for(error), body).into_response()
    }
}

/// Errors from the JSON API endpoints.
#[derive(Debug)]
pub enum ApiError {
    /// No authenticated user on the request.
    Unauthorized,
    /// The request body or parameters are invalid.
    BadRequest { reason: String },
    /// The referenced resource does not exist.
    NotFound { what: String },
    /// Storage failed.
    Storage { details: String },
    /// Minting media credentials failed.
    Media { details: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "not authenticated"),
            Self::BadRequest { reason } => write!(f, "bad request: {reason}"),
            Self::NotFound { what } => write!(f, "{what} not found"),
            Self::Storage { details } => write!(f, "storage error: {details}"),
            Self::Media { details } => write!(f, "media credential error: {details}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Storage {
            details: err.to_string(),
        }
    }
}

impl From<MediaTokenError> for ApiError {
    fn from(err: MediaTokenError) -> Self {
        match err {
            MediaTokenError::EmptyChannel => Self::BadRequest {
                reason: err.to_string(),
            },
            MediaTokenError::Signing { .. } => Self::Media {
                details: err.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "not authenticated".to_string()),
            Self::BadRequest { reason } => (StatusCode::BAD_REQUEST, reason.clone()),
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Storage { details } => {
                tracing::error!("Database error: {}", details);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            Self::Media { details } => {
                tracing::error!("Media credential error: {}", details);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Errors that stop the server from starting.
#[derive(Debug)]
pub enum StartupError {
    /// An allow-list pattern or provider setting is invalid.
    InvalidAuthConfig { details: String },
    /// A configured template could not be read.
    Template { path: String, details: String },
    /// The outbound HTTP client could not be built.
    HttpClient { details: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAuthConfig { details } => {
                write!(f, "invalid authentication config: {details}")
            }
            Self::Template { path, details } => {
                write!(f, "failed to read template '{path}': {details}")
            }
            Self::HttpClient { details } => write!(f, "failed to build HTTP client: {details}"),
        }
    }
}

impl std::error::Error for StartupError {}
