//! Error types for the check-in service
//!
//! [`Error`] covers startup and infrastructure failures (configuration, key
//! generation, storage, I/O). [`ApiError`] is the request-boundary taxonomy:
//! every expected failure of a handler is one of its variants and renders as a
//! structured JSON body.

use std::io;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Result type alias for the check-in service
pub type Result<T> = std::result::Result<T, Error>;

/// Service errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing key generation or export failed (fatal at startup)
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// User store backend failure
    #[error("Store error: {0}")]
    Store(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors surfaced to HTTP clients.
///
/// `Display` is the client-facing message. Token failures all collapse into
/// [`ApiError::Unauthorized`]; the reason is only ever logged.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed request input (400)
    #[error("{message}")]
    Validation {
        /// Summary shown as `error`
        message: String,
        /// Individual unmet rules, shown as `details` when non-empty
        details: Vec<String>,
    },

    /// Signup with an email that is already registered (400)
    #[error("User already exists with this email")]
    DuplicateEmail,

    /// Login failed; never says whether the user exists (401)
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Missing, malformed, expired or badly signed token (401)
    #[error("Invalid or missing authorization token")]
    Unauthorized,

    /// Valid token, role not allowed (403)
    #[error("User does not have permission to access this resource")]
    Forbidden,

    /// Unknown route or resource (404)
    #[error("{0}")]
    NotFound(String),

    /// Member already answered this check-in (400)
    #[error("Response already submitted for this check-in")]
    AlreadySubmitted,

    /// Too many attempts from one client (429)
    #[error("{message}")]
    RateLimited {
        /// Client-facing message
        message: &'static str,
        /// Seconds until the client may retry
        retry_after_secs: u64,
    },

    /// Unexpected failure; the detail is logged, never returned (500)
    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    /// Shorthand for a validation error without details
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// HTTP status for this error
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::DuplicateEmail | Self::AlreadySubmitted => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        match self {
            Self::Validation { details, .. } if !details.is_empty() => {
                (status, Json(json!({ "error": message, "details": details }))).into_response()
            }
            Self::Unauthorized => (
                status,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                Json(json!({ "error": message })),
            )
                .into_response(),
            Self::RateLimited {
                retry_after_secs, ..
            } => (
                status,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                Json(json!({ "error": message })),
            )
                .into_response(),
            Self::Internal(detail) => {
                error!(detail = %detail, "Error while processing request");
                (status, Json(json!({ "error": message }))).into_response()
            }
            _ => (status, Json(json!({ "error": message }))).into_response(),
        }
    }
}
