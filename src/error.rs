//! Error taxonomy for the gatekeeping layer.
//!
//! Every check returns one of the typed families below. The pipeline folds
//! them into [`GateError`], which owns the mapping to a status code and the
//! JSON body sent back to the client.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::security::csrf::CSRF_ERROR_HEADER;

/// Result alias used by the pipeline stages.
pub type GateResult<T> = Result<T, GateError>;

/// Bearer credential failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No `Authorization` header, or not of the form `Bearer <token>`.
    #[error("Authorization token missing or malformed")]
    MissingOrMalformed,

    /// Token is empty, too long, or carries injected markup.
    #[error("Invalid token format")]
    InvalidFormat,

    /// Signature mismatch, expired, or otherwise undecodable.
    #[error("Invalid or expired token")]
    InvalidOrExpired,
}

/// Double-submit token failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsrfError {
    #[error("CSRF token missing")]
    TokenMissing,

    #[error("Invalid CSRF token")]
    TokenMismatch,
}

impl CsrfError {
    /// Short machine-readable reason placed in the `X-CSRF-Error` header.
    pub fn code(&self) -> &'static str {
        match self {
            CsrfError::TokenMissing => "missing",
            CsrfError::TokenMismatch => "mismatch",
        }
    }
}

/// Quota failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded. Please try again later.")]
    RateExceeded {
        /// Seconds the client should wait before retrying.
        retry_after_secs: u64,
    },
}

impl RateLimitError {
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            RateLimitError::RateExceeded { retry_after_secs } => *retry_after_secs,
        }
    }
}

/// Malformed headers or body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// User agent looks like a crawler or script.
    #[error("Automated requests not allowed")]
    AutomatedClient,

    /// Body-bearing request without a JSON content type.
    #[error("Invalid content type")]
    InvalidContentType,

    /// Body is not valid JSON.
    #[error("Invalid JSON in request body")]
    InvalidJson,

    /// Body exceeds the configured size limit.
    #[error("Request body too large (limit {limit} bytes)")]
    BodyTooLarge { limit: usize },

    /// The transport failed while the body was being read.
    #[error("Request body could not be read")]
    UnreadableBody,

    /// A body field a handler requires is missing or unusable.
    #[error("Invalid field: {field}")]
    InvalidField { field: String },
}

/// Outbound call rejected by the egress policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EgressPolicyError {
    #[error("Invalid URL format")]
    MalformedUrl,

    #[error("Only HTTPS URLs are allowed (got {scheme})")]
    SchemeNotAllowed { scheme: String },

    #[error("Domain not in allowed list: {host}")]
    DomainNotAllowed { host: String },

    #[error("Access to private networks is not allowed: {host}")]
    PrivateNetworkBlocked { host: String },

    #[error("URLs with credentials are not allowed")]
    CredentialsInUrl,

    #[error("Upload domain not allowed: {host}")]
    UploadDomainNotAllowed { host: String },
}

/// Umbrella error returned by the security pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Csrf(#[from] CsrfError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Egress(#[from] EgressPolicyError),

    /// Failure of the security layer itself. The detail is logged, never sent.
    #[error("Internal security failure: {0}")]
    Internal(String),
}

impl GateError {
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }

    /// Stable status code for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::Auth(AuthError::InvalidFormat) => StatusCode::BAD_REQUEST,
            GateError::Auth(_) => StatusCode::UNAUTHORIZED,
            GateError::Csrf(_) => StatusCode::FORBIDDEN,
            GateError::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            GateError::Validation(ValidationError::AutomatedClient) => StatusCode::FORBIDDEN,
            GateError::Validation(_) => StatusCode::BAD_REQUEST,
            GateError::Egress(_) => StatusCode::BAD_REQUEST,
            GateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client.
    pub fn client_message(&self) -> String {
        match self {
            GateError::Internal(_) => "Security validation failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        if let GateError::Internal(detail) = &self {
            tracing::error!(error = %detail, "Security layer failure");
        }

        let status = self.status();
        let mut response = (status, Json(json!({ "error": self.client_message() }))).into_response();

        match &self {
            GateError::RateLimit(e) => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(e.retry_after_secs()));
            }
            GateError::Csrf(e) => {
                response
                    .headers_mut()
                    .insert(CSRF_ERROR_HEADER, HeaderValue::from_static(e.code()));
            }
            _ => {}
        }

        response
    }
}
