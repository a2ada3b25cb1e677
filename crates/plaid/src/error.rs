//! Error types for the Plaid client.

use northstar_core::provider::ProviderError;
use thiserror::Error;

use crate::types::PlaidApiError;

/// Result type alias for Plaid client operations.
pub type Result<T> = std::result::Result<T, PlaidError>;

#[derive(Debug, Error)]
pub enum PlaidError {
    /// Transport failure: timeout, connection refused, TLS, body read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A success response whose body did not match the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Structured error body returned by Plaid.
    #[error("Plaid API error ({status}): {}: {}", .error.error_code, .error.error_message)]
    Api { status: u16, error: PlaidApiError },

    /// Non-JSON error response (proxies, gateways).
    #[error("Plaid request failed ({status}): {body}")]
    Status { status: u16, body: String },

    /// Client-side configuration or request problem.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl PlaidError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// HTTP status when a response was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } | Self::Status { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|status| status.as_u16()),
            Self::Json(_) | Self::InvalidRequest(_) => None,
        }
    }
}

impl From<PlaidError> for ProviderError {
    fn from(err: PlaidError) -> Self {
        match err {
            PlaidError::Api { status, error } => ProviderError {
                http_status: Some(status),
                error_code: Some(error.error_code),
                error_type: Some(error.error_type),
                error_message: Some(error.error_message),
                display_message: error.display_message,
                request_id: error.request_id,
                message: None,
            },
            other => ProviderError {
                http_status: other.status_code(),
                message: Some(other.to_string()),
                ..ProviderError::default()
            },
        }
    }
}
