use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use northstar_core::sync::SyncError;
use northstar_core::{DatabaseError, Error as CoreError};
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    Conflict { message: String, code: String },

    /// The provider or a sync run failed; the code is the provider's when known.
    #[error("{message}")]
    Upstream { message: String, code: String },

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &str) {
        match self {
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Conflict { code, .. } => (StatusCode::CONFLICT, code),
            Self::Upstream { code, .. } => (StatusCode::BAD_GATEWAY, code),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            tracing::error!("[Api] {}", self);
        }
        let body = json!({ "error": self.to_string(), "code": code });
        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Sync(sync_err) => {
                let code = sync_err.code().to_string();
                match sync_err {
                    SyncError::InProgress(_) | SyncError::RunAlreadyFinalized(_) => {
                        Self::Conflict {
                            message: sync_err.to_string(),
                            code,
                        }
                    }
                    SyncError::Failed { .. } => Self::Upstream {
                        message: sync_err.to_string(),
                        code,
                    },
                }
            }
            CoreError::Provider(provider_err) => Self::Upstream {
                code: provider_err
                    .error_code
                    .clone()
                    .unwrap_or_else(|| "PROVIDER_ERROR".to_string()),
                message: provider_err.to_string(),
            },
            CoreError::NotFound(message) => Self::NotFound(message),
            CoreError::Database(DatabaseError::NotFound(message)) => Self::NotFound(message),
            CoreError::Validation(message) => Self::BadRequest(message),
            CoreError::Unauthorized(message) => Self::Unauthorized(message),
            CoreError::Verification(verification_err) => {
                Self::Unauthorized(verification_err.to_string())
            }
            // Vault details stay in the log.
            CoreError::Vault(vault_err) => {
                tracing::error!("[Api] Credential vault failure: {}", vault_err);
                Self::Internal("Credential vault failure".to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}
