//! Error types shared across the Northstar crates.

use thiserror::Error;

use crate::provider::ProviderError;
use crate::secrets::VaultError;
use crate::sync::SyncError;
use crate::webhooks::VerificationError;

/// Result alias used by core services and repository contracts.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Credential vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Webhook verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
