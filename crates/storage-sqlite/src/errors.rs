use diesel::result::{DatabaseErrorKind, Error as DieselError};
use northstar_core::errors::{DatabaseError, Error};
use thiserror::Error;

/// Storage-layer failures, converted into the core error at the repository boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    Query(#[from] DieselError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        let db_error = match err {
            StorageError::Query(DieselError::NotFound) => {
                DatabaseError::NotFound("Record not found".to_string())
            }
            StorageError::Query(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                info,
            )) => DatabaseError::UniqueViolation(info.message().to_string()),
            StorageError::Query(other) => DatabaseError::QueryFailed(other.to_string()),
            StorageError::Pool(e) => DatabaseError::ConnectionFailed(e.to_string()),
            StorageError::Connection(e) => DatabaseError::ConnectionFailed(e.to_string()),
            StorageError::Migration(message) => DatabaseError::MigrationFailed(message),
            StorageError::Io(e) => DatabaseError::ConnectionFailed(e.to_string()),
            StorageError::InvalidValue(message) => DatabaseError::Internal(message),
        };
        Error::Database(db_error)
    }
}
