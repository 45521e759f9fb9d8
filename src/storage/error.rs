//! Error taxonomy for storage operations.
//!
//! Engine errors are classified by SQLite's primary result code so callers
//! can tell retryable lock contention apart from constraint failures and
//! fatal I/O problems.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Error type for store operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Record key is empty or whitespace. `index` locates the offending
    /// record when the key came from a batch.
    #[error("invalid key{}: name must be a non-empty string", key_position(.index))]
    InvalidKey { index: Option<usize> },

    /// Field name outside the fixed record schema.
    #[error("invalid field: {0}")]
    InvalidField(String),

    /// Engine lock wait exceeded the busy timeout. Retryable.
    #[error("database busy: {0}")]
    Busy(String),

    /// A uniqueness, NOT NULL or CHECK constraint rejected the write.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// The backing file could not be opened, read or written.
    #[error("storage I/O failure: {0}")]
    IoFailure(String),

    /// Any other engine error.
    #[error("database error: {0}")]
    Database(String),
}

fn key_position(index: &Option<usize>) -> String {
    index
        .map(|index| format!(" at batch position {index}"))
        .unwrap_or_default()
}

impl StoreError {
    /// Whether the caller may retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        let message = err.to_string();
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => Self::Busy(message),
            Some(ErrorCode::ConstraintViolation) => Self::IntegrityViolation(message),
            Some(
                ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::ReadOnly
                | ErrorCode::PermissionDenied
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt,
            ) => Self::IoFailure(message),
            _ => Self::Database(message),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::IoFailure(err.to_string())
    }
}
