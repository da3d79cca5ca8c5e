//! Common error types for StemScribe

use thiserror::Error;

/// Common result type for StemScribe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the job store, config loader and artifact store
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested job (or other resource) not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A job with this identifier already exists
    #[error("Duplicate job id: {0}")]
    DuplicateId(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error (serialization, corrupted rows, ...)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the error is SQLite reporting lock contention
    pub fn is_lock_contention(&self) -> bool {
        match self {
            #[cfg(feature = "sqlx")]
            Error::Database(db_err) => {
                let text = db_err.to_string();
                text.contains("database is locked") || text.contains("database table is locked")
            }
            _ => false,
        }
    }
}
