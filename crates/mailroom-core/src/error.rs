//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// URL filter operation failed.
    #[error("Filter error: {0}")]
    Filter(#[from] mailroom_filter::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested entity does not exist or is not visible to the caller.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller is not allowed to perform the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Operation lost against a concurrent change or duplicate.
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
