//! Common error types for CallShield

use thiserror::Error;

/// Common result type for CallShield operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across CallShield crates
///
/// The HTTP layer maps these onto status codes: `BadRequest` → 400,
/// `Unauthorized` → 401, `NotFound` → 404, `Conflict` → 409,
/// `RateLimited` → 429, everything else → 500 with a generic message.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited: retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}
