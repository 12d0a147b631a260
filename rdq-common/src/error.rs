//! Error type shared by the rdq crates

use thiserror::Error;

/// Result alias used across rdq-common and rdq-verify
pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds; HTTP handlers map each to a status code
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite failure, including constraint and trigger aborts
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem failure while preparing the database location
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable, malformed or out-of-range configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// No row with the requested id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected request input (missing source, bad range, bad limit)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Row changed since it was read (stale `row_version`)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal error, including malformed stored data
    #[error("Internal error: {0}")]
    Internal(String),
}
