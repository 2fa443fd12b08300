//! Error types for chamber-core
//!
//! One taxonomy for the whole crate: correlation inputs, uncertainty inputs,
//! persistence constraints, and scheduler outcomes each get their own variant
//! so callers can match on the failure class instead of parsing messages.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// chamber-core error types
#[derive(Error, Debug)]
pub enum Error {
    /// Physically invalid correlation input. Never retried; the message names
    /// the violated bound. No value can be recovered from this error.
    #[error("domain error: {0}")]
    Domain(String),

    /// Invalid uncertainty-propagation input (negative uncertainty, bad
    /// covariance shape, or a Jacobian that cannot be evaluated).
    #[error("propagation error: {0}")]
    Propagation(String),

    /// Persistence constraint violation (duplicate key, dangling reference).
    /// Surfaced immediately, never retried, never coerced.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind (pool, settings, test, result)
        entity: &'static str,
        /// Identifier that failed to resolve
        id: i64,
    },

    /// Aggregation precondition unmet (test not completed, or fewer than two
    /// usable samples). The test is left exactly as it was.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Backing-store fault. The only variant the acquisition scheduler
    /// retries, with bounded backoff.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Fatal scheduler outcome: persistence retries exhausted or an integrity
    /// violation mid-run. The test has been marked aborted.
    #[error("acquisition aborted: {0}")]
    Aborted(String),
}

impl Error {
    /// Build an [`Error::Integrity`] from a SQLite error when it represents a
    /// constraint violation, passing other SQLite errors through as
    /// [`Error::Storage`].
    #[must_use]
    pub fn from_sqlite(err: rusqlite::Error, context: &str) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Integrity(format!("{context}: {err}"))
            }
            _ => Self::Storage(err),
        }
    }
}
