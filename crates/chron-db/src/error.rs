//! Database error types for chron-db.

use chron_core::errors::CoreError;
use thiserror::Error;

/// Errors from audit persistence.
///
/// Dictionary insert races are absorbed by `ON CONFLICT DO NOTHING` and never
/// show up here. Everything else propagates to the caller, which must abandon
/// its transaction.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A SQL query failed or returned malformed data.
    #[error("Query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Expected a result row but none was returned.
    #[error("No result returned")]
    NoResult,

    /// Invalid state encountered (e.g., a transaction already finished).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Policy, transform, or invariant failure from the engine.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
