//! Cross-cutting error types for Chronicle.
//!
//! Errors raised by the pure engine (policy, transforms, diffing). Persistence
//! errors are defined in `chron-db` as `DatabaseError`, which wraps these.

use thiserror::Error;

/// Errors that can be raised while computing an audit record.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A column's transform reference does not resolve to a callable.
    #[error("Configuration error: column '{table}.{column}' references unknown transform '{transform}'")]
    Configuration {
        table: String,
        column: String,
        transform: String,
    },

    /// An internal consistency rule was broken by the caller or the engine.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// A user or description was supplied after the changeset was created.
    #[error("Changeset {changeset_id} already exists for this transaction; attribution can no longer change")]
    LateAttribution { changeset_id: i64 },

    /// Data failed validation (schema, format, constraints).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
