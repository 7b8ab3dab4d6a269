//! Database migration runner.
//!
//! Embeds the SQL migration files at compile time and executes them on
//! database open. All statements use `IF NOT EXISTS` for idempotent re-running.

use crate::ChronDb;
use crate::error::DatabaseError;

/// Audit schema: 6 tables, 5 indexes, 4 triggers.
const MIGRATION_001: &str = include_str!("../migrations/001_audit_schema.sql");

impl ChronDb {
    /// Run all embedded migrations in sequence.
    pub(crate) async fn run_migrations(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(MIGRATION_001)
            .await
            .map_err(|e| DatabaseError::Migration(format!("001_audit_schema: {e}")))?;
        tracing::info!("audit schema migrations applied");
        Ok(())
    }
}
