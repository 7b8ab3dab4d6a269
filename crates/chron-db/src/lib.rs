//! # chron-db
//!
//! libSQL persistence for the Chronicle change capture engine.
//!
//! Stores the changeset → action → change graph plus its append-only
//! dictionaries (users, audited tables, fields). Every write for a business
//! transaction goes through that transaction's handle, so audit rows commit
//! or vanish together with the mutation they describe.
//!
//! Uses the `libsql` crate (C `SQLite` fork) in local mode.

pub mod coordinator;
pub mod error;
pub mod helpers;
mod migrations;
pub mod registry;
pub mod repos;
pub mod retry;
pub mod service;
pub mod writer;

#[cfg(test)]
mod test_support;

use error::DatabaseError;
use libsql::Builder;

/// Busy timeout applied to every connection, in milliseconds.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Central database handle for the audit schema.
///
/// Wraps a libSQL database and its primary connection.
pub struct ChronDb {
    db: libsql::Database,
    conn: libsql::Connection,
}

impl ChronDb {
    /// Open a local database at the given path, or `":memory:"`.
    ///
    /// Runs migrations automatically on open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;
        configure_connection(&conn).await?;

        let chron_db = Self { db, conn };
        chron_db.run_migrations().await?;
        Ok(chron_db)
    }

    /// Access the primary libSQL connection for direct queries.
    #[must_use]
    pub const fn conn(&self) -> &libsql::Connection {
        &self.conn
    }

    /// Open an additional connection to the same database file.
    ///
    /// Each connection can carry its own business transaction. For
    /// `":memory:"` databases a new connection sees a separate, empty database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the connection cannot be opened.
    pub async fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.db.connect()?;
        configure_connection(&conn).await?;
        Ok(conn)
    }
}

async fn configure_connection(conn: &libsql::Connection) -> Result<(), DatabaseError> {
    // Enable foreign keys (must be per-connection in SQLite)
    conn.execute("PRAGMA foreign_keys = ON", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

    // busy_timeout reports the new value as a row, so it goes through query().
    let mut rows = conn
        .query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"), ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("PRAGMA busy_timeout: {e}")))?;
    while rows.next().await?.is_some() {}
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> ChronDb {
        ChronDb::open_local(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn open_local_creates_schema() {
        let db = test_db().await;

        let tables = [
            "audit_user",
            "audit_changeset",
            "audited_table",
            "audit_field",
            "audit_action",
            "audit_change",
        ];
        for table in &tables {
            let mut rows = db
                .conn()
                .query(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                    [*table],
                )
                .await
                .unwrap();
            let row = rows.next().await.unwrap();
            assert!(row.is_some(), "table '{table}' should exist");
        }
    }

    #[tokio::test]
    async fn idempotent_migrations() {
        let db = test_db().await;
        db.run_migrations().await.unwrap();
    }

    #[tokio::test]
    async fn dictionary_names_are_unique() {
        let db = test_db().await;
        db.conn()
            .execute("INSERT INTO audited_table (name) VALUES ('people')", ())
            .await
            .unwrap();
        let dup = db
            .conn()
            .execute("INSERT INTO audited_table (name) VALUES ('people')", ())
            .await;
        let err = dup.expect_err("duplicate table name should be rejected");
        assert!(err.to_string().contains("UNIQUE constraint failed"));
    }

    #[tokio::test]
    async fn action_type_is_checked() {
        let db = test_db().await;
        db.conn()
            .execute_batch(
                "INSERT INTO audited_table (id, name) VALUES (1, 'people');
                 INSERT INTO audit_changeset (id, created_on) VALUES (1, '2026-01-01T00:00:00.000000Z');",
            )
            .await
            .unwrap();
        let err = db
            .conn()
            .execute(
                "INSERT INTO audit_action (changeset_id, audited_table_id, audited_row, action_type)
                 VALUES (1, 1, '8', 'upsert')",
                (),
            )
            .await
            .expect_err("unknown action type should be rejected");
        assert!(err.to_string().contains("CHECK constraint failed"));
    }

    #[tokio::test]
    async fn change_field_must_match_action_table() {
        let db = test_db().await;
        db.conn()
            .execute_batch(
                "INSERT INTO audited_table (id, name) VALUES (1, 'people'), (2, 'items');
                 INSERT INTO audit_field (id, audited_table_id, name) VALUES (1, 2, 'title');
                 INSERT INTO audit_changeset (id, created_on) VALUES (1, '2026-01-01T00:00:00.000000Z');
                 INSERT INTO audit_action (id, changeset_id, audited_table_id, audited_row, action_type)
                     VALUES (1, 1, 1, '8', 'update');",
            )
            .await
            .unwrap();

        let result = db
            .conn()
            .execute(
                "INSERT INTO audit_change (action_id, field_id, old_value, new_value) VALUES (1, 1, 'a', 'b')",
                (),
            )
            .await;
        assert!(result.is_err(), "mismatched field table should be rejected");
    }

    #[tokio::test]
    async fn history_is_append_only() {
        let db = test_db().await;
        db.conn()
            .execute(
                "INSERT INTO audit_changeset (id, created_on) VALUES (1, '2026-01-01T00:00:00.000000Z')",
                (),
            )
            .await
            .unwrap();
        let result = db
            .conn()
            .execute(
                "UPDATE audit_changeset SET description = 'rewritten' WHERE id = 1",
                (),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn file_database_accepts_second_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        let db = ChronDb::open_local(path.to_str().unwrap()).await.unwrap();
        db.conn()
            .execute("INSERT INTO audit_user (name) VALUES ('alice')", ())
            .await
            .unwrap();

        let other = db.connect().await.unwrap();
        let mut rows = other
            .query("SELECT COUNT(*) FROM audit_user", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
    }
}
