//! Shared test utilities for chron-db unit tests.

use chron_core::schema::{ColumnDef, TableSchema};

use crate::service::ChronService;

/// In-memory service with built-in transforms and default settings.
pub async fn test_service() -> ChronService {
    ChronService::new_local(":memory:").await.unwrap()
}

/// The `people` table used across scenarios: `id` key, all columns audited.
pub fn people() -> TableSchema {
    TableSchema::new("people")
        .primary_key(["id"])
        .column(ColumnDef::new("id"))
        .column(ColumnDef::new("name"))
        .column(ColumnDef::new("phone"))
}

/// Insert a bare changeset row and return its id.
pub async fn seed_changeset(conn: &libsql::Connection) -> i64 {
    let mut rows = conn
        .query(
            "INSERT INTO audit_changeset (created_on) VALUES ('2026-01-01T00:00:00.000000Z') RETURNING id",
            (),
        )
        .await
        .unwrap();
    rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap()
}

/// Row count of an audit table.
pub async fn count(conn: &libsql::Connection, table: &str) -> i64 {
    let mut rows = conn
        .query(&format!("SELECT COUNT(*) FROM {table}"), ())
        .await
        .unwrap();
    rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap()
}
