//! Metadata registry and user resolver.
//!
//! Get-or-create for the three append-only dictionaries: audited tables,
//! their fields, and changeset users. Each is backed by a unique constraint
//! and resolved with `INSERT … ON CONFLICT DO NOTHING RETURNING id`, falling
//! back to a select when the row already exists. A uniqueness conflict never
//! surfaces as an error; only a busy database is retried. There is no
//! check-then-insert and no locking beyond what the insert itself takes.
//!
//! All functions take the connection (or transaction, via deref) the caller's
//! business transaction runs on.

use libsql::Value;

use crate::error::DatabaseError;
use crate::retry::{RetryConfig, is_busy};

/// Resolve an audited table name to its id, creating it on first use.
///
/// # Errors
///
/// Returns `DatabaseError` if the insert fails, or the row cannot be
/// resolved within the retry budget.
pub async fn resolve_table(
    conn: &libsql::Connection,
    retry: &RetryConfig,
    name: &str,
) -> Result<i64, DatabaseError> {
    get_or_create(
        conn,
        retry,
        Dictionary::Table,
        "INSERT INTO audited_table (name) VALUES (?1)
         ON CONFLICT (name) DO NOTHING RETURNING id",
        "SELECT id FROM audited_table WHERE name = ?1",
        vec![Value::Text(name.to_string())],
        name,
    )
    .await
}

/// Resolve a field of an audited table to its id, creating it on first use.
///
/// # Errors
///
/// Returns `DatabaseError` as for [`resolve_table`].
pub async fn resolve_field(
    conn: &libsql::Connection,
    retry: &RetryConfig,
    table_id: i64,
    name: &str,
) -> Result<i64, DatabaseError> {
    get_or_create(
        conn,
        retry,
        Dictionary::Field,
        "INSERT INTO audit_field (audited_table_id, name) VALUES (?1, ?2)
         ON CONFLICT (audited_table_id, name) DO NOTHING RETURNING id",
        "SELECT id FROM audit_field WHERE audited_table_id = ?1 AND name = ?2",
        vec![Value::Integer(table_id), Value::Text(name.to_string())],
        name,
    )
    .await
}

/// Resolve a changeset actor identifier to its user id, creating it on first use.
///
/// # Errors
///
/// Returns `DatabaseError` as for [`resolve_table`].
pub async fn resolve_user(
    conn: &libsql::Connection,
    retry: &RetryConfig,
    name: &str,
) -> Result<i64, DatabaseError> {
    get_or_create(
        conn,
        retry,
        Dictionary::User,
        "INSERT INTO audit_user (name) VALUES (?1)
         ON CONFLICT (name) DO NOTHING RETURNING id",
        "SELECT id FROM audit_user WHERE name = ?1",
        vec![Value::Text(name.to_string())],
        name,
    )
    .await
}

/// Every audited table name with its id, ordered by id.
///
/// # Errors
///
/// Returns `DatabaseError` if the query fails.
pub async fn list_tables(conn: &libsql::Connection) -> Result<Vec<(i64, String)>, DatabaseError> {
    let mut rows = conn
        .query("SELECT id, name FROM audited_table ORDER BY id", ())
        .await?;
    let mut tables = Vec::new();
    while let Some(row) = rows.next().await? {
        tables.push((row.get::<i64>(0)?, row.get::<String>(1)?));
    }
    Ok(tables)
}

/// Every field of one audited table with its id, ordered by id.
///
/// # Errors
///
/// Returns `DatabaseError` if the query fails.
pub async fn list_fields(
    conn: &libsql::Connection,
    table_id: i64,
) -> Result<Vec<(i64, String)>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT id, name FROM audit_field WHERE audited_table_id = ?1 ORDER BY id",
            [table_id],
        )
        .await?;
    let mut fields = Vec::new();
    while let Some(row) = rows.next().await? {
        fields.push((row.get::<i64>(0)?, row.get::<String>(1)?));
    }
    Ok(fields)
}

#[derive(Debug, Clone, Copy)]
enum Dictionary {
    Table,
    Field,
    User,
}

impl Dictionary {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Field => "field",
            Self::User => "user",
        }
    }
}

async fn get_or_create(
    conn: &libsql::Connection,
    retry: &RetryConfig,
    kind: Dictionary,
    insert_sql: &str,
    select_sql: &str,
    params: Vec<Value>,
    key: &str,
) -> Result<i64, DatabaseError> {
    for attempt in 1..=retry.max_attempts {
        match fetch_id(conn, insert_sql, &params).await {
            Ok(Some(id)) => {
                tracing::debug!(kind = kind.as_str(), key, id, "created dictionary entry");
                return Ok(id);
            }
            // ON CONFLICT DO NOTHING: the row already exists; fetch it below.
            Ok(None) => {}
            Err(DatabaseError::LibSql(e)) if is_busy(&e) => {
                tracing::debug!(kind = kind.as_str(), key, attempt, "dictionary insert busy");
                tokio::time::sleep(retry.delay_for(attempt)).await;
                continue;
            }
            Err(e) => return Err(e),
        }

        if let Some(id) = fetch_id(conn, select_sql, &params).await? {
            return Ok(id);
        }

        tracing::debug!(
            kind = kind.as_str(),
            key,
            attempt,
            "conflicting row not yet visible; retrying"
        );
        tokio::time::sleep(retry.delay_for(attempt)).await;
    }

    Err(DatabaseError::InvalidState(format!(
        "could not resolve {} '{key}' after {} attempts",
        kind.as_str(),
        retry.max_attempts
    )))
}

async fn fetch_id(
    conn: &libsql::Connection,
    sql: &str,
    params: &[Value],
) -> Result<Option<i64>, DatabaseError> {
    let mut rows = conn
        .query(sql, libsql::params_from_iter(params.to_vec()))
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row.get::<i64>(0)?)),
        None => Ok(None),
    }
}
