//! Audit writer.
//!
//! Persists one action and its field changes on the caller's transaction.

use std::collections::HashMap;

use chron_core::diff::FieldChange;
use chron_core::enums::ActionType;
use chron_core::mutation::audited_row;
use chron_core::value::Value;

use crate::error::DatabaseError;
use crate::registry::{resolve_field, resolve_table};
use crate::retry::RetryConfig;

/// Dictionary ids resolved within a single business transaction.
///
/// Never shared across transactions: an id created by a transaction that
/// later rolls back must not be reused.
#[derive(Debug, Default)]
pub struct TxDictionary {
    tables: HashMap<String, i64>,
    fields: HashMap<(i64, String), i64>,
}

impl TxDictionary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn table_id(
        &mut self,
        conn: &libsql::Connection,
        retry: &RetryConfig,
        name: &str,
    ) -> Result<i64, DatabaseError> {
        if let Some(id) = self.tables.get(name) {
            return Ok(*id);
        }
        let id = resolve_table(conn, retry, name).await?;
        self.tables.insert(name.to_string(), id);
        Ok(id)
    }

    async fn field_id(
        &mut self,
        conn: &libsql::Connection,
        retry: &RetryConfig,
        table_id: i64,
        name: &str,
    ) -> Result<i64, DatabaseError> {
        let key = (table_id, name.to_string());
        if let Some(id) = self.fields.get(&key) {
            return Ok(*id);
        }
        let id = resolve_field(conn, retry, table_id, name).await?;
        self.fields.insert(key, id);
        Ok(id)
    }
}

/// Write one action row and its change rows under `changeset_id`.
///
/// Returns the new action id. An empty `changes` still records the action.
///
/// # Errors
///
/// Returns `DatabaseError` if dictionary resolution or any insert fails; the
/// caller's transaction must then be abandoned.
#[allow(clippy::too_many_arguments)]
pub async fn record(
    conn: &libsql::Connection,
    retry: &RetryConfig,
    dictionary: &mut TxDictionary,
    action: ActionType,
    table: &str,
    primary_key_values: &[Value],
    changes: &[FieldChange],
    changeset_id: i64,
) -> Result<i64, DatabaseError> {
    let table_id = dictionary.table_id(conn, retry, table).await?;
    let row_key = audited_row(primary_key_values);

    let mut rows = conn
        .query(
            "INSERT INTO audit_action (changeset_id, audited_table_id, audited_row, action_type)
             VALUES (?1, ?2, ?3, ?4) RETURNING id",
            libsql::params![changeset_id, table_id, row_key.as_str(), action.as_str()],
        )
        .await?;
    let action_id = rows
        .next()
        .await?
        .ok_or(DatabaseError::NoResult)?
        .get::<i64>(0)?;

    for change in changes {
        let field_id = dictionary.field_id(conn, retry, table_id, &change.name).await?;
        conn.execute(
            "INSERT INTO audit_change (action_id, field_id, old_value, new_value)
             VALUES (?1, ?2, ?3, ?4)",
            libsql::params![
                action_id,
                field_id,
                change.old_value.as_deref(),
                change.new_value.as_deref()
            ],
        )
        .await?;
    }

    tracing::debug!(
        changeset_id,
        action_id,
        table,
        audited_row = %row_key,
        action = %action,
        changes = changes.len(),
        "recorded action"
    );
    Ok(action_id)
}
