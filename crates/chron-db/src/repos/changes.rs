//! Change history queries.
//!
//! `query_changes` joins each change with its field, action, table, and
//! changeset. The row identifier and table are required; everything else
//! narrows the result.

use chrono::{DateTime, Utc};
use chron_core::entities::{ChangeEntry, ChangeRecord};
use chron_core::enums::{ActionType, Comparison, SortOrder};
use chron_core::mutation::audited_row;
use chron_core::value::Value;

use crate::error::DatabaseError;
use crate::helpers::{format_timestamp, get_opt_string, parse_datetime, parse_enum};
use crate::service::ChronService;

/// A comparison against the changeset's `created_on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedOnFilter {
    pub op: Comparison,
    pub at: DateTime<Utc>,
}

/// Filter criteria for change queries.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    pub table: String,
    /// Serialized primary key, as stored in `audited_row`.
    pub row: String,
    pub action: Option<ActionType>,
    pub field: Option<String>,
    pub created_on: Option<CreatedOnFilter>,
    pub order: SortOrder,
    pub limit: Option<u32>,
}

impl ChangeFilter {
    /// Changes of one row, identified by its serialized key.
    pub fn new(table: impl Into<String>, row: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            row: row.into(),
            action: None,
            field: None,
            created_on: None,
            order: SortOrder::default(),
            limit: None,
        }
    }

    /// Changes of one row, identified by its primary key values in declared order.
    pub fn for_key(table: impl Into<String>, primary_key_values: &[Value]) -> Self {
        Self::new(table, audited_row(primary_key_values))
    }

    #[must_use]
    pub const fn action(mut self, action: ActionType) -> Self {
        self.action = Some(action);
        self
    }

    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    #[must_use]
    pub const fn created_on(mut self, op: Comparison, at: DateTime<Utc>) -> Self {
        self.created_on = Some(CreatedOnFilter { op, at });
        self
    }

    #[must_use]
    pub const fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl ChronService {
    /// Query the recorded changes of one row.
    ///
    /// Results are ordered by change id, which follows recording order.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or a stored row is malformed.
    pub async fn query_changes(
        &self,
        filter: &ChangeFilter,
    ) -> Result<Vec<ChangeRecord>, DatabaseError> {
        let mut params: Vec<libsql::Value> = vec![
            libsql::Value::Text(filter.table.clone()),
            libsql::Value::Text(filter.row.clone()),
        ];
        let mut conditions = vec!["t.name = ?1".to_string(), "a.audited_row = ?2".to_string()];

        if let Some(action) = filter.action {
            params.push(libsql::Value::Text(action.as_str().to_string()));
            conditions.push(format!("a.action_type = ?{}", params.len()));
        }
        if let Some(ref field) = filter.field {
            params.push(libsql::Value::Text(field.clone()));
            conditions.push(format!("f.name = ?{}", params.len()));
        }
        if let Some(created_on) = filter.created_on {
            params.push(libsql::Value::Text(format_timestamp(&created_on.at)));
            conditions.push(format!(
                "cs.created_on {} ?{}",
                created_on.op.as_sql(),
                params.len()
            ));
        }

        let limit = filter.limit.unwrap_or_else(|| self.default_limit());
        let sql = format!(
            "SELECT c.id, a.id, a.changeset_id, t.name, a.audited_row, a.action_type,
                    f.name, c.old_value, c.new_value, cs.created_on, u.name, cs.description
             FROM audit_change c
             JOIN audit_action a ON a.id = c.action_id
             JOIN audit_field f ON f.id = c.field_id
             JOIN audited_table t ON t.id = a.audited_table_id
             JOIN audit_changeset cs ON cs.id = a.changeset_id
             LEFT JOIN audit_user u ON u.id = cs.user_id
             WHERE {}
             ORDER BY c.id {} LIMIT {limit}",
            conditions.join(" AND "),
            filter.order.as_sql()
        );

        let mut rows = self
            .db()
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(ChangeRecord {
                change_id: row.get::<i64>(0)?,
                action_id: row.get::<i64>(1)?,
                changeset_id: row.get::<i64>(2)?,
                table: row.get::<String>(3)?,
                audited_row: row.get::<String>(4)?,
                action_type: parse_enum(&row.get::<String>(5)?)?,
                field: row.get::<String>(6)?,
                old_value: get_opt_string(&row, 7)?,
                new_value: get_opt_string(&row, 8)?,
                created_on: parse_datetime(&row.get::<String>(9)?)?,
                user: get_opt_string(&row, 10)?,
                description: get_opt_string(&row, 11)?,
            });
        }
        Ok(records)
    }

    /// Every change of one action, in recording order.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn changes_for_action(
        &self,
        action_id: i64,
    ) -> Result<Vec<ChangeEntry>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT c.id, c.action_id, f.name, c.old_value, c.new_value
                 FROM audit_change c
                 JOIN audit_field f ON f.id = c.field_id
                 WHERE c.action_id = ?1
                 ORDER BY c.id",
                [action_id],
            )
            .await?;
        let mut changes = Vec::new();
        while let Some(row) = rows.next().await? {
            changes.push(ChangeEntry {
                id: row.get::<i64>(0)?,
                action_id: row.get::<i64>(1)?,
                field: row.get::<String>(2)?,
                old_value: get_opt_string(&row, 3)?,
                new_value: get_opt_string(&row, 4)?,
            });
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Attribution;
    use crate::test_support::{people, test_service};
    use chron_core::mutation::RowMutation;
    use chron_core::value::row;
    use pretty_assertions::assert_eq;

    async fn seeded() -> ChronService {
        let svc = test_service().await;
        let table = people();
        let john = row([
            ("id", Value::from(8)),
            ("name", Value::from("JohnSample")),
            ("phone", Value::from("999-888-7777")),
        ]);
        let mut moved = john.clone();
        moved.insert("phone".into(), Value::from("555-000-1111"));

        let mut tx = svc
            .begin(Attribution::new(Some("8"), Some("signup")))
            .await
            .unwrap();
        tx.record_mutation(&RowMutation::insert(&table, john.clone()).unwrap())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = svc.begin(Attribution::default()).await.unwrap();
        tx.record_mutation(&RowMutation::update(&table, john, moved).unwrap())
            .await
            .unwrap();
        tx.commit().await.unwrap();
        svc
    }

    #[tokio::test]
    async fn returns_row_history_in_order() {
        let svc = seeded().await;
        let records = svc
            .query_changes(&ChangeFilter::new("people", "8"))
            .await
            .unwrap();
        let fields: Vec<_> = records
            .iter()
            .map(|r| (r.action_type, r.field.as_str()))
            .collect();
        assert_eq!(
            fields,
            vec![
                (ActionType::Insert, "id"),
                (ActionType::Insert, "name"),
                (ActionType::Insert, "phone"),
                (ActionType::Update, "phone"),
            ]
        );
        assert_eq!(records[0].user.as_deref(), Some("8"));
        assert_eq!(records[0].description.as_deref(), Some("signup"));
        assert_eq!(records[3].user, None);
        assert_eq!(records[3].old_value.as_deref(), Some("999-888-7777"));
    }

    #[tokio::test]
    async fn filters_by_action_and_field() {
        let svc = seeded().await;
        let records = svc
            .query_changes(
                &ChangeFilter::new("people", "8")
                    .action(ActionType::Update)
                    .field("phone"),
            )
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].new_value.as_deref(), Some("555-000-1111"));

        let none = svc
            .query_changes(&ChangeFilter::new("people", "8").field("email"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn descending_order_and_limit() {
        let svc = seeded().await;
        let records = svc
            .query_changes(
                &ChangeFilter::for_key("people", &[Value::from(8)])
                    .order(SortOrder::Desc)
                    .limit(2),
            )
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action_type, ActionType::Update);
        assert!(records[0].change_id > records[1].change_id);
    }

    #[tokio::test]
    async fn created_on_comparison() {
        let svc = seeded().await;
        let past = Utc::now() - chrono::Duration::hours(1);
        let future = Utc::now() + chrono::Duration::hours(1);

        let after_past = svc
            .query_changes(&ChangeFilter::new("people", "8").created_on(Comparison::Gt, past))
            .await
            .unwrap();
        assert_eq!(after_past.len(), 4);

        let after_future = svc
            .query_changes(&ChangeFilter::new("people", "8").created_on(Comparison::Ge, future))
            .await
            .unwrap();
        assert!(after_future.is_empty());
    }

    #[tokio::test]
    async fn other_rows_and_tables_are_excluded() {
        let svc = seeded().await;
        assert!(
            svc.query_changes(&ChangeFilter::new("people", "9"))
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            svc.query_changes(&ChangeFilter::new("items", "8"))
                .await
                .unwrap()
                .is_empty()
        );
    }
}
