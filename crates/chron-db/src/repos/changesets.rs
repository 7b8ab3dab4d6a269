//! Changeset and action lookups.

use chron_core::entities::{ActionEntry, Changeset};

use crate::error::DatabaseError;
use crate::helpers::{get_opt_string, parse_datetime, parse_enum};
use crate::service::ChronService;

const CHANGESET_COLUMNS: &str = "SELECT cs.id, cs.description, cs.created_on, u.name
     FROM audit_changeset cs
     LEFT JOIN audit_user u ON u.id = cs.user_id";

fn row_to_changeset(row: &libsql::Row) -> Result<Changeset, DatabaseError> {
    Ok(Changeset {
        id: row.get::<i64>(0)?,
        description: get_opt_string(row, 1)?,
        created_on: parse_datetime(&row.get::<String>(2)?)?,
        user: get_opt_string(row, 3)?,
    })
}

impl ChronService {
    /// Fetch one changeset by id.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn get_changeset(&self, id: i64) -> Result<Option<Changeset>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(&format!("{CHANGESET_COLUMNS} WHERE cs.id = ?1"), [id])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_changeset(&row)?)),
            None => Ok(None),
        }
    }

    /// Most recent changesets first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_changesets(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<Changeset>, DatabaseError> {
        let limit = limit.unwrap_or_else(|| self.default_limit());
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!("{CHANGESET_COLUMNS} ORDER BY cs.id DESC LIMIT {limit}"),
                (),
            )
            .await?;
        let mut changesets = Vec::new();
        while let Some(row) = rows.next().await? {
            changesets.push(row_to_changeset(&row)?);
        }
        Ok(changesets)
    }

    /// Actions of one changeset, in recording order.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn actions_for_changeset(
        &self,
        changeset_id: i64,
    ) -> Result<Vec<ActionEntry>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT a.id, a.changeset_id, t.name, a.audited_row, a.action_type
                 FROM audit_action a
                 JOIN audited_table t ON t.id = a.audited_table_id
                 WHERE a.changeset_id = ?1
                 ORDER BY a.id",
                [changeset_id],
            )
            .await?;
        let mut actions = Vec::new();
        while let Some(row) = rows.next().await? {
            actions.push(ActionEntry {
                id: row.get::<i64>(0)?,
                changeset_id: row.get::<i64>(1)?,
                table: row.get::<String>(2)?,
                audited_row: row.get::<String>(3)?,
                action_type: parse_enum(&row.get::<String>(4)?)?,
            });
        }
        Ok(actions)
    }
}
