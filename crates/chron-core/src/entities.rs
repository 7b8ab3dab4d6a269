//! Read models for stored audit rows.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::ActionType;

/// The audit record of one business transaction.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Changeset {
    pub id: i64,
    pub description: Option<String>,
    pub created_on: DateTime<Utc>,
    /// Attributed actor name, if the transaction declared one.
    pub user: Option<String>,
}

/// One insert/update/delete within a changeset.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ActionEntry {
    pub id: i64,
    pub changeset_id: i64,
    pub table: String,
    pub audited_row: String,
    pub action_type: ActionType,
}

/// One field-level old/new pair belonging to an action.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ChangeEntry {
    pub id: i64,
    pub action_id: i64,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// A change joined with its action, table, field, and changeset.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ChangeRecord {
    pub change_id: i64,
    pub action_id: i64,
    pub changeset_id: i64,
    pub table: String,
    pub audited_row: String,
    pub action_type: ActionType,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_on: DateTime<Utc>,
    pub user: Option<String>,
    pub description: Option<String>,
}
