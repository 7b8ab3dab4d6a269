//! The mutation hook interface hosts implement, and its stock implementation.
//!
//! The engine never cares how a mutation was detected. A host (ORM callback,
//! trigger bridge, replay tool) hands it something implementing
//! [`MutationHook`]: the action, the table schema, the primary key values in
//! declared order, and the old/new rows.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::ActionType;
use crate::errors::CoreError;
use crate::schema::TableSchema;
use crate::value::{Row, Value};

/// Separator between composite primary key components in `audited_row`.
pub const PK_SEPARATOR: &str = "-";

/// Capability a host provides for each row mutation it wants audited.
pub trait MutationHook {
    fn action(&self) -> ActionType;

    /// Schema of the mutated table, including per-column audit flags.
    ///
    /// Policies are cached by table name on first use, so every mutation of a
    /// table must report the same column metadata.
    fn table(&self) -> &TableSchema;

    /// Primary key values in the table's declared primary key order.
    fn primary_key_values(&self) -> &[Value];

    /// Row state before the mutation. `None` for inserts.
    fn old_row(&self) -> Option<&Row>;

    /// Row state after the mutation. `None` for deletes.
    fn new_row(&self) -> Option<&Row>;
}

/// Serialize primary key values into the opaque `audited_row` text.
///
/// Components are joined with [`PK_SEPARATOR`] in the order given; NULL
/// components render as empty strings.
#[must_use]
pub fn audited_row(primary_key_values: &[Value]) -> String {
    primary_key_values
        .iter()
        .map(|v| v.to_audit_text().unwrap_or_default())
        .collect::<Vec<_>>()
        .join(PK_SEPARATOR)
}

/// A concrete row mutation borrowing its table schema.
#[derive(Debug, Clone)]
pub struct RowMutation<'a> {
    action: ActionType,
    table: &'a TableSchema,
    primary_key: Vec<Value>,
    old_row: Option<Row>,
    new_row: Option<Row>,
}

impl<'a> RowMutation<'a> {
    /// An insert; primary key values are read from `new_row`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvariantViolation` if a primary key column is absent.
    pub fn insert(table: &'a TableSchema, new_row: Row) -> Result<Self, CoreError> {
        let primary_key = extract_primary_key(table, &new_row)?;
        Ok(Self {
            action: ActionType::Insert,
            table,
            primary_key,
            old_row: None,
            new_row: Some(new_row),
        })
    }

    /// An update; primary key values are read from `old_row` so a key change
    /// is recorded against the row's previous identity.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvariantViolation` if a primary key column is absent.
    pub fn update(table: &'a TableSchema, old_row: Row, new_row: Row) -> Result<Self, CoreError> {
        let primary_key = extract_primary_key(table, &old_row)?;
        Ok(Self {
            action: ActionType::Update,
            table,
            primary_key,
            old_row: Some(old_row),
            new_row: Some(new_row),
        })
    }

    /// A delete; primary key values are read from `old_row`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvariantViolation` if a primary key column is absent.
    pub fn delete(table: &'a TableSchema, old_row: Row) -> Result<Self, CoreError> {
        let primary_key = extract_primary_key(table, &old_row)?;
        Ok(Self {
            action: ActionType::Delete,
            table,
            primary_key,
            old_row: Some(old_row),
            new_row: None,
        })
    }

    /// Build from explicit parts, e.g., when the host supplies key values itself.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvariantViolation` if the rows do not match `action`
    /// or the key arity differs from the table's declared primary key.
    pub fn from_parts(
        action: ActionType,
        table: &'a TableSchema,
        primary_key: Vec<Value>,
        old_row: Option<Row>,
        new_row: Option<Row>,
    ) -> Result<Self, CoreError> {
        if action.has_old_row() != old_row.is_some() || action.has_new_row() != new_row.is_some() {
            return Err(CoreError::InvariantViolation(format!(
                "{action} on '{}' supplied with mismatched row states",
                table.name
            )));
        }
        if !table.primary_key.is_empty() && table.primary_key.len() != primary_key.len() {
            return Err(CoreError::InvariantViolation(format!(
                "'{}' declares {} primary key column(s) but {} value(s) were supplied",
                table.name,
                table.primary_key.len(),
                primary_key.len()
            )));
        }
        Ok(Self {
            action,
            table,
            primary_key,
            old_row,
            new_row,
        })
    }

    /// Build from a deserialized [`MutationRecord`].
    ///
    /// Uses the record's explicit key when present, otherwise extracts it
    /// from the appropriate row.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvariantViolation` on row/key mismatches.
    pub fn from_record(table: &'a TableSchema, record: MutationRecord) -> Result<Self, CoreError> {
        match record.primary_key {
            Some(pk) => Self::from_parts(record.action, table, pk, record.old, record.new),
            None => match (record.action, record.old, record.new) {
                (ActionType::Insert, None, Some(new)) => Self::insert(table, new),
                (ActionType::Update, Some(old), Some(new)) => Self::update(table, old, new),
                (ActionType::Delete, Some(old), None) => Self::delete(table, old),
                (action, _, _) => Err(CoreError::InvariantViolation(format!(
                    "{action} on '{}' supplied with mismatched row states",
                    table.name
                ))),
            },
        }
    }
}

impl MutationHook for RowMutation<'_> {
    fn action(&self) -> ActionType {
        self.action
    }

    fn table(&self) -> &TableSchema {
        self.table
    }

    fn primary_key_values(&self) -> &[Value] {
        &self.primary_key
    }

    fn old_row(&self) -> Option<&Row> {
        self.old_row.as_ref()
    }

    fn new_row(&self) -> Option<&Row> {
        self.new_row.as_ref()
    }
}

fn extract_primary_key(table: &TableSchema, row: &Row) -> Result<Vec<Value>, CoreError> {
    table
        .primary_key
        .iter()
        .map(|col| {
            row.get(col).cloned().ok_or_else(|| {
                CoreError::InvariantViolation(format!(
                    "row for '{}' is missing primary key column '{col}'",
                    table.name
                ))
            })
        })
        .collect()
}

/// Serialized form of one mutation, one per line in a JSONL batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MutationRecord {
    pub table: String,
    pub action: ActionType,
    /// Explicit key values; extracted from the rows when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Row>,
}
