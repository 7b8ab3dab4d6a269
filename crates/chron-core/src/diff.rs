//! Row diff engine.
//!
//! Computes the ordered list of field-level changes to record for one
//! mutation. The decision to record a column is made on raw values; the
//! column's transform (if any) is applied afterwards, independently to the old
//! and new value, so a transform can never hide a real change.
//!
//! | action | recorded when                                  | old value | new value |
//! |--------|------------------------------------------------|-----------|-----------|
//! | insert | forced, or auditable and new value not NULL    | NULL      | new       |
//! | update | forced, or auditable and old != new            | old       | new       |
//! | delete | forced, or auditable and old value not NULL    | old       | NULL      |

use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::ActionType;
use crate::errors::CoreError;
use crate::policy::{ColumnPolicy, TablePolicy};
use crate::transform::{RowContext, TransformRegistry};
use crate::value::{Row, Value};

/// One field-level old/new pair to record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldChange {
    pub name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl FieldChange {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        old_value: Option<&str>,
        new_value: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            old_value: old_value.map(String::from),
            new_value: new_value.map(String::from),
        }
    }
}

/// Compute the field changes for one mutation.
///
/// Columns are visited in the policy's declaration order, followed by any
/// column present in either row but not declared, in lexical order, under the
/// default policy.
///
/// # Errors
///
/// - `CoreError::InvariantViolation` if a row required by `action` is missing.
/// - `CoreError::Configuration` if a recorded column's transform is unknown.
pub fn diff(
    action: ActionType,
    old_row: Option<&Row>,
    new_row: Option<&Row>,
    policy: &TablePolicy,
    transforms: &TransformRegistry,
) -> Result<Vec<FieldChange>, CoreError> {
    check_rows(action, old_row, new_row, policy.table())?;

    let default_policy = ColumnPolicy::default();
    let declared: BTreeSet<&str> = policy.columns().map(|(name, _)| name).collect();
    let undeclared: BTreeSet<&str> = old_row
        .into_iter()
        .chain(new_row)
        .flat_map(|row| row.keys().map(String::as_str))
        .filter(|name| !declared.contains(name))
        .collect();

    if !undeclared.is_empty() {
        tracing::debug!(
            table = policy.table(),
            columns = ?undeclared,
            "auditing undeclared columns with default policy"
        );
    }

    let columns = policy
        .columns()
        .chain(undeclared.into_iter().map(|name| (name, &default_policy)));

    let mut changes = Vec::new();
    for (name, column_policy) in columns {
        let old = old_row.and_then(|r| r.get(name)).unwrap_or(&Value::Null);
        let new = new_row.and_then(|r| r.get(name)).unwrap_or(&Value::Null);

        if !should_record(action, column_policy, old, new) {
            continue;
        }

        let ctx = RowContext {
            table: policy.table(),
            column: name,
            action,
            old_row,
            new_row,
        };
        changes.push(emit(action, &ctx, column_policy, old, new, transforms)?);
    }

    Ok(changes)
}

fn check_rows(
    action: ActionType,
    old_row: Option<&Row>,
    new_row: Option<&Row>,
    table: &str,
) -> Result<(), CoreError> {
    if action.has_old_row() && old_row.is_none() {
        return Err(CoreError::InvariantViolation(format!(
            "{action} on '{table}' requires the prior row state"
        )));
    }
    if action.has_new_row() && new_row.is_none() {
        return Err(CoreError::InvariantViolation(format!(
            "{action} on '{table}' requires the new row state"
        )));
    }
    Ok(())
}

/// Record/skip decision. Uses raw, untransformed values.
fn should_record(action: ActionType, policy: &ColumnPolicy, old: &Value, new: &Value) -> bool {
    if policy.forced {
        return true;
    }
    if !policy.auditable {
        return false;
    }
    match action {
        ActionType::Insert => !new.is_null(),
        ActionType::Delete => !old.is_null(),
        ActionType::Update => old != new,
    }
}

fn emit(
    action: ActionType,
    ctx: &RowContext<'_>,
    policy: &ColumnPolicy,
    old: &Value,
    new: &Value,
    transforms: &TransformRegistry,
) -> Result<FieldChange, CoreError> {
    let transformer = policy
        .transform
        .as_ref()
        .map(|reference| transforms.resolve(reference, ctx.table, ctx.column))
        .transpose()?;

    let render = |value: &Value| match &transformer {
        Some(t) => t.apply(ctx, value).to_audit_text(),
        None => value.to_audit_text(),
    };

    let old_value = if action.has_old_row() { render(old) } else { None };
    let new_value = if action.has_new_row() { render(new) } else { None };

    Ok(FieldChange {
        name: ctx.column.to_string(),
        old_value,
        new_value,
    })
}
