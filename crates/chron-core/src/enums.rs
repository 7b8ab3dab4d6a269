//! Action types, query ordering, comparison operators, and attribution policy.
//!
//! All enums use `snake_case` serialization via `#[serde(rename_all = "snake_case")]`
//! and expose `as_str()` for the exact text stored in (or emitted into) SQL.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ActionType
// ---------------------------------------------------------------------------

/// Kind of row mutation recorded by an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Insert,
    Update,
    Delete,
}

impl ActionType {
    pub const ALL: [Self; 3] = [Self::Insert, Self::Update, Self::Delete];

    /// Return the string representation used in SQL storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Whether this action carries a prior row state.
    #[must_use]
    pub const fn has_old_row(self) -> bool {
        matches!(self, Self::Update | Self::Delete)
    }

    /// Whether this action carries a new row state.
    #[must_use]
    pub const fn has_new_row(self) -> bool {
        matches!(self, Self::Insert | Self::Update)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SortOrder
// ---------------------------------------------------------------------------

/// Ordering of change records by their natural (insertion) order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        })
    }
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Comparison operator for timestamp filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    /// SQL operator text. Only these fixed strings are ever interpolated into queries.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// LateAttribution
// ---------------------------------------------------------------------------

/// What to do when a user or description arrives after the transaction's
/// changeset already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LateAttribution {
    /// Log a warning and keep the original attribution.
    #[default]
    Warn,
    /// Fail the call with `CoreError::LateAttribution`.
    Reject,
}

impl LateAttribution {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for LateAttribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_type_serde_matches_as_str() {
        for action in ActionType::ALL {
            let json = serde_json::to_value(action).unwrap();
            assert_eq!(json, serde_json::Value::String(action.as_str().to_string()));
        }
    }

    #[test]
    fn action_row_requirements() {
        assert!(ActionType::Insert.has_new_row());
        assert!(!ActionType::Insert.has_old_row());
        assert!(ActionType::Update.has_old_row() && ActionType::Update.has_new_row());
        assert!(ActionType::Delete.has_old_row());
        assert!(!ActionType::Delete.has_new_row());
    }

    #[test]
    fn comparison_sql_operators() {
        assert_eq!(Comparison::Ge.as_sql(), ">=");
        assert_eq!(Comparison::Ne.as_sql(), "!=");
        let parsed: Comparison = serde_json::from_str("\"lt\"").unwrap();
        assert_eq!(parsed, Comparison::Lt);
    }

    #[test]
    fn defaults() {
        assert_eq!(SortOrder::default(), SortOrder::Asc);
        assert_eq!(LateAttribution::default(), LateAttribution::Warn);
    }
}
