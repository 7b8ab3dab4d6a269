//! Table metadata supplied by the host: primary key and per-column audit flags.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const fn default_audit() -> bool {
    true
}

/// Audit flags for one column, in declaration order within its table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnDef {
    pub name: String,

    /// `false` marks the column as not audited (skipped unless `force` is set).
    #[serde(default = "default_audit")]
    pub audit: bool,

    /// Always record this column, changed or not.
    #[serde(default)]
    pub force: bool,

    /// Name of a registered value transform applied to recorded values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

impl ColumnDef {
    /// A plain audited column.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            audit: true,
            force: false,
            transform: None,
        }
    }

    #[must_use]
    pub const fn not_audited(mut self) -> Self {
        self.audit = false;
        self
    }

    #[must_use]
    pub const fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    #[must_use]
    pub fn transformed(mut self, transform: impl Into<String>) -> Self {
        self.transform = Some(transform.into());
        self
    }
}

/// Schema of an audited table.
///
/// `name` may carry a schema prefix (`"shop.items"`); it is stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableSchema {
    pub name: String,

    /// Primary key column names in declaration order.
    #[serde(default)]
    pub primary_key: Vec<String>,

    /// Columns in declaration order.
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: Vec::new(),
            columns: Vec::new(),
        }
    }

    #[must_use]
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Look up a column definition by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}
