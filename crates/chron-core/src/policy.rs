//! Column policy resolver.
//!
//! Turns a table's column metadata into a precomputed [`TablePolicy`]. The
//! resolution is pure and column metadata is static, so resolved policies are
//! cached per table name for the process lifetime by [`PolicyCache`].
//!
//! Transform references are carried unresolved; they are looked up only when
//! the diff engine actually records the column.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::schema::TableSchema;
use crate::transform::{TransformRef, ValueTransformer};

/// Audit policy for one column.
#[derive(Debug, Clone)]
pub struct ColumnPolicy {
    pub auditable: bool,
    pub forced: bool,
    pub transform: Option<TransformRef>,
}

impl Default for ColumnPolicy {
    fn default() -> Self {
        Self {
            auditable: true,
            forced: false,
            transform: None,
        }
    }
}

impl ColumnPolicy {
    /// Whether a column under this policy can ever be recorded.
    #[must_use]
    pub const fn is_recordable(&self) -> bool {
        self.auditable || self.forced
    }
}

/// Resolved policies for every declared column of one table, in declaration order.
#[derive(Debug, Clone)]
pub struct TablePolicy {
    table: String,
    primary_key: Vec<String>,
    columns: Vec<(String, ColumnPolicy)>,
}

impl TablePolicy {
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Declared columns and their policies, in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &ColumnPolicy)> {
        self.columns.iter().map(|(name, p)| (name.as_str(), p))
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&ColumnPolicy> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, p)| p)
    }

    /// Whether this policy was resolved from metadata equal to `schema`'s.
    ///
    /// Inline transformers match any transform name, since they replace it.
    #[must_use]
    pub fn matches(&self, schema: &TableSchema) -> bool {
        self.table == schema.name
            && self.primary_key == schema.primary_key
            && self.columns.len() == schema.columns.len()
            && self.columns.iter().zip(&schema.columns).all(|((name, policy), col)| {
                let transform_matches = match &policy.transform {
                    Some(TransformRef::Named(n)) => col.transform.as_deref() == Some(n.as_str()),
                    Some(TransformRef::Inline(_)) => true,
                    None => col.transform.is_none(),
                };
                *name == col.name
                    && policy.auditable == col.audit
                    && policy.forced == col.force
                    && transform_matches
            })
    }

    /// Attach an inline transformer to a declared column.
    ///
    /// Returns `false` if the column is not declared.
    pub fn set_transform(&mut self, column: &str, transformer: ValueTransformer) -> bool {
        match self.columns.iter_mut().find(|(name, _)| name == column) {
            Some((_, policy)) => {
                policy.transform = Some(TransformRef::Inline(transformer));
                true
            }
            None => false,
        }
    }
}

/// Resolve a table's column metadata into per-column policies.
#[must_use]
pub fn resolve(schema: &TableSchema) -> TablePolicy {
    let columns = schema
        .columns
        .iter()
        .map(|col| {
            let policy = ColumnPolicy {
                auditable: col.audit,
                forced: col.force,
                transform: col.transform.clone().map(TransformRef::Named),
            };
            (col.name.clone(), policy)
        })
        .collect();

    TablePolicy {
        table: schema.name.clone(),
        primary_key: schema.primary_key.clone(),
        columns,
    }
}

/// Process-lifetime cache of resolved table policies, keyed by table name.
#[derive(Debug, Default)]
pub struct PolicyCache {
    policies: Mutex<HashMap<String, Arc<TablePolicy>>>,
}

impl PolicyCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached policy for `schema.name`, resolving it on first use.
    ///
    /// Later schemas for the same table are not re-read: column metadata must
    /// stay fixed for the process lifetime. Debug builds assert that it does.
    pub fn get_or_resolve(&self, schema: &TableSchema) -> Arc<TablePolicy> {
        let mut policies = self.policies.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(policy) = policies.get(&schema.name) {
            debug_assert!(
                policy.matches(schema),
                "table '{}' changed column metadata after its policy was cached",
                schema.name
            );
            return Arc::clone(policy);
        }
        let policy = Arc::new(resolve(schema));
        policies.insert(schema.name.clone(), Arc::clone(&policy));
        tracing::debug!(table = %schema.name, columns = schema.columns.len(), "resolved column policy");
        policy
    }

    /// Install a pre-built policy (e.g., one carrying inline transformers).
    pub fn insert(&self, policy: TablePolicy) {
        let mut policies = self.policies.lock().unwrap_or_else(PoisonError::into_inner);
        policies.insert(policy.table.clone(), Arc::new(policy));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.policies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDef;
    use crate::value::Value;

    fn schema() -> TableSchema {
        TableSchema::new("accounts")
            .primary_key(["id"])
            .column(ColumnDef::new("id"))
            .column(ColumnDef::new("password").not_audited())
            .column(ColumnDef::new("updated_by").forced())
            .column(ColumnDef::new("email").transformed("lowercase"))
            .column(ColumnDef::new("token").not_audited().forced())
    }

    #[test]
    fn default_policy_is_audited_unforced() {
        let p = ColumnPolicy::default();
        assert!(p.auditable);
        assert!(!p.forced);
        assert!(p.transform.is_none());
    }

    #[test]
    fn resolves_flags_per_column() {
        let policy = resolve(&schema());
        assert!(policy.get("id").unwrap().auditable);
        assert!(!policy.get("password").unwrap().auditable);
        assert!(!policy.get("password").unwrap().is_recordable());
        assert!(policy.get("updated_by").unwrap().forced);
        assert!(matches!(
            policy.get("email").unwrap().transform,
            Some(TransformRef::Named(ref n)) if n == "lowercase"
        ));
        let token = policy.get("token").unwrap();
        assert!(!token.auditable && token.forced && token.is_recordable());
    }

    #[test]
    fn unknown_transform_is_not_resolved_eagerly() {
        let schema = TableSchema::new("t").column(ColumnDef::new("a").transformed("missing"));
        let policy = resolve(&schema);
        assert!(policy.get("a").unwrap().transform.is_some());
    }

    #[test]
    fn preserves_declaration_order() {
        let policy = resolve(&schema());
        let names: Vec<_> = policy.columns().map(|(n, _)| n).collect();
        assert_eq!(names, ["id", "password", "updated_by", "email", "token"]);
    }

    #[test]
    fn cache_returns_same_policy() {
        let cache = PolicyCache::new();
        let a = cache.get_or_resolve(&schema());
        let b = cache.get_or_resolve(&schema());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn matches_detects_changed_flags() {
        let policy = resolve(&schema());
        assert!(policy.matches(&schema()));

        let mut changed = schema();
        changed.columns[0] = ColumnDef::new("id").not_audited();
        assert!(!policy.matches(&changed));

        let mut extra = schema();
        extra.columns.push(ColumnDef::new("nickname"));
        assert!(!policy.matches(&extra));
    }

    #[test]
    fn inline_transform_still_matches_schema() {
        let mut policy = resolve(&schema());
        assert!(policy.set_transform("email", ValueTransformer::new(|_, v| v.clone())));
        assert!(policy.matches(&schema()));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "changed column metadata")]
    fn cache_rejects_redeclared_table_in_debug() {
        let cache = PolicyCache::new();
        cache.get_or_resolve(&schema());
        let mut changed = schema();
        changed.columns[0] = ColumnDef::new("id").not_audited();
        cache.get_or_resolve(&changed);
    }

    #[test]
    fn inline_transform_override() {
        let mut policy = resolve(&schema());
        assert!(policy.set_transform("id", ValueTransformer::new(|_, _| Value::Null)));
        assert!(!policy.set_transform("nope", ValueTransformer::new(|_, v| v.clone())));
        assert!(matches!(
            policy.get("id").unwrap().transform,
            Some(TransformRef::Inline(_))
        ));
    }
}
