//! Value transformers: per-column functions substituting the value written to
//! the audit log.
//!
//! Transformers are referenced from column metadata by name and resolved
//! against a [`TransformRegistry`] only when a column is actually selected for
//! recording. An unresolvable name is a [`CoreError::Configuration`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::enums::ActionType;
use crate::errors::CoreError;
use crate::value::{Row, Value};

/// Replacement text written by the `redact` transform.
pub const REDACTED: &str = "[redacted]";

/// Context handed to a transformer alongside the raw value.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub table: &'a str,
    pub column: &'a str,
    pub action: ActionType,
    pub old_row: Option<&'a Row>,
    pub new_row: Option<&'a Row>,
}

type TransformFn = dyn Fn(&RowContext<'_>, &Value) -> Value + Send + Sync;

/// A callable `(row context, raw value) -> substituted value`.
#[derive(Clone)]
pub struct ValueTransformer(Arc<TransformFn>);

impl ValueTransformer {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&RowContext<'_>, &Value) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    #[must_use]
    pub fn apply(&self, ctx: &RowContext<'_>, value: &Value) -> Value {
        (self.0)(ctx, value)
    }
}

impl fmt::Debug for ValueTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValueTransformer(..)")
    }
}

/// How a column refers to its transformer.
#[derive(Debug, Clone)]
pub enum TransformRef {
    /// Looked up in the registry when needed.
    Named(String),
    /// Already a callable.
    Inline(ValueTransformer),
}

/// Named transformers available to column metadata.
#[derive(Debug, Clone)]
pub struct TransformRegistry {
    transforms: HashMap<String, ValueTransformer>,
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TransformRegistry {
    /// An empty registry. Every named reference will fail to resolve.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            transforms: HashMap::new(),
        }
    }

    /// Registry preloaded with `lowercase`, `uppercase`, `trim`, and `redact`.
    ///
    /// Text transforms leave non-text values untouched; `redact` replaces any
    /// non-null value.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("lowercase", |_, v| map_text(v, str::to_lowercase));
        registry.register("uppercase", |_, v| map_text(v, str::to_uppercase));
        registry.register("trim", |_, v| map_text(v, |s| s.trim().to_string()));
        registry.register("redact", |_, v| {
            if v.is_null() {
                Value::Null
            } else {
                Value::from(REDACTED)
            }
        });
        registry
    }

    /// Register (or replace) a named transformer.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&RowContext<'_>, &Value) -> Value + Send + Sync + 'static,
    {
        self.transforms.insert(name.into(), ValueTransformer::new(f));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ValueTransformer> {
        self.transforms.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    /// Resolve a column's reference to a callable.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` if a named reference is not registered.
    pub fn resolve(
        &self,
        reference: &TransformRef,
        table: &str,
        column: &str,
    ) -> Result<ValueTransformer, CoreError> {
        match reference {
            TransformRef::Inline(t) => Ok(t.clone()),
            TransformRef::Named(name) => {
                self.get(name)
                    .cloned()
                    .ok_or_else(|| CoreError::Configuration {
                        table: table.to_string(),
                        column: column.to_string(),
                        transform: name.clone(),
                    })
            }
        }
    }
}

fn map_text(value: &Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::Text(s) => Value::Text(f(s)),
        other => other.clone(),
    }
}
