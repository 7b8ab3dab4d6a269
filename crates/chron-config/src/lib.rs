//! # chron-config
//!
//! Layered configuration loading for Chronicle using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`CHRONICLE_*` prefix, `__` as separator)
//! 2. Project-level `.chronicle/config.toml`
//! 3. User-level `~/.config/chronicle/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `CHRONICLE_DATABASE__PATH` -> `database.path`,
//! `CHRONICLE_AUDIT__LATE_ATTRIBUTION` -> `audit.late_attribution`, etc.
//!
//! # Audited tables
//!
//! The `[[tables]]` array carries the column metadata a host would otherwise
//! derive from its ORM:
//!
//! ```toml
//! [[tables]]
//! name = "shop.items"
//! primary_key = ["shop_id", "item_id"]
//! columns = [
//!     { name = "shop_id" },
//!     { name = "item_id" },
//!     { name = "title", transform = "trim" },
//!     { name = "cost_price", audit = false },
//!     { name = "modified_by", force = true },
//! ]
//! ```

mod audit;
mod database;
mod error;
mod query;

pub use audit::AuditConfig;
pub use database::DatabaseConfig;
pub use error::ConfigError;
pub use query::QueryConfig;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chron_core::schema::TableSchema;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

/// Project-local configuration directory name.
pub const PROJECT_DIR: &str = ".chronicle";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChronConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub tables: Vec<TableSchema>,
}

impl ChronConfig {
    /// Load configuration from all sources rooted at the current directory.
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] for `.env` support.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new("."))
    }

    /// Load configuration with the project-local file resolved under `root`.
    pub fn load_from(root: &Path) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(root).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.env` (if any) from `root`, then load configuration.
    pub fn load_with_dotenv(root: &Path) -> Result<Self, ConfigError> {
        let env_path = root.join(".env");
        if env_path.exists() {
            let _ = dotenvy::from_path(&env_path);
        } else {
            let _ = dotenvy::dotenv();
        }
        Self::load_from(root)
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can inspect the figment or layer providers on top.
    pub fn figment(root: &Path) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Layer 1: User-global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        // Layer 2: Project-local config
        let local_path = Self::project_config_path(root);
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        // Layer 3: Environment variables (highest priority)
        figment.merge(Env::prefixed("CHRONICLE_").split("__"))
    }

    /// Path to the project-local config file under `root`.
    pub fn project_config_path(root: &Path) -> PathBuf {
        root.join(PROJECT_DIR).join("config.toml")
    }

    /// Path to the user-global config file.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("chronicle").join("config.toml"))
    }

    /// Look up an audited table's schema by name.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Check structural consistency of the table declarations.
    ///
    /// Transform names are not checked here; an unknown transform fails the
    /// mutation that first needs it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audit.dictionary_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "audit.dictionary_retry_attempts".into(),
                reason: "must be at least 1".into(),
            });
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            if table.name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "tables.name".into(),
                    reason: "table name must not be empty".into(),
                });
            }
            if !seen.insert(table.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("tables.{}", table.name),
                    reason: "declared more than once".into(),
                });
            }

            let mut columns = HashSet::new();
            for column in &table.columns {
                if !columns.insert(column.name.as_str()) {
                    return Err(ConfigError::InvalidValue {
                        field: format!("tables.{}.columns.{}", table.name, column.name),
                        reason: "declared more than once".into(),
                    });
                }
            }

            if !table.columns.is_empty() {
                if let Some(missing) = table
                    .primary_key
                    .iter()
                    .find(|pk| !columns.contains(pk.as_str()))
                {
                    return Err(ConfigError::InvalidValue {
                        field: format!("tables.{}.primary_key", table.name),
                        reason: format!("'{missing}' is not a declared column"),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chron_core::enums::LateAttribution;
    use chron_core::schema::ColumnDef;

    #[test]
    fn default_config_loads() {
        let config = ChronConfig::default();
        assert_eq!(config.database.path, ".chronicle/audit.db");
        assert_eq!(config.audit.late_attribution, LateAttribution::Warn);
        assert_eq!(config.query.default_limit, 100);
        assert!(config.tables.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn figment_builds_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let config: ChronConfig = ChronConfig::figment(dir.path())
            .extract()
            .expect("should extract defaults");
        assert_eq!(config.audit.dictionary_retry_attempts, 4);
    }

    #[test]
    fn duplicate_table_is_invalid() {
        let config = ChronConfig {
            tables: vec![TableSchema::new("a"), TableSchema::new("a")],
            ..ChronConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn primary_key_must_be_declared() {
        let config = ChronConfig {
            tables: vec![
                TableSchema::new("a")
                    .primary_key(["id"])
                    .column(ColumnDef::new("name")),
            ],
            ..ChronConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'id' is not a declared column"));
    }

    #[test]
    fn table_lookup() {
        let config = ChronConfig {
            tables: vec![TableSchema::new("a"), TableSchema::new("b")],
            ..ChronConfig::default()
        };
        assert_eq!(config.table("b").map(|t| t.name.as_str()), Some("b"));
        assert!(config.table("c").is_none());
    }
}
