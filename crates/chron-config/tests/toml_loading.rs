//! Integration tests for TOML and environment configuration loading.
//!
//! Uses figment::Jail for sandboxed files and env var manipulation.

use chron_config::ChronConfig;
use chron_core::enums::LateAttribution;
use figment::{
    Figment, Jail,
    providers::{Env, Format, Serialized, Toml},
};
use pretty_assertions::assert_eq;

#[test]
fn loads_tables_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[database]
path = "audit.db"

[[tables]]
name = "shop.items"
primary_key = ["shop_id", "item_id"]
columns = [
    { name = "shop_id" },
    { name = "item_id" },
    { name = "title", transform = "trim" },
    { name = "cost_price", audit = false },
    { name = "modified_by", force = true },
]
"#,
        )?;

        let config: ChronConfig = Figment::from(Serialized::defaults(ChronConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.database.path, "audit.db");
        let items = config.table("shop.items").expect("table declared");
        assert_eq!(items.primary_key, ["shop_id", "item_id"]);
        assert_eq!(items.columns.len(), 5);
        assert_eq!(items.columns[2].transform.as_deref(), Some("trim"));
        assert!(!items.columns[3].audit);
        assert!(items.columns[4].force);
        assert!(items.columns[0].audit && !items.columns[0].force);
        config.validate().expect("valid");
        Ok(())
    });
}

#[test]
fn project_file_is_discovered_under_root() {
    Jail::expect_with(|jail| {
        jail.create_dir(".chronicle")?;
        jail.create_file(
            ".chronicle/config.toml",
            r#"
[query]
default_limit = 7
"#,
        )?;

        let config = ChronConfig::load_from(jail.directory()).expect("config loads");
        assert_eq!(config.query.default_limit, 7);
        Ok(())
    });
}

#[test]
fn env_overrides_toml() {
    Jail::expect_with(|jail| {
        jail.create_dir(".chronicle")?;
        jail.create_file(
            ".chronicle/config.toml",
            r#"
[audit]
late_attribution = "warn"
"#,
        )?;
        jail.set_env("CHRONICLE_AUDIT__LATE_ATTRIBUTION", "reject");
        jail.set_env("CHRONICLE_DATABASE__PATH", ":memory:");

        let config = ChronConfig::load_from(jail.directory()).expect("config loads");
        assert_eq!(config.audit.late_attribution, LateAttribution::Reject);
        assert!(config.database.is_in_memory());
        Ok(())
    });
}

#[test]
fn invalid_retry_attempts_rejected() {
    Jail::expect_with(|jail| {
        jail.set_env("CHRONICLE_AUDIT__DICTIONARY_RETRY_ATTEMPTS", "0");
        let result = ChronConfig::load_from(jail.directory());
        assert!(result.is_err());
        Ok(())
    });
}

#[test]
fn env_provider_alone_maps_nested_keys() {
    Jail::expect_with(|jail| {
        jail.set_env("CHRONICLE_QUERY__DEFAULT_LIMIT", "25");
        let config: ChronConfig = Figment::from(Serialized::defaults(ChronConfig::default()))
            .merge(Env::prefixed("CHRONICLE_").split("__"))
            .extract()?;
        assert_eq!(config.query.default_limit, 25);
        Ok(())
    });
}
