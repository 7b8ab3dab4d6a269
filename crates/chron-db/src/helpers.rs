//! Row-to-entity parsing helpers.
//!
//! Audit rows are read back by column index; these helpers isolate the
//! parsing of timestamps, enums, and nullable text.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::DatabaseError;

/// Render a timestamp the way `created_on` is stored.
///
/// Fixed-width RFC 3339 UTC with microseconds, so lexical comparison in SQL
/// matches chronological order.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a required TEXT column as `DateTime<Utc>`.
///
/// Handles both RFC 3339 (`"2026-02-09T14:30:00.000000Z"`) and `SQLite`'s default
/// format (`"2026-02-09 14:30:00"`).
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string cannot be parsed as either format.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| DatabaseError::Query(format!("Failed to parse datetime '{s}': {e}")))
}

/// Parse a TEXT column into a serde-deserializable enum.
///
/// Works with all chron-core enums that use `#[serde(rename_all = "snake_case")]`.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string does not match any enum variant.
pub fn parse_enum<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, DatabaseError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|e| DatabaseError::Query(format!("Failed to parse enum from '{s}': {e}")))
}

/// Read a nullable TEXT column.
///
/// `row.get::<String>(idx)` on a NULL column returns an error, not `""`.
/// Unlike display-oriented columns, an empty string is preserved: audit
/// values distinguish `""` from NULL.
///
/// # Errors
///
/// Returns `DatabaseError` if the column read fails.
pub fn get_opt_string(row: &libsql::Row, idx: i32) -> Result<Option<String>, DatabaseError> {
    Ok(row.get::<Option<String>>(idx)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chron_core::enums::ActionType;

    #[test]
    fn timestamps_roundtrip() {
        let now = Utc::now();
        let text = format_timestamp(&now);
        assert!(text.ends_with('Z'));
        let parsed = parse_datetime(&text).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn sqlite_default_format_parses() {
        let parsed = parse_datetime("2026-02-09 14:30:00").unwrap();
        assert_eq!(format_timestamp(&parsed), "2026-02-09T14:30:00.000000Z");
    }

    #[test]
    fn enum_parsing() {
        let action: ActionType = parse_enum("delete").unwrap();
        assert_eq!(action, ActionType::Delete);
        assert!(parse_enum::<ActionType>("upsert").is_err());
    }
}
