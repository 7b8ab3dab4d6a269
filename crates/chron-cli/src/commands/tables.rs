use chron_db::registry::{list_fields, list_tables};
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct AuditedTable {
    id: i64,
    name: String,
    declared: bool,
    fields: Vec<String>,
}

/// Handle `chron tables`.
///
/// Lists every table that has audit history, marking whether it is still
/// declared in configuration.
pub async fn handle(ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let conn = ctx.service.db().conn();
    let mut tables = Vec::new();
    for (id, name) in list_tables(conn).await? {
        let fields = list_fields(conn, id)
            .await?
            .into_iter()
            .map(|(_, field)| field)
            .collect();
        tables.push(AuditedTable {
            id,
            declared: ctx.config.table(&name).is_some(),
            name,
            fields,
        });
    }
    output(&tables, flags.format)
}
