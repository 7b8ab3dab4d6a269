use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct MigrateResponse {
    project_root: String,
    database: String,
    declared_tables: usize,
    status: &'static str,
}

/// Handle `chron migrate`.
///
/// Opening the service already applied the schema; this reports where.
pub fn handle(ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    tracing::info!(database = %ctx.config.database.path, "audit schema is current");
    if flags.quiet {
        return Ok(());
    }
    output(
        &MigrateResponse {
            project_root: ctx.project_root.display().to_string(),
            database: ctx.config.database.path.clone(),
            declared_tables: ctx.config.tables.len(),
            status: "ok",
        },
        flags.format,
    )
}
