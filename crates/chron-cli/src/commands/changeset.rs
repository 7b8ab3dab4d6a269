use chron_core::entities::{ActionEntry, ChangeEntry, Changeset};
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::cli::OutputFormat;
use crate::cli::root_commands::ChangesetCommands;
use crate::commands::shared::limit::effective_limit;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct ActionDetail {
    #[serde(flatten)]
    action: ActionEntry,
    changes: Vec<ChangeEntry>,
}

#[derive(Debug, Serialize)]
struct ChangesetDetail {
    changeset: Changeset,
    actions: Vec<ActionDetail>,
}

/// Flat row for table output: one line per change.
#[derive(Debug, Serialize)]
struct ChangeLine {
    action_id: i64,
    table: String,
    audited_row: String,
    action_type: String,
    field: Option<String>,
    old_value: Option<String>,
    new_value: Option<String>,
}

/// Handle `chron changeset`.
pub async fn handle(
    action: &ChangesetCommands,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match action {
        ChangesetCommands::Show { id } => show(*id, ctx, flags).await,
        ChangesetCommands::List => {
            let limit = effective_limit(flags.limit, ctx.service.default_limit());
            let changesets = ctx.service.list_changesets(Some(limit)).await?;
            output(&changesets, flags.format)
        }
    }
}

async fn show(id: i64, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let Some(changeset) = ctx.service.get_changeset(id).await? else {
        anyhow::bail!("changeset {id} not found");
    };

    let mut actions = Vec::new();
    for action in ctx.service.actions_for_changeset(id).await? {
        let changes = ctx.service.changes_for_action(action.id).await?;
        actions.push(ActionDetail { action, changes });
    }

    if flags.format == OutputFormat::Table {
        return output(&flatten(&actions), flags.format);
    }
    output(&ChangesetDetail { changeset, actions }, flags.format)
}

fn flatten(actions: &[ActionDetail]) -> Vec<ChangeLine> {
    let mut lines = Vec::new();
    for detail in actions {
        let line = |change: Option<&ChangeEntry>| ChangeLine {
            action_id: detail.action.id,
            table: detail.action.table.clone(),
            audited_row: detail.action.audited_row.clone(),
            action_type: detail.action.action_type.to_string(),
            field: change.map(|c| c.field.clone()),
            old_value: change.and_then(|c| c.old_value.clone()),
            new_value: change.and_then(|c| c.new_value.clone()),
        };
        if detail.changes.is_empty() {
            lines.push(line(None));
        } else {
            lines.extend(detail.changes.iter().map(|c| line(Some(c))));
        }
    }
    lines
}
