use std::path::Path;

use anyhow::Context;
use chron_config::ChronConfig;
use chron_core::mutation::{MutationRecord, RowMutation};
use chron_db::coordinator::Attribution;
use chron_db::service::AuditTx;
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::RecordArgs;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct RecordResponse {
    changeset_id: Option<i64>,
    action_ids: Vec<i64>,
}

/// Handle `chron record`.
///
/// The whole batch is one business transaction: any failing line rolls back
/// every line before it.
pub async fn handle(args: &RecordArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let records = read_batch(&args.input)?;
    tracing::debug!(input = %args.input, mutations = records.len(), "read mutation batch");

    let attribution = Attribution::new(args.user.as_deref(), args.description.as_deref());
    let mut tx = ctx.service.begin(attribution).await?;

    match apply(&mut tx, records, &ctx.config).await {
        Ok(action_ids) => {
            let changeset_id = tx.commit().await.context("failed to commit audit batch")?;
            output(
                &RecordResponse {
                    changeset_id,
                    action_ids,
                },
                flags.format,
            )
        }
        Err(error) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(%rollback, "rollback after failed batch also failed");
            }
            Err(error)
        }
    }
}

fn read_batch(input: &str) -> anyhow::Result<Vec<MutationRecord>> {
    if input == "-" {
        return serde_jsonlines::JsonLinesReader::new(std::io::stdin().lock())
            .read_all::<MutationRecord>()
            .collect::<std::io::Result<Vec<_>>>()
            .context("failed to read mutation batch from stdin");
    }

    let path = Path::new(input);
    serde_jsonlines::json_lines::<MutationRecord, _>(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("failed to parse {}", path.display()))
}

async fn apply(
    tx: &mut AuditTx,
    records: Vec<MutationRecord>,
    config: &ChronConfig,
) -> anyhow::Result<Vec<i64>> {
    let mut action_ids = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        let line = index + 1;
        let schema = config.table(&record.table).with_context(|| {
            format!(
                "line {line}: table '{}' is not declared in [[tables]]",
                record.table
            )
        })?;
        let mutation = RowMutation::from_record(schema, record)
            .with_context(|| format!("line {line}: invalid mutation"))?;
        let action_id = tx
            .record_mutation(&mutation)
            .await
            .with_context(|| format!("line {line}: failed to record mutation"))?;
        action_ids.push(action_id);
    }
    Ok(action_ids)
}
