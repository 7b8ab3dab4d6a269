use chron_core::entities::ChangeRecord;
use chron_core::enums::{ActionType, Comparison, SortOrder};
use chron_db::repos::changes::ChangeFilter;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::ChangesArgs;
use crate::commands::shared::limit::effective_limit;
use crate::commands::shared::parse::{parse_enum, parse_timestamp};
use crate::context::AppContext;
use crate::output::output;

/// Handle `chron changes`.
pub async fn handle(args: &ChangesArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let records = fetch(args, ctx, flags).await?;
    output(&records, flags.format)
}

pub async fn fetch(
    args: &ChangesArgs,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<Vec<ChangeRecord>> {
    let filter = build_filter(args, effective_limit(flags.limit, ctx.service.default_limit()))?;
    ctx.service.query_changes(&filter).await.map_err(Into::into)
}

fn build_filter(args: &ChangesArgs, limit: u32) -> anyhow::Result<ChangeFilter> {
    let mut filter = ChangeFilter::new(&args.table, &args.row)
        .order(parse_enum::<SortOrder>(&args.order, "order")?)
        .limit(limit);

    if let Some(action) = args.action.as_deref() {
        filter = filter.action(parse_enum::<ActionType>(action, "action")?);
    }
    if let Some(field) = &args.field {
        filter = filter.field(field);
    }
    if let (Some(op), Some(at)) = (args.created_op.as_deref(), args.created_on.as_deref()) {
        filter = filter.created_on(
            parse_enum::<Comparison>(op, "created-op")?,
            parse_timestamp(at, "created-on")?,
        );
    }
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ChangesArgs {
        ChangesArgs {
            table: "people".into(),
            row: "8".into(),
            action: None,
            field: None,
            created_op: None,
            created_on: None,
            order: "asc".into(),
        }
    }

    #[test]
    fn minimal_filter() {
        let filter = build_filter(&args(), 25).unwrap();
        assert_eq!(filter.table, "people");
        assert_eq!(filter.row, "8");
        assert_eq!(filter.limit, Some(25));
        assert_eq!(filter.order, SortOrder::Asc);
        assert!(filter.created_on.is_none());
    }

    #[test]
    fn full_filter() {
        let filter = build_filter(
            &ChangesArgs {
                action: Some("delete".into()),
                field: Some("phone".into()),
                created_op: Some("ge".into()),
                created_on: Some("2026-01-01T00:00:00Z".into()),
                order: "desc".into(),
                ..args()
            },
            10,
        )
        .unwrap();
        assert_eq!(filter.action, Some(ActionType::Delete));
        assert_eq!(filter.field.as_deref(), Some("phone"));
        assert_eq!(filter.order, SortOrder::Desc);
        assert_eq!(filter.created_on.map(|c| c.op), Some(Comparison::Ge));
    }

    #[test]
    fn bad_action_is_rejected() {
        let err = build_filter(
            &ChangesArgs {
                action: Some("upsert".into()),
                ..args()
            },
            10,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid action 'upsert'"));
    }
}
