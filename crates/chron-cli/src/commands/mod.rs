pub mod changes;
pub mod changeset;
pub mod migrate;
pub mod record;
pub mod schema;
pub mod shared;
pub mod tables;

use crate::cli::{Commands, GlobalFlags};
use crate::context::AppContext;

/// Dispatch a parsed command to the corresponding handler module.
pub async fn dispatch(command: Commands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match command {
        Commands::Migrate => migrate::handle(ctx, flags),
        Commands::Record(args) => record::handle(&args, ctx, flags).await,
        Commands::Changes(args) => changes::handle(&args, ctx, flags).await,
        Commands::Changeset { action } => changeset::handle(&action, ctx, flags).await,
        Commands::Tables => tables::handle(ctx, flags).await,
        Commands::Schema(_) => unreachable!("schema is pre-dispatched in main"),
    }
}
