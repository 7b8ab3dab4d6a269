use chron_core::mutation::MutationRecord;
use schemars::schema_for;

use crate::cli::GlobalFlags;
use crate::cli::OutputFormat;
use crate::cli::root_commands::SchemaArgs;
use crate::output::output;

/// Handle `chron schema`.
pub fn handle(args: &SchemaArgs, flags: &GlobalFlags) -> anyhow::Result<()> {
    let schema = serde_json::to_value(schema_for!(MutationRecord))?;
    let format = if args.pretty {
        OutputFormat::Json
    } else {
        flags.format
    };
    output(&schema, format)
}
