use clap::{Args, Subcommand};

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Create or upgrade the audit schema.
    Migrate,
    /// Record a JSONL batch of row mutations as one changeset.
    Record(RecordArgs),
    /// Show the change history of one row.
    Changes(ChangesArgs),
    /// Inspect changesets.
    Changeset {
        #[command(subcommand)]
        action: ChangesetCommands,
    },
    /// List audited tables and their fields.
    Tables,
    /// Print the JSON Schema of a mutation batch line.
    Schema(SchemaArgs),
}

#[derive(Clone, Debug, Args)]
pub struct RecordArgs {
    /// JSONL file with one mutation per line, or `-` for stdin.
    pub input: String,
    /// Actor identifier for the changeset.
    #[arg(long)]
    pub user: Option<String>,
    /// Free-text description for the changeset.
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Args)]
pub struct ChangesArgs {
    /// Audited table name.
    #[arg(long)]
    pub table: String,
    /// Row identifier (primary key values joined with `-`).
    #[arg(long)]
    pub row: String,
    /// Only this action type (insert, update, delete).
    #[arg(long)]
    pub action: Option<String>,
    /// Only this field.
    #[arg(long)]
    pub field: Option<String>,
    /// Compare changeset time with this operator (eq, ne, lt, le, gt, ge).
    #[arg(long, requires = "created_on")]
    pub created_op: Option<String>,
    /// RFC 3339 timestamp for the comparison.
    #[arg(long, requires = "created_op")]
    pub created_on: Option<String>,
    /// Sort by change order: asc or desc.
    #[arg(long, default_value = "asc")]
    pub order: String,
}

#[derive(Clone, Debug, Subcommand)]
pub enum ChangesetCommands {
    /// Show one changeset with its actions and changes.
    Show {
        /// Changeset id.
        id: i64,
    },
    /// List recent changesets, newest first.
    List,
}

#[derive(Clone, Debug, Args)]
pub struct SchemaArgs {
    /// Pretty-print regardless of --format.
    #[arg(long)]
    pub pretty: bool,
}
