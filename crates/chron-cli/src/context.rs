use std::path::{Path, PathBuf};

use anyhow::Context;
use chron_config::{ChronConfig, PROJECT_DIR};
use chron_db::service::ChronService;

use crate::cli::GlobalFlags;

/// Shared state for command handlers.
pub struct AppContext {
    pub project_root: PathBuf,
    pub config: ChronConfig,
    pub service: ChronService,
}

impl AppContext {
    /// Load configuration for the project and open its audit database.
    pub async fn init(flags: &GlobalFlags) -> anyhow::Result<Self> {
        let project_root = resolve_project_root(flags.project.as_deref())?;
        let mut config = ChronConfig::load_with_dotenv(&project_root)
            .context("failed to load chronicle configuration")?;

        if let Some(db) = &flags.db {
            config.database.path.clone_from(db);
        }
        config.database.path = database_path(&project_root, &config.database.path);

        tracing::debug!(
            root = %project_root.display(),
            db = %config.database.path,
            tables = config.tables.len(),
            "initializing context"
        );
        let service = ChronService::from_config(&config)
            .await
            .with_context(|| format!("failed to open audit database {}", config.database.path))?;

        Ok(Self {
            project_root,
            config,
            service,
        })
    }
}

/// Resolve a configured database path against the project root.
fn database_path(root: &Path, configured: &str) -> String {
    if configured == ":memory:" || Path::new(configured).is_absolute() {
        return configured.to_string();
    }
    root.join(configured).to_string_lossy().into_owned()
}

fn resolve_project_root(project_override: Option<&str>) -> anyhow::Result<PathBuf> {
    if let Some(path) = project_override {
        let explicit = PathBuf::from(path);

        if explicit
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name == PROJECT_DIR)
        {
            return explicit
                .parent()
                .map(Path::to_path_buf)
                .context("invalid --project path: '.chronicle' directory has no parent");
        }

        if explicit.is_dir() {
            return Ok(explicit);
        }

        anyhow::bail!(
            "invalid --project '{}': directory does not exist",
            explicit.display()
        );
    }

    let start = std::env::current_dir().context("failed to read current directory")?;
    Ok(find_project_root(&start).unwrap_or(start))
}

/// Nearest ancestor of `start` (inclusive) containing a `.chronicle` directory.
fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(PROJECT_DIR).is_dir())
        .map(Path::to_path_buf)
}
