//! Service layer driving audit capture inside business transactions.
//!
//! `ChronService` wraps `ChronDb` together with the process-lifetime state
//! the engine needs: the changeset coordinator, the column policy cache, and
//! the transform registry. Query methods are implemented in `repos/*` as
//! `impl ChronService` blocks.
//!
//! Every audited mutation follows this protocol, on the business
//! transaction's own handle:
//! 1. Resolve the table's column policy (cached)
//! 2. Diff old/new rows into field changes
//! 3. Get or create the transaction's changeset
//! 4. Write the action and its changes
//!
//! Nothing is committed independently; `AuditTx::commit` commits business
//! and audit rows together. A transaction whose audit failed can only be
//! rolled back: `commit` refuses it.
//!
//! Transactions begin `IMMEDIATE`, taking the write lock up front. Concurrent
//! writers then queue on the busy timeout instead of deadlocking on a
//! read-to-write lock upgrade.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chron_config::ChronConfig;
use chron_core::diff::diff;
use chron_core::mutation::MutationHook;
use chron_core::policy::{PolicyCache, TablePolicy};
use chron_core::transform::{RowContext, TransformRegistry};
use chron_core::value::Value;

use crate::ChronDb;
use crate::coordinator::{Attribution, ChangesetCoordinator, TxId};
use crate::error::DatabaseError;
use crate::retry::RetryConfig;
use crate::writer::{self, TxDictionary};

/// Default result limit for change queries when none is configured.
const DEFAULT_QUERY_LIMIT: u32 = 100;

/// Entry point for recording and querying audit history.
pub struct ChronService {
    db: ChronDb,
    coordinator: Arc<ChangesetCoordinator>,
    policies: Arc<PolicyCache>,
    transforms: Arc<TransformRegistry>,
    retry: RetryConfig,
    default_limit: u32,
}

impl ChronService {
    /// Create a service over a local database with default settings.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn new_local(db_path: &str) -> Result<Self, DatabaseError> {
        let db = ChronDb::open_local(db_path).await?;
        Ok(Self::from_db(db))
    }

    /// Create a service from loaded configuration.
    ///
    /// Creates the database's parent directory when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the directory or database cannot be opened.
    pub async fn from_config(config: &ChronConfig) -> Result<Self, DatabaseError> {
        if !config.database.is_in_memory() {
            if let Some(parent) = Path::new(&config.database.path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("creating database directory {}", parent.display())
                    })?;
                }
            }
        }

        let db = ChronDb::open_local(&config.database.path).await?;
        tracing::debug!(path = %config.database.path, "opened audit database");
        Ok(Self {
            db,
            coordinator: Arc::new(ChangesetCoordinator::new(config.audit.late_attribution)),
            policies: Arc::new(PolicyCache::new()),
            transforms: Arc::new(TransformRegistry::with_builtins()),
            retry: RetryConfig::with_attempts(config.audit.dictionary_retry_attempts),
            default_limit: config.query.default_limit,
        })
    }

    /// Create from an existing `ChronDb` (for testing).
    #[must_use]
    pub fn from_db(db: ChronDb) -> Self {
        Self {
            db,
            coordinator: Arc::new(ChangesetCoordinator::default()),
            policies: Arc::new(PolicyCache::new()),
            transforms: Arc::new(TransformRegistry::with_builtins()),
            retry: RetryConfig::default(),
            default_limit: DEFAULT_QUERY_LIMIT,
        }
    }

    /// Replace the changeset coordinator, e.g., to change the late-attribution policy.
    #[must_use]
    pub fn with_coordinator(mut self, coordinator: ChangesetCoordinator) -> Self {
        self.coordinator = Arc::new(coordinator);
        self
    }

    /// Register (or replace) a named value transformer.
    ///
    /// Transactions already begun keep the registry they started with.
    pub fn register_transform<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&RowContext<'_>, &Value) -> Value + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.transforms).register(name, f);
    }

    /// Install a pre-built policy for a table, overriding schema resolution.
    pub fn register_policy(&self, policy: TablePolicy) {
        self.policies.insert(policy);
    }

    /// Access the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &ChronDb {
        &self.db
    }

    #[must_use]
    pub fn coordinator(&self) -> &ChangesetCoordinator {
        &self.coordinator
    }

    #[must_use]
    pub const fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Result limit applied when a change query does not set one.
    #[must_use]
    pub const fn default_limit(&self) -> u32 {
        self.default_limit
    }

    /// Begin a business transaction on the primary connection.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the transaction cannot be started.
    pub async fn begin(&self, attribution: Attribution) -> Result<AuditTx, DatabaseError> {
        self.begin_on(self.db.conn(), attribution).await
    }

    /// Begin a business transaction on a specific connection.
    ///
    /// Use one connection per concurrently open transaction
    /// (see [`ChronDb::connect`]). A second writer blocks here, up to the
    /// connection's busy timeout, until the first one finishes.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the transaction cannot be started.
    pub async fn begin_on(
        &self,
        conn: &libsql::Connection,
        attribution: Attribution,
    ) -> Result<AuditTx, DatabaseError> {
        let tx = conn
            .transaction_with_behavior(libsql::TransactionBehavior::Immediate)
            .await?;
        let id = self.coordinator.begin();
        tracing::debug!(%id, user = ?attribution.user, "began audit transaction");
        Ok(AuditTx {
            id,
            tx: Some(tx),
            attribution,
            coordinator: Arc::clone(&self.coordinator),
            policies: Arc::clone(&self.policies),
            transforms: Arc::clone(&self.transforms),
            retry: self.retry.clone(),
            dictionary: TxDictionary::new(),
            failed: false,
        })
    }
}

/// One business transaction with audit capture.
///
/// Business SQL runs through [`AuditTx::execute`]/[`AuditTx::query`]; each
/// mutation is then reported with [`AuditTx::record_mutation`]. Dropping the
/// handle without committing rolls everything back and discards the
/// transaction's changeset.
///
/// Once `record_mutation` fails the transaction is poisoned: further
/// mutations are refused and `commit` rolls back instead.
pub struct AuditTx {
    id: TxId,
    tx: Option<libsql::Transaction>,
    attribution: Attribution,
    coordinator: Arc<ChangesetCoordinator>,
    policies: Arc<PolicyCache>,
    transforms: Arc<TransformRegistry>,
    retry: RetryConfig,
    dictionary: TxDictionary,
    failed: bool,
}

impl AuditTx {
    #[must_use]
    pub const fn id(&self) -> TxId {
        self.id
    }

    /// The changeset created so far, if any mutation has been recorded.
    #[must_use]
    pub fn changeset_id(&self) -> Option<i64> {
        self.coordinator.cached(self.id)
    }

    #[must_use]
    pub const fn attribution(&self) -> &Attribution {
        &self.attribution
    }

    /// Whether an audited mutation failed on this transaction.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.failed
    }

    fn handle(&self) -> Result<&libsql::Transaction, DatabaseError> {
        self.tx
            .as_ref()
            .ok_or_else(|| DatabaseError::InvalidState(format!("{} already finished", self.id)))
    }

    /// Declare the actor and description for this transaction's changeset.
    ///
    /// Only effective before the first recorded mutation. Afterwards the
    /// coordinator's late-attribution policy decides between a warning and
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Core` with `CoreError::LateAttribution` under
    /// the `reject` policy.
    pub fn set_attribution(&mut self, attribution: Attribution) -> Result<(), DatabaseError> {
        if self.coordinator.admit_attribution(self.id, &attribution)? {
            self.attribution = attribution;
        }
        Ok(())
    }

    /// Execute business SQL inside this transaction.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the statement fails.
    pub async fn execute(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<u64, DatabaseError> {
        Ok(self.handle()?.execute(sql, params).await?)
    }

    /// Run a query inside this transaction.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn query(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<libsql::Rows, DatabaseError> {
        Ok(self.handle()?.query(sql, params).await?)
    }

    /// Audit one row mutation and return the new action id.
    ///
    /// # Errors
    ///
    /// - `DatabaseError::Core` for unknown transforms or inconsistent rows.
    /// - `DatabaseError` for any persistence failure.
    ///
    /// Either way the transaction is marked failed: earlier writes for the
    /// failed mutation may already be on it, so it can no longer commit.
    /// Calling this again on a failed transaction returns
    /// `DatabaseError::InvalidState`.
    pub async fn record_mutation<M: MutationHook + ?Sized>(
        &mut self,
        mutation: &M,
    ) -> Result<i64, DatabaseError> {
        if self.failed {
            return Err(DatabaseError::InvalidState(format!(
                "{} already failed to record a mutation",
                self.id
            )));
        }
        let result = self.audit(mutation).await;
        if let Err(e) = &result {
            self.failed = true;
            tracing::debug!(
                id = %self.id,
                table = %mutation.table().name,
                error = %e,
                "audit failed; transaction must roll back"
            );
        }
        result
    }

    async fn audit<M: MutationHook + ?Sized>(&mut self, mutation: &M) -> Result<i64, DatabaseError> {
        let action = mutation.action();
        let policy = self.policies.get_or_resolve(mutation.table());
        let changes = diff(
            action,
            mutation.old_row(),
            mutation.new_row(),
            &policy,
            &self.transforms,
        )?;

        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| DatabaseError::InvalidState(format!("{} already finished", self.id)))?;
        let changeset_id = self
            .coordinator
            .current_changeset(tx, self.id, &self.attribution, &self.retry)
            .await?;

        writer::record(
            tx,
            &self.retry,
            &mut self.dictionary,
            action,
            policy.table(),
            mutation.primary_key_values(),
            &changes,
            changeset_id,
        )
        .await
    }

    /// Commit business and audit rows together.
    ///
    /// Returns the transaction's changeset id, or `None` if nothing was audited.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the commit fails; nothing is persisted.
    /// Returns `DatabaseError::InvalidState` after rolling back if a mutation
    /// failed to record.
    pub async fn commit(mut self) -> Result<Option<i64>, DatabaseError> {
        let tx = self.tx.take().ok_or_else(|| {
            DatabaseError::InvalidState(format!("{} already finished", self.id))
        })?;
        let changeset_id = self.coordinator.end(self.id);
        if self.failed {
            tx.rollback().await?;
            tracing::debug!(id = %self.id, ?changeset_id, "refused commit after failed audit");
            return Err(DatabaseError::InvalidState(format!(
                "{} has a failed audited mutation and was rolled back",
                self.id
            )));
        }
        tx.commit().await?;
        tracing::debug!(id = %self.id, ?changeset_id, "committed audit transaction");
        Ok(changeset_id)
    }

    /// Roll back business and audit rows together.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the rollback statement fails.
    pub async fn rollback(mut self) -> Result<(), DatabaseError> {
        let changeset_id = self.coordinator.end(self.id);
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        tracing::debug!(id = %self.id, ?changeset_id, "rolled back audit transaction");
        Ok(())
    }
}

impl Drop for AuditTx {
    fn drop(&mut self) {
        self.coordinator.end(self.id);
        if self.tx.is_some() {
            tracing::debug!(id = %self.id, "audit transaction dropped without commit");
        }
    }
}
