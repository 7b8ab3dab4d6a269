//! Changeset coordinator.
//!
//! Owns the mapping from live business transaction to its changeset id.
//! Each transaction moves through two states:
//!
//! ```text
//! NoChangeset --first audited mutation--> Created(changeset_id)
//! ```
//!
//! The entry is removed when the transaction commits, rolls back, or is
//! dropped, so an id is never handed to a later transaction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use chron_core::enums::LateAttribution;
use chron_core::errors::CoreError;

use crate::error::DatabaseError;
use crate::helpers::format_timestamp;
use crate::registry::resolve_user;
use crate::retry::RetryConfig;

/// Opaque handle identifying one business transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId(u64);

impl TxId {
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Actor and description a transaction declares for its changeset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribution {
    pub user: Option<String>,
    pub description: Option<String>,
}

impl Attribution {
    #[must_use]
    pub fn new(user: Option<&str>, description: Option<&str>) -> Self {
        Self {
            user: user.map(String::from),
            description: description.map(String::from),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.user.is_none() && self.description.is_none()
    }
}

/// Tracks the current changeset of every live transaction.
#[derive(Debug)]
pub struct ChangesetCoordinator {
    next_tx: AtomicU64,
    changesets: Mutex<HashMap<TxId, i64>>,
    late_attribution: LateAttribution,
}

impl Default for ChangesetCoordinator {
    fn default() -> Self {
        Self::new(LateAttribution::default())
    }
}

impl ChangesetCoordinator {
    #[must_use]
    pub fn new(late_attribution: LateAttribution) -> Self {
        Self {
            next_tx: AtomicU64::new(1),
            changesets: Mutex::new(HashMap::new()),
            late_attribution,
        }
    }

    #[must_use]
    pub const fn late_attribution(&self) -> LateAttribution {
        self.late_attribution
    }

    /// Register a new transaction in the `NoChangeset` state.
    pub fn begin(&self) -> TxId {
        TxId(self.next_tx.fetch_add(1, Ordering::Relaxed))
    }

    /// The changeset already created for `tx`, if any.
    #[must_use]
    pub fn cached(&self, tx: TxId) -> Option<i64> {
        self.changesets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tx)
            .copied()
    }

    /// Number of transactions currently holding a changeset.
    #[must_use]
    pub fn active(&self) -> usize {
        self.changesets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Return the changeset for `tx`, creating it on first call.
    ///
    /// `attribution` is only consulted when the changeset is created; the user
    /// is resolved through the user dictionary on `conn`, the same transaction
    /// the changeset row is inserted on.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if user resolution or the insert fails.
    pub async fn current_changeset(
        &self,
        conn: &libsql::Connection,
        tx: TxId,
        attribution: &Attribution,
        retry: &RetryConfig,
    ) -> Result<i64, DatabaseError> {
        if let Some(id) = self.cached(tx) {
            return Ok(id);
        }

        let user_id = match attribution.user.as_deref() {
            Some(user) => Some(resolve_user(conn, retry, user).await?),
            None => None,
        };

        let created_on = format_timestamp(&Utc::now());
        let mut rows = conn
            .query(
                "INSERT INTO audit_changeset (description, created_on, user_id)
                 VALUES (?1, ?2, ?3) RETURNING id",
                libsql::params![attribution.description.as_deref(), created_on.as_str(), user_id],
            )
            .await?;
        let id = rows
            .next()
            .await?
            .ok_or(DatabaseError::NoResult)?
            .get::<i64>(0)?;

        self.changesets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tx, id);
        tracing::debug!(%tx, changeset_id = id, user = ?attribution.user, "created changeset");
        Ok(id)
    }

    /// Apply the late-attribution policy to a user/description arriving for `tx`.
    ///
    /// Returns `Ok(true)` if no changeset exists yet and the attribution may
    /// still take effect, `Ok(false)` if it was ignored with a warning.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::LateAttribution` under the `reject` policy.
    pub fn admit_attribution(&self, tx: TxId, attribution: &Attribution) -> Result<bool, CoreError> {
        let Some(changeset_id) = self.cached(tx) else {
            return Ok(true);
        };
        match self.late_attribution {
            LateAttribution::Warn => {
                tracing::warn!(
                    %tx,
                    changeset_id,
                    user = ?attribution.user,
                    description = ?attribution.description,
                    "changeset already created; ignoring late attribution"
                );
                Ok(false)
            }
            LateAttribution::Reject => Err(CoreError::LateAttribution { changeset_id }),
        }
    }

    /// Tear down `tx`'s state. Safe to call more than once.
    pub fn end(&self, tx: TxId) -> Option<i64> {
        self.changesets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChronDb;

    async fn count_changesets(conn: &libsql::Connection) -> i64 {
        let mut rows = conn
            .query("SELECT COUNT(*) FROM audit_changeset", ())
            .await
            .unwrap();
        rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap()
    }

    #[tokio::test]
    async fn creates_once_per_transaction() {
        let db = ChronDb::open_local(":memory:").await.unwrap();
        let coordinator = ChangesetCoordinator::default();
        let retry = RetryConfig::default();
        let tx = coordinator.begin();
        let attribution = Attribution::new(Some("alice"), Some("import"));

        let first = coordinator
            .current_changeset(db.conn(), tx, &attribution, &retry)
            .await
            .unwrap();
        let second = coordinator
            .current_changeset(db.conn(), tx, &Attribution::default(), &retry)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(count_changesets(db.conn()).await, 1);
        assert_eq!(coordinator.active(), 1);
    }

    #[tokio::test]
    async fn separate_transactions_get_separate_changesets() {
        let db = ChronDb::open_local(":memory:").await.unwrap();
        let coordinator = ChangesetCoordinator::default();
        let retry = RetryConfig::default();
        let a = coordinator.begin();
        let b = coordinator.begin();
        assert_ne!(a, b);

        let cs_a = coordinator
            .current_changeset(db.conn(), a, &Attribution::default(), &retry)
            .await
            .unwrap();
        let cs_b = coordinator
            .current_changeset(db.conn(), b, &Attribution::default(), &retry)
            .await
            .unwrap();
        assert_ne!(cs_a, cs_b);
    }

    #[tokio::test]
    async fn end_discards_cached_changeset() {
        let db = ChronDb::open_local(":memory:").await.unwrap();
        let coordinator = ChangesetCoordinator::default();
        let tx = coordinator.begin();
        let id = coordinator
            .current_changeset(db.conn(), tx, &Attribution::default(), &RetryConfig::default())
            .await
            .unwrap();

        assert_eq!(coordinator.end(tx), Some(id));
        assert_eq!(coordinator.end(tx), None);
        assert_eq!(coordinator.cached(tx), None);
        assert_eq!(coordinator.active(), 0);
    }

    #[tokio::test]
    async fn user_is_resolved_and_linked() {
        let db = ChronDb::open_local(":memory:").await.unwrap();
        let coordinator = ChangesetCoordinator::default();
        let tx = coordinator.begin();
        let id = coordinator
            .current_changeset(
                db.conn(),
                tx,
                &Attribution::new(Some("8"), None),
                &RetryConfig::default(),
            )
            .await
            .unwrap();

        let mut rows = db
            .conn()
            .query(
                "SELECT u.name, cs.description FROM audit_changeset cs
                 JOIN audit_user u ON u.id = cs.user_id WHERE cs.id = ?1",
                [id],
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<String>(0).unwrap(), "8");
        assert_eq!(row.get::<Option<String>>(1).unwrap(), None);
    }

    #[tokio::test]
    async fn late_attribution_policies() {
        let db = ChronDb::open_local(":memory:").await.unwrap();
        let late = Attribution::new(Some("bob"), None);

        let warn = ChangesetCoordinator::new(LateAttribution::Warn);
        let tx = warn.begin();
        assert!(warn.admit_attribution(tx, &late).unwrap());
        warn.current_changeset(db.conn(), tx, &Attribution::default(), &RetryConfig::default())
            .await
            .unwrap();
        assert!(!warn.admit_attribution(tx, &late).unwrap());

        let reject = ChangesetCoordinator::new(LateAttribution::Reject);
        let tx = reject.begin();
        reject
            .current_changeset(db.conn(), tx, &Attribution::default(), &RetryConfig::default())
            .await
            .unwrap();
        assert!(matches!(
            reject.admit_attribution(tx, &late),
            Err(CoreError::LateAttribution { .. })
        ));
    }
}
