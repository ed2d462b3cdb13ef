//! Expired subtree collector
//!
//! Background sweep that permanently deletes departments whose soft deletion
//! is older than the retention window. Surviving children are detached (they
//! live on as new roots), locations and positions linked nowhere outside the
//! collected set are removed. Each pass runs in its own transaction; a failed
//! pass rolls back, is logged and retried on the next interval, never
//! surfaced to a caller.

use chrono::Utc;
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::path::TreePath;
use crate::error::{OrgError, OrgResult};
use crate::service::audit::{ops, OpLogWriter};
use crate::service::CancelSignal;
use crate::store;

/// Row counts of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub candidates: usize,
    pub detached_children: u64,
    pub deleted_links: u64,
    pub deleted_locations: u64,
    pub deleted_positions: u64,
    pub deleted_departments: u64,
}

pub struct ExpiredSubtreeCollector {
    db: Arc<DatabaseConnection>,
    retention_secs: i64,
    audit: OpLogWriter,
}

impl ExpiredSubtreeCollector {
    pub fn new(db: DatabaseConnection, retention_secs: i64) -> Self {
        let db = Arc::new(db);
        let audit = OpLogWriter::new(db.clone());
        Self {
            db,
            retention_secs,
            audit,
        }
    }

    /// Sweep on a fixed interval until the cancellation signal is raised.
    pub async fn run(self, every: Duration, mut cancel: CancelSignal) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel.cancelled() => {
                    info!("expiry sweeper stopped");
                    return;
                }
            }

            match self.run_sweep(&cancel).await {
                Ok(stats) if stats.deleted_departments > 0 => {
                    info!(
                        departments = stats.deleted_departments,
                        detached = stats.detached_children,
                        locations = stats.deleted_locations,
                        positions = stats.deleted_positions,
                        "expiry sweep collected departments"
                    );
                    self.audit.record(
                        ops::EXPIRY_SWEEP,
                        None,
                        json!({
                            "departments": stats.deleted_departments,
                            "detached": stats.detached_children,
                            "locations": stats.deleted_locations,
                            "positions": stats.deleted_positions,
                        })
                        .to_string(),
                    );
                }
                Ok(_) => debug!("expiry sweep found nothing to collect"),
                Err(OrgError::Cancelled) => info!("expiry sweep pass cancelled"),
                Err(e) => warn!("expiry sweep failed, will retry next interval: {}", e),
            }
        }
    }

    /// One sweep pass in its own transaction.
    pub async fn run_sweep(&self, cancel: &CancelSignal) -> OrgResult<SweepStats> {
        cancel.check()?;
        let cutoff = Utc::now().timestamp() - self.retention_secs;

        let txn = self.db.begin().await?;
        match self.sweep_in_txn(&txn, cutoff, cancel).await {
            Ok(stats) => {
                txn.commit().await?;
                Ok(stats)
            }
            Err(err) => {
                if let Err(e) = txn.rollback().await {
                    warn!("sweep rollback failed: {}", e);
                }
                Err(err)
            }
        }
    }

    async fn sweep_in_txn(
        &self,
        txn: &DatabaseTransaction,
        cutoff: i64,
        cancel: &CancelSignal,
    ) -> OrgResult<SweepStats> {
        let candidates = store::expired_candidates(txn, cutoff).await?;
        if candidates.is_empty() {
            return Ok(SweepStats::default());
        }

        // Prefix-lock every candidate subtree. Candidates are in path order,
        // so a candidate inside another candidate's subtree is already held.
        let mut locked_ids: HashSet<i64> = HashSet::new();
        for candidate in &candidates {
            if locked_ids.contains(&candidate.id) {
                continue;
            }
            let path = TreePath::from_storage(candidate.path.clone());
            for row in store::lock_subtree(txn, &path).await? {
                locked_ids.insert(row.id);
            }
        }

        // A candidate missing from the locked set was deleted by a
        // concurrent transaction; abort the pass rather than collect a
        // partial set.
        let missing = candidates
            .iter()
            .filter(|c| !locked_ids.contains(&c.id))
            .count();
        if missing > 0 {
            return Err(OrgError::Internal(format!(
                "expiry sweep interfered with: {missing} candidate(s) disappeared while locking"
            )));
        }
        cancel.check()?;

        let now = Utc::now().timestamp();
        let candidate_ids: Vec<i64> = candidates.iter().map(|c| c.id).collect();

        let detached_children = store::detach_children(txn, &candidate_ids, now).await?;

        // The exclusive sets must be computed before the link rows go away.
        let location_ids = store::exclusive_location_ids(txn, &candidate_ids).await?;
        let position_ids = store::exclusive_position_ids(txn, &candidate_ids).await?;
        let deleted_links = store::delete_links_for_departments(txn, &candidate_ids).await?;
        let deleted_locations = store::delete_locations_by_ids(txn, &location_ids).await?;
        let deleted_positions = store::delete_positions_by_ids(txn, &position_ids).await?;

        let paths: Vec<String> = candidates.iter().map(|c| c.path.clone()).collect();
        let deleted_departments = store::delete_departments_by_paths(txn, &paths).await?;
        cancel.check()?;

        Ok(SweepStats {
            candidates: candidates.len(),
            detached_children,
            deleted_links,
            deleted_locations,
            deleted_positions,
            deleted_departments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_sweep_honors_cancellation_before_start() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let collector = ExpiredSubtreeCollector::new(db, 180 * 86_400);
        let (tx, cancel) = CancelSignal::new();
        tx.send(true).unwrap();

        let result = collector.run_sweep(&cancel).await;
        assert!(matches!(result, Err(OrgError::Cancelled)));
    }

    #[tokio::test]
    async fn test_sweep_with_no_candidates_is_a_noop() {
        // one empty result set for the candidate scan; commit follows
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<crate::entity::department::Model>::new()])
            .into_connection();
        let collector = ExpiredSubtreeCollector::new(db, 180 * 86_400);

        let stats = collector.run_sweep(&CancelSignal::never()).await.unwrap();
        assert_eq!(stats, SweepStats::default());
    }
}
