//! Department workflows
//!
//! The three transactional tree mutations (create, move, soft delete) plus
//! the metadata edit. Each workflow runs in a single database transaction:
//! validation and conflict checks short-circuit before any lock is taken,
//! persistence faults after lock acquisition roll the transaction back before
//! the error is returned, and cache invalidation events fire only after a
//! successful commit.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DatabaseTransaction, Set, TransactionTrait,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::domain::department::{validate_identifier, validate_name, Department};
use crate::domain::path::TreePath;
use crate::entity::department;
use crate::error::{OptionExt, OrgError, OrgResult};
use crate::service::audit::{ops, OpLogWriter};
use crate::service::{CancelSignal, TreeEvent};
use crate::store;

/// Create department command
#[derive(Debug, Clone)]
pub struct CreateDepartment {
    pub name: String,
    pub identifier: String,
    pub parent_id: Option<i64>,
    pub location_ids: Vec<i64>,
}

/// Move department command
#[derive(Debug, Clone)]
pub struct MoveDepartment {
    pub id: i64,
    /// New parent; `None` makes the department a root
    pub new_parent_id: Option<i64>,
}

/// Soft delete department command
#[derive(Debug, Clone)]
pub struct SoftDeleteDepartment {
    pub id: i64,
}

/// Metadata edit command: rename and replace the location set
#[derive(Debug, Clone)]
pub struct UpdateDepartment {
    pub id: i64,
    pub name: String,
    pub location_ids: Vec<i64>,
}

/// Application service for department tree mutations.
pub struct DepartmentService {
    db: Arc<DatabaseConnection>,
    events: broadcast::Sender<TreeEvent>,
    audit: OpLogWriter,
}

impl DepartmentService {
    pub fn new(db: DatabaseConnection) -> Self {
        let db = Arc::new(db);
        let (events, _) = broadcast::channel(256);
        let audit = OpLogWriter::new(db.clone());
        Self { db, events, audit }
    }

    /// Subscribe to post-commit tree change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: TreeEvent) {
        // Ignore send errors (no receivers is fine)
        let _ = self.events.send(event);
    }

    /// Create a department under an optional parent, linked to at least one
    /// location.
    pub async fn create_department(
        &self,
        cmd: CreateDepartment,
        cancel: &CancelSignal,
    ) -> OrgResult<i64> {
        cancel.check()?;
        validate_identifier(&cmd.identifier)?;
        validate_name(&cmd.name)?;
        if cmd.location_ids.is_empty() {
            return Err(OrgError::Validation("must-have-location".to_string()));
        }

        let txn = self.db.begin().await?;
        match self.create_in_txn(&txn, &cmd, cancel).await {
            Ok(dept) => {
                txn.commit().await?;
                self.publish(TreeEvent::Created { id: dept.id });
                self.audit.record(
                    ops::CREATE_DEPARTMENT,
                    Some(dept.id),
                    json!({ "name": dept.name, "path": dept.path.as_str() }).to_string(),
                );
                Ok(dept.id)
            }
            Err(err) => {
                rollback(txn).await;
                Err(err)
            }
        }
    }

    async fn create_in_txn(
        &self,
        txn: &DatabaseTransaction,
        cmd: &CreateDepartment,
        cancel: &CancelSignal,
    ) -> OrgResult<Department> {
        let mut wanted = cmd.location_ids.clone();
        wanted.sort_unstable();
        wanted.dedup();

        let found = store::get_active_locations_by_ids(txn, &wanted).await?;
        if found.len() != wanted.len() {
            let have: HashSet<i64> = found.iter().map(|l| l.id).collect();
            let missing = wanted.iter().find(|id| !have.contains(id));
            return Err(OrgError::NotFound(format!(
                "location {}",
                missing.copied().unwrap_or_default()
            )));
        }

        let parent = match cmd.parent_id {
            Some(parent_id) => {
                let model = store::get_active_by_id(txn, parent_id)
                    .await?
                    .ok_or_not_found("parent department")?;
                Some(Department::from_model(&model))
            }
            None => None,
        };
        cancel.check()?;

        let now = Utc::now().timestamp();
        let mut dept = Department::create(parent.as_ref(), &cmd.name, &cmd.identifier, wanted, now)?;

        if store::path_exists(txn, &dept.path).await? {
            return Err(OrgError::Conflict("identifier.conflict".to_string()));
        }

        let row = department::ActiveModel {
            parent_id: Set(dept.parent_id),
            name: Set(dept.name.clone()),
            identifier: Set(dept.identifier.clone()),
            path: Set(dept.path.to_string()),
            depth: Set(dept.depth),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        };
        let inserted = row.insert(txn).await?;
        dept.id = inserted.id;

        store::insert_location_links(txn, dept.id, dept.location_ids()).await?;
        cancel.check()?;
        Ok(dept)
    }

    /// Re-parent a department, cascading the path/depth rewrite to its whole
    /// subtree.
    pub async fn move_department(
        &self,
        cmd: MoveDepartment,
        cancel: &CancelSignal,
    ) -> OrgResult<i64> {
        cancel.check()?;
        if cmd.new_parent_id == Some(cmd.id) {
            return Err(OrgError::Conflict("parent_id.conflict".to_string()));
        }

        // cheap pre-lock checks; re-evaluated under the locks below
        let current = store::get_active_by_id(&*self.db, cmd.id)
            .await?
            .ok_or_not_found("department")?;
        if let Some(parent_id) = cmd.new_parent_id {
            let parent = store::get_active_by_id(&*self.db, parent_id)
                .await?
                .ok_or_not_found("parent department")?;
            let current_path = TreePath::from_storage(current.path);
            let parent_path = TreePath::from_storage(parent.path);
            if current_path.is_ancestor_of(&parent_path) {
                return Err(OrgError::Conflict("parent_id.as.child.conflict".to_string()));
            }
        }

        let txn = self.db.begin().await?;
        match self.move_in_txn(&txn, &cmd, cancel).await {
            Ok((dept, old_path)) => {
                txn.commit().await?;
                self.publish(TreeEvent::Moved { id: dept.id });
                self.audit.record(
                    ops::MOVE_DEPARTMENT,
                    Some(dept.id),
                    json!({ "from": old_path.as_str(), "to": dept.path.as_str() }).to_string(),
                );
                Ok(dept.id)
            }
            Err(err) => {
                rollback(txn).await;
                Err(err)
            }
        }
    }

    async fn move_in_txn(
        &self,
        txn: &DatabaseTransaction,
        cmd: &MoveDepartment,
        cancel: &CancelSignal,
    ) -> OrgResult<(Department, TreePath)> {
        let model = store::lock_by_id(txn, cmd.id)
            .await?
            .ok_or_not_found("department")?;
        let old_path = live_path(&model)?;

        // Locks must be held before any path is read for the splice; a
        // concurrent move of a descendant must not race the rewrite.
        store::lock_subtree(txn, &old_path).await?;
        cancel.check()?;

        // Pre-lock validation may be stale; resolve the parent and re-run
        // the cycle check against locked state.
        let parent = match cmd.new_parent_id {
            Some(parent_id) => {
                let parent = store::get_active_by_id(txn, parent_id)
                    .await?
                    .ok_or_not_found("parent department")?;
                let parent_path = TreePath::from_storage(parent.path.clone());
                if old_path.is_ancestor_of(&parent_path) {
                    return Err(OrgError::Conflict("parent_id.as.child.conflict".to_string()));
                }
                Some(Department::from_model(&parent))
            }
            None => None,
        };

        let now = Utc::now().timestamp();
        let mut dept = Department::from_model(&model);
        dept.move_under(parent.as_ref(), now);

        let row = department::ActiveModel {
            id: Set(dept.id),
            parent_id: Set(dept.parent_id),
            path: Set(dept.path.to_string()),
            depth: Set(dept.depth),
            updated_at: Set(now),
            ..Default::default()
        };
        row.update(txn).await?;

        store::rewrite_subtree_for_move(txn, &old_path, &dept).await?;
        cancel.check()?;
        Ok((dept, old_path))
    }

    /// Soft-delete a department and its whole subtree: the subtree's paths
    /// take the delete marker in one statement, and locations/positions that
    /// are linked nowhere outside the subtree are deactivated.
    pub async fn soft_delete_department(
        &self,
        cmd: SoftDeleteDepartment,
        cancel: &CancelSignal,
    ) -> OrgResult<i64> {
        cancel.check()?;

        let txn = self.db.begin().await?;
        match self.soft_delete_in_txn(&txn, &cmd, cancel).await {
            Ok(dept) => {
                txn.commit().await?;
                self.publish(TreeEvent::SoftDeleted { id: dept.id });
                self.audit.record(
                    ops::SOFT_DELETE_DEPARTMENT,
                    Some(dept.id),
                    json!({ "path": dept.path.as_str() }).to_string(),
                );
                Ok(dept.id)
            }
            Err(err) => {
                rollback(txn).await;
                Err(err)
            }
        }
    }

    async fn soft_delete_in_txn(
        &self,
        txn: &DatabaseTransaction,
        cmd: &SoftDeleteDepartment,
        cancel: &CancelSignal,
    ) -> OrgResult<Department> {
        let model = store::lock_by_id(txn, cmd.id)
            .await?
            .ok_or_not_found("department")?;
        let old_path = live_path(&model)?;

        // The whole subtree is locked before the deactivation set is
        // computed, so a department added concurrently cannot be missed.
        let subtree = store::lock_subtree(txn, &old_path).await?;
        cancel.check()?;

        let subtree_ids: Vec<i64> = subtree.iter().map(|d| d.id).collect();
        let now = Utc::now().timestamp();

        let location_ids = store::exclusive_location_ids(txn, &subtree_ids).await?;
        store::deactivate_locations(txn, &location_ids, now).await?;
        let position_ids = store::exclusive_position_ids(txn, &subtree_ids).await?;
        store::deactivate_positions(txn, &position_ids, now).await?;

        let mut dept = Department::from_model(&model);
        dept.soft_delete(now);

        let row = department::ActiveModel {
            id: Set(dept.id),
            is_active: Set(false),
            deleted_at: Set(dept.deleted_at),
            path: Set(dept.path.to_string()),
            updated_at: Set(now),
            ..Default::default()
        };
        row.update(txn).await?;

        store::rewrite_subtree_for_soft_delete(txn, &old_path, &dept.path, now).await?;
        cancel.check()?;
        Ok(dept)
    }

    /// Metadata edit: rename and replace the location set. Does not touch
    /// the tree structure.
    pub async fn update_department(
        &self,
        cmd: UpdateDepartment,
        cancel: &CancelSignal,
    ) -> OrgResult<i64> {
        cancel.check()?;
        validate_name(&cmd.name)?;
        if cmd.location_ids.is_empty() {
            return Err(OrgError::Validation("must-have-location".to_string()));
        }

        let txn = self.db.begin().await?;
        match self.update_in_txn(&txn, &cmd, cancel).await {
            Ok(dept) => {
                txn.commit().await?;
                self.publish(TreeEvent::Updated { id: dept.id });
                self.audit.record(
                    ops::UPDATE_DEPARTMENT,
                    Some(dept.id),
                    json!({ "name": dept.name }).to_string(),
                );
                Ok(dept.id)
            }
            Err(err) => {
                rollback(txn).await;
                Err(err)
            }
        }
    }

    async fn update_in_txn(
        &self,
        txn: &DatabaseTransaction,
        cmd: &UpdateDepartment,
        cancel: &CancelSignal,
    ) -> OrgResult<Department> {
        let model = store::lock_by_id(txn, cmd.id)
            .await?
            .ok_or_not_found("department")?;
        live_path(&model)?;

        let mut wanted = cmd.location_ids.clone();
        wanted.sort_unstable();
        wanted.dedup();
        let found = store::get_active_locations_by_ids(txn, &wanted).await?;
        if found.len() != wanted.len() {
            let have: HashSet<i64> = found.iter().map(|l| l.id).collect();
            let missing = wanted.iter().find(|id| !have.contains(id));
            return Err(OrgError::NotFound(format!(
                "location {}",
                missing.copied().unwrap_or_default()
            )));
        }
        cancel.check()?;

        let now = Utc::now().timestamp();
        let mut dept = Department::from_model(&model);
        dept.update(&cmd.name, wanted, now)?;

        let row = department::ActiveModel {
            id: Set(dept.id),
            name: Set(dept.name.clone()),
            updated_at: Set(now),
            ..Default::default()
        };
        row.update(txn).await?;

        store::replace_location_links(txn, dept.id, dept.location_ids()).await?;
        cancel.check()?;
        Ok(dept)
    }
}

/// Reject rows living inside a soft-deleted subtree: their own active flag is
/// still set but their path carries the marker.
fn live_path(model: &department::Model) -> OrgResult<TreePath> {
    let path = TreePath::from_storage(model.path.clone());
    if path.has_deleted_marker() {
        return Err(OrgError::NotFound("department".to_string()));
    }
    Ok(path)
}

async fn rollback(txn: DatabaseTransaction) {
    if let Err(e) = txn.rollback().await {
        tracing::warn!("transaction rollback failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn service() -> DepartmentService {
        // no query results are prepared: every test below must short-circuit
        // before touching the database
        DepartmentService::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection())
    }

    #[tokio::test]
    async fn test_move_rejects_self_as_parent() {
        let svc = service();
        let cmd = MoveDepartment {
            id: 7,
            new_parent_id: Some(7),
        };
        let result = svc.move_department(cmd, &CancelSignal::never()).await;
        assert!(matches!(
            result,
            Err(OrgError::Conflict(code)) if code == "parent_id.conflict"
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_location_set() {
        let svc = service();
        let cmd = CreateDepartment {
            name: "Development".to_string(),
            identifier: "dev".to_string(),
            parent_id: None,
            location_ids: Vec::new(),
        };
        let result = svc.create_department(cmd, &CancelSignal::never()).await;
        assert!(matches!(
            result,
            Err(OrgError::Validation(msg)) if msg == "must-have-location"
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_malformed_identifier() {
        let svc = service();
        let cmd = CreateDepartment {
            name: "Development".to_string(),
            identifier: "Dev-1".to_string(),
            parent_id: None,
            location_ids: vec![1],
        };
        let result = svc.create_department(cmd, &CancelSignal::never()).await;
        assert!(matches!(result, Err(OrgError::Validation(_))));
    }

    #[tokio::test]
    async fn test_workflows_honor_cancellation_before_start() {
        let svc = service();
        let (tx, cancel) = CancelSignal::new();
        tx.send(true).unwrap();

        let create = svc
            .create_department(
                CreateDepartment {
                    name: "Development".to_string(),
                    identifier: "dev".to_string(),
                    parent_id: None,
                    location_ids: vec![1],
                },
                &cancel,
            )
            .await;
        assert!(matches!(create, Err(OrgError::Cancelled)));

        let moved = svc
            .move_department(
                MoveDepartment {
                    id: 1,
                    new_parent_id: None,
                },
                &cancel,
            )
            .await;
        assert!(matches!(moved, Err(OrgError::Cancelled)));

        let deleted = svc
            .soft_delete_department(SoftDeleteDepartment { id: 1 }, &cancel)
            .await;
        assert!(matches!(deleted, Err(OrgError::Cancelled)));
    }

    #[tokio::test]
    async fn test_update_rejects_empty_location_set() {
        let svc = service();
        let cmd = UpdateDepartment {
            id: 1,
            name: "Development".to_string(),
            location_ids: Vec::new(),
        };
        let result = svc.update_department(cmd, &CancelSignal::never()).await;
        assert!(matches!(
            result,
            Err(OrgError::Validation(msg)) if msg == "must-have-location"
        ));
    }
}
