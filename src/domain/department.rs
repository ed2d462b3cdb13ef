//! Department aggregate
//!
//! In-memory invariants for a single department and the state transitions it
//! permits. Cascading a transition to descendants is the orchestrator's job;
//! the aggregate only ever mutates itself.

use crate::domain::path::TreePath;
use crate::entity::department;
use crate::error::{OrgError, OrgResult};

pub const IDENTIFIER_MIN_LEN: usize = 3;
pub const IDENTIFIER_MAX_LEN: usize = 150;
pub const NAME_MAX_LEN: usize = 150;

/// Identifier shape: lowercase-latin token, 3-150 chars.
pub fn validate_identifier(identifier: &str) -> OrgResult<()> {
    if !(IDENTIFIER_MIN_LEN..=IDENTIFIER_MAX_LEN).contains(&identifier.len()) {
        return Err(OrgError::Validation(format!(
            "identifier must be {IDENTIFIER_MIN_LEN}-{IDENTIFIER_MAX_LEN} characters"
        )));
    }
    if !identifier.bytes().all(|b| b.is_ascii_lowercase()) {
        return Err(OrgError::Validation(
            "identifier must contain only lowercase latin letters".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> OrgResult<()> {
    if name.trim().is_empty() {
        return Err(OrgError::Validation("name must not be empty".to_string()));
    }
    if name.chars().count() > NAME_MAX_LEN {
        return Err(OrgError::Validation(format!(
            "name must not exceed {NAME_MAX_LEN} characters"
        )));
    }
    Ok(())
}

/// A single department with its tree coordinates and location set.
#[derive(Debug, Clone)]
pub struct Department {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub identifier: String,
    pub path: TreePath,
    pub depth: i32,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
    /// Linked location ids; populated by the create/update flows only
    location_ids: Vec<i64>,
}

impl Department {
    /// Build a new department under the (possibly absent) parent. The id is
    /// zero until the row is inserted.
    pub fn create(
        parent: Option<&Department>,
        name: &str,
        identifier: &str,
        location_ids: Vec<i64>,
        now: i64,
    ) -> OrgResult<Self> {
        if location_ids.is_empty() {
            return Err(OrgError::Validation("must-have-location".to_string()));
        }
        let path = TreePath::new(identifier, parent.map(|p| &p.path));
        let depth = path.depth();
        Ok(Self {
            id: 0,
            parent_id: parent.map(|p| p.id),
            name: name.to_string(),
            identifier: identifier.to_string(),
            path,
            depth,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            location_ids,
        })
    }

    /// Rehydrate from a persisted row. The location set is not loaded; flows
    /// that replace it call [`Department::update_locations`].
    pub fn from_model(model: &department::Model) -> Self {
        Self {
            id: model.id,
            parent_id: model.parent_id,
            name: model.name.clone(),
            identifier: model.identifier.clone(),
            path: TreePath::from_storage(model.path.clone()),
            depth: model.depth,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
            deleted_at: model.deleted_at,
            location_ids: Vec::new(),
        }
    }

    pub fn location_ids(&self) -> &[i64] {
        &self.location_ids
    }

    /// Replace the full location set. Departments never reference zero
    /// locations.
    pub fn update_locations(&mut self, location_ids: Vec<i64>) -> OrgResult<()> {
        if location_ids.is_empty() {
            return Err(OrgError::Validation("must-have-location".to_string()));
        }
        self.location_ids = location_ids;
        Ok(())
    }

    /// Recompute parent/path/depth from the (possibly absent) new parent.
    /// Pure state change; rewriting descendants is the orchestrator's job.
    pub fn move_under(&mut self, new_parent: Option<&Department>, now: i64) {
        self.parent_id = new_parent.map(|p| p.id);
        self.path = TreePath::new(&self.identifier, new_parent.map(|p| &p.path));
        self.depth = self.path.depth();
        self.updated_at = now;
    }

    /// Clear the active flag, stamp `deleted_at` and rewrite the own path
    /// with the delete marker. Children are untouched.
    pub fn soft_delete(&mut self, now: i64) {
        self.is_active = false;
        self.deleted_at = Some(now);
        self.path = TreePath::new_deleted(&self.identifier, self.path.parent().as_ref());
        self.updated_at = now;
    }

    /// Metadata edit: replace name and location set without touching the
    /// tree coordinates.
    pub fn update(&mut self, name: &str, location_ids: Vec<i64>, now: i64) -> OrgResult<()> {
        self.update_locations(location_ids)?;
        self.name = name.to_string();
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(now: i64) -> Department {
        Department::create(None, "Root", "root", vec![1], now).unwrap()
    }

    #[test]
    fn test_create_root() {
        let dept = root(100);
        assert_eq!(dept.path.as_str(), "root");
        assert_eq!(dept.depth, 0);
        assert!(dept.parent_id.is_none());
        assert!(dept.is_active);
        assert_eq!(dept.created_at, 100);
    }

    #[test]
    fn test_create_child_computes_path_and_depth() {
        let mut parent = root(100);
        parent.id = 1;
        let child = Department::create(Some(&parent), "Development", "dev", vec![1], 100).unwrap();
        assert_eq!(child.path.as_str(), "root.dev");
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent_id, Some(1));
    }

    #[test]
    fn test_create_requires_location() {
        let result = Department::create(None, "Root", "root", Vec::new(), 100);
        assert!(matches!(
            result,
            Err(OrgError::Validation(msg)) if msg == "must-have-location"
        ));
    }

    #[test]
    fn test_update_locations_rejects_empty_set() {
        let mut dept = root(100);
        assert!(dept.update_locations(Vec::new()).is_err());
        assert!(dept.update_locations(vec![2, 3]).is_ok());
        assert_eq!(dept.location_ids(), &[2, 3]);
    }

    #[test]
    fn test_move_under_new_parent() {
        let mut a = root(100);
        a.id = 1;
        let mut b = Department::create(Some(&a), "Development", "dev", vec![1], 100).unwrap();
        b.id = 2;
        let mut other = Department::create(None, "Ops", "ops", vec![1], 100).unwrap();
        other.id = 3;

        b.move_under(Some(&other), 200);
        assert_eq!(b.path.as_str(), "ops.dev");
        assert_eq!(b.depth, 1);
        assert_eq!(b.parent_id, Some(3));
        assert_eq!(b.updated_at, 200);
    }

    #[test]
    fn test_move_to_root() {
        let mut a = root(100);
        a.id = 1;
        let mut b = Department::create(Some(&a), "Development", "dev", vec![1], 100).unwrap();
        b.id = 2;

        b.move_under(None, 200);
        assert_eq!(b.path.as_str(), "dev");
        assert_eq!(b.depth, 0);
        assert!(b.parent_id.is_none());
    }

    #[test]
    fn test_soft_delete_marks_own_path() {
        let mut a = root(100);
        a.id = 1;
        let mut b = Department::create(Some(&a), "Development", "dev", vec![1], 100).unwrap();
        b.id = 2;

        b.soft_delete(300);
        assert!(!b.is_active);
        assert_eq!(b.deleted_at, Some(300));
        assert_eq!(b.path.as_str(), "root.deleted_dev");
        assert_eq!(b.depth, b.path.depth());
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("dev").is_ok());
        assert!(validate_identifier("ab").is_err());
        assert!(validate_identifier("Dev").is_err());
        assert!(validate_identifier("dev1").is_err());
        assert!(validate_identifier("dev_ops").is_err());
        assert!(validate_identifier(&"a".repeat(151)).is_err());
        assert!(validate_identifier(&"a".repeat(150)).is_ok());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Development").is_ok());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(151)).is_err());
    }
}
