//! Tree locking store
//!
//! The only module that takes row locks or issues multi-row writes against
//! the department tree. Every function runs on the caller-supplied connection
//! (normally an open transaction); locks are held until that transaction
//! commits or rolls back.

use std::collections::HashSet;

use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Statement, Value,
};

use crate::domain::department::Department;
use crate::domain::path::TreePath;
use crate::entity::{department, department_location, department_position, location, position};
use crate::error::{OrgError, OrgResult};

/// Build a LIKE pattern matching strict descendants of `path`.
/// `%`, `_` and `\` are escaped: the delete marker contains an underscore,
/// which LIKE would otherwise treat as a wildcard.
fn like_prefix(path: &str) -> String {
    let mut pattern = String::with_capacity(path.len() + 2);
    for ch in path.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('.');
    pattern.push('%');
    pattern
}

/// Acquire an exclusive row lock on one active department.
pub async fn lock_by_id<C: ConnectionTrait>(
    conn: &C,
    id: i64,
) -> OrgResult<Option<department::Model>> {
    let found = department::Entity::find_by_id(id)
        .filter(department::Column::IsActive.eq(true))
        .lock_exclusive()
        .one(conn)
        .await?;
    Ok(found)
}

/// Acquire exclusive locks on `path` and every descendant, inclusive.
/// Rows are locked in path order so concurrent callers acquire overlapping
/// locks in the same sequence.
pub async fn lock_subtree<C: ConnectionTrait>(
    conn: &C,
    path: &TreePath,
) -> OrgResult<Vec<department::Model>> {
    let pattern = like_prefix(path.as_str());
    let rows = department::Entity::find()
        .filter(
            Condition::any()
                .add(department::Column::Path.eq(path.as_str()))
                .add(department::Column::Path.like(pattern.as_str())),
        )
        .order_by_asc(department::Column::Path)
        .lock_exclusive()
        .all(conn)
        .await?;
    Ok(rows)
}

/// Fetch one active department without locking it. Rows whose path carries
/// the delete marker are not active, even though their own flag is still set:
/// they live inside a soft-deleted subtree.
pub async fn get_active_by_id<C: ConnectionTrait>(
    conn: &C,
    id: i64,
) -> OrgResult<Option<department::Model>> {
    let found = department::Entity::find_by_id(id)
        .filter(department::Column::IsActive.eq(true))
        .one(conn)
        .await?;
    Ok(found.filter(|model| !TreePath::from_storage(model.path.clone()).has_deleted_marker()))
}

/// True if any department row (active or soft-deleted) already owns `path`.
pub async fn path_exists<C: ConnectionTrait>(conn: &C, path: &TreePath) -> OrgResult<bool> {
    let found = department::Entity::find()
        .filter(department::Column::Path.eq(path.as_str()))
        .one(conn)
        .await?;
    Ok(found.is_some())
}

pub async fn get_active_locations_by_ids<C: ConnectionTrait>(
    conn: &C,
    ids: &[i64],
) -> OrgResult<Vec<location::Model>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = location::Entity::find()
        .filter(location::Column::Id.is_in(ids.iter().copied()))
        .filter(location::Column::IsActive.eq(true))
        .all(conn)
        .await?;
    Ok(rows)
}

/// Rewrite every descendant of `old_path` for a move: splice the moved
/// department's new path in place of the old prefix and shift depth by the
/// move's depth delta, as one set-based UPDATE so the subtree transitions
/// atomically relative to concurrent readers.
pub async fn rewrite_subtree_for_move<C: ConnectionTrait>(
    conn: &C,
    old_path: &TreePath,
    moved: &Department,
) -> OrgResult<u64> {
    let depth_delta = moved.depth - old_path.depth();
    let stmt = Statement::from_sql_and_values(
        conn.get_database_backend(),
        r#"UPDATE org_department
           SET path = $1 || SUBSTRING(path FROM $2),
               depth = depth + $3,
               updated_at = $4
           WHERE path LIKE $5"#,
        [
            moved.path.as_str().into(),
            (old_path.as_str().len() as i32 + 1).into(),
            depth_delta.into(),
            moved.updated_at.into(),
            like_prefix(old_path.as_str()).into(),
        ],
    );
    let result = conn.execute(stmt).await.map_err(OrgError::UpdateChildren)?;
    Ok(result.rows_affected())
}

/// Rewrite every descendant of `old_path` for a soft delete: the replacement
/// prefix carries the delete marker, depth is unchanged.
pub async fn rewrite_subtree_for_soft_delete<C: ConnectionTrait>(
    conn: &C,
    old_path: &TreePath,
    new_path: &TreePath,
    now: i64,
) -> OrgResult<u64> {
    let stmt = Statement::from_sql_and_values(
        conn.get_database_backend(),
        r#"UPDATE org_department
           SET path = $1 || SUBSTRING(path FROM $2),
               updated_at = $3
           WHERE path LIKE $4"#,
        [
            new_path.as_str().into(),
            (old_path.as_str().len() as i32 + 1).into(),
            now.into(),
            like_prefix(old_path.as_str()).into(),
        ],
    );
    let result = conn.execute(stmt).await.map_err(OrgError::UpdateChildren)?;
    Ok(result.rows_affected())
}

/// Location ids linked to the given departments and to no department outside
/// that set.
pub async fn exclusive_location_ids<C: ConnectionTrait>(
    conn: &C,
    dept_ids: &[i64],
) -> OrgResult<Vec<i64>> {
    if dept_ids.is_empty() {
        return Ok(Vec::new());
    }
    let links = department_location::Entity::find()
        .filter(department_location::Column::DepartmentId.is_in(dept_ids.iter().copied()))
        .all(conn)
        .await?;
    let mut ids: Vec<i64> = links.iter().map(|link| link.location_id).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(ids);
    }
    let outside = department_location::Entity::find()
        .filter(department_location::Column::LocationId.is_in(ids.iter().copied()))
        .filter(department_location::Column::DepartmentId.is_not_in(dept_ids.iter().copied()))
        .all(conn)
        .await?;
    let shared: HashSet<i64> = outside.iter().map(|link| link.location_id).collect();
    ids.retain(|id| !shared.contains(id));
    Ok(ids)
}

/// Position ids linked to the given departments and to no department outside
/// that set.
pub async fn exclusive_position_ids<C: ConnectionTrait>(
    conn: &C,
    dept_ids: &[i64],
) -> OrgResult<Vec<i64>> {
    if dept_ids.is_empty() {
        return Ok(Vec::new());
    }
    let links = department_position::Entity::find()
        .filter(department_position::Column::DepartmentId.is_in(dept_ids.iter().copied()))
        .all(conn)
        .await?;
    let mut ids: Vec<i64> = links.iter().map(|link| link.position_id).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(ids);
    }
    let outside = department_position::Entity::find()
        .filter(department_position::Column::PositionId.is_in(ids.iter().copied()))
        .filter(department_position::Column::DepartmentId.is_not_in(dept_ids.iter().copied()))
        .all(conn)
        .await?;
    let shared: HashSet<i64> = outside.iter().map(|link| link.position_id).collect();
    ids.retain(|id| !shared.contains(id));
    Ok(ids)
}

/// Lock the given locations that are still active, then flip them inactive
/// in one bulk update. Returns the number of rows deactivated.
pub async fn deactivate_locations<C: ConnectionTrait>(
    conn: &C,
    ids: &[i64],
    now: i64,
) -> OrgResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let rows = location::Entity::find()
        .filter(location::Column::Id.is_in(ids.iter().copied()))
        .filter(location::Column::IsActive.eq(true))
        .lock_exclusive()
        .all(conn)
        .await?;
    if rows.is_empty() {
        return Ok(0);
    }
    let locked: Vec<i64> = rows.iter().map(|row| row.id).collect();
    let result = location::Entity::update_many()
        .col_expr(location::Column::IsActive, Expr::value(false))
        .col_expr(location::Column::UpdatedAt, Expr::value(now))
        .filter(location::Column::Id.is_in(locked))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Lock the given positions that are still active, then flip them inactive
/// in one bulk update. Returns the number of rows deactivated.
pub async fn deactivate_positions<C: ConnectionTrait>(
    conn: &C,
    ids: &[i64],
    now: i64,
) -> OrgResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let rows = position::Entity::find()
        .filter(position::Column::Id.is_in(ids.iter().copied()))
        .filter(position::Column::IsActive.eq(true))
        .lock_exclusive()
        .all(conn)
        .await?;
    if rows.is_empty() {
        return Ok(0);
    }
    let locked: Vec<i64> = rows.iter().map(|row| row.id).collect();
    let result = position::Entity::update_many()
        .col_expr(position::Column::IsActive, Expr::value(false))
        .col_expr(position::Column::UpdatedAt, Expr::value(now))
        .filter(position::Column::Id.is_in(locked))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Replace a department's location link rows with the given set.
pub async fn replace_location_links<C: ConnectionTrait>(
    conn: &C,
    department_id: i64,
    location_ids: &[i64],
) -> OrgResult<()> {
    department_location::Entity::delete_many()
        .filter(department_location::Column::DepartmentId.eq(department_id))
        .exec(conn)
        .await?;
    insert_location_links(conn, department_id, location_ids).await
}

/// Insert location link rows for a department.
pub async fn insert_location_links<C: ConnectionTrait>(
    conn: &C,
    department_id: i64,
    location_ids: &[i64],
) -> OrgResult<()> {
    let links: Vec<department_location::ActiveModel> = location_ids
        .iter()
        .map(|location_id| department_location::ActiveModel {
            department_id: sea_orm::Set(department_id),
            location_id: sea_orm::Set(*location_id),
            ..Default::default()
        })
        .collect();
    if links.is_empty() {
        return Ok(());
    }
    department_location::Entity::insert_many(links).exec(conn).await?;
    Ok(())
}

/// Soft-deleted departments whose retention has expired, in path order.
pub async fn expired_candidates<C: ConnectionTrait>(
    conn: &C,
    cutoff: i64,
) -> OrgResult<Vec<department::Model>> {
    let rows = department::Entity::find()
        .filter(department::Column::IsActive.eq(false))
        .filter(department::Column::DeletedAt.lte(cutoff))
        .order_by_asc(department::Column::Path)
        .all(conn)
        .await?;
    Ok(rows)
}

/// Detach the surviving children of the given departments: clear their
/// `parent_id` so they live on as new roots instead of being deleted.
pub async fn detach_children<C: ConnectionTrait>(
    conn: &C,
    candidate_ids: &[i64],
    now: i64,
) -> OrgResult<u64> {
    if candidate_ids.is_empty() {
        return Ok(0);
    }
    let result = department::Entity::update_many()
        .col_expr(department::Column::ParentId, Expr::value(Value::BigInt(None)))
        .col_expr(department::Column::UpdatedAt, Expr::value(now))
        .filter(department::Column::ParentId.is_in(candidate_ids.iter().copied()))
        .filter(department::Column::Id.is_not_in(candidate_ids.iter().copied()))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Drop all location/position link rows owned by the given departments.
pub async fn delete_links_for_departments<C: ConnectionTrait>(
    conn: &C,
    dept_ids: &[i64],
) -> OrgResult<u64> {
    if dept_ids.is_empty() {
        return Ok(0);
    }
    let locations = department_location::Entity::delete_many()
        .filter(department_location::Column::DepartmentId.is_in(dept_ids.iter().copied()))
        .exec(conn)
        .await?;
    let positions = department_position::Entity::delete_many()
        .filter(department_position::Column::DepartmentId.is_in(dept_ids.iter().copied()))
        .exec(conn)
        .await?;
    Ok(locations.rows_affected + positions.rows_affected)
}

pub async fn delete_locations_by_ids<C: ConnectionTrait>(
    conn: &C,
    ids: &[i64],
) -> OrgResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let result = location::Entity::delete_many()
        .filter(location::Column::Id.is_in(ids.iter().copied()))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

pub async fn delete_positions_by_ids<C: ConnectionTrait>(
    conn: &C,
    ids: &[i64],
) -> OrgResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let result = position::Entity::delete_many()
        .filter(position::Column::Id.is_in(ids.iter().copied()))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Delete department rows by exact path match. Descendants that were not
/// themselves expired are not matched and survive.
pub async fn delete_departments_by_paths<C: ConnectionTrait>(
    conn: &C,
    paths: &[String],
) -> OrgResult<u64> {
    if paths.is_empty() {
        return Ok(0);
    }
    let result = department::Entity::delete_many()
        .filter(department::Column::Path.is_in(paths.iter().map(String::as_str)))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_prefix_plain_path() {
        assert_eq!(like_prefix("root.dev"), "root.dev.%");
    }

    #[test]
    fn test_like_prefix_escapes_marker_underscore() {
        // "deleted_root" must not match "deletedxroot..." through the _ wildcard
        assert_eq!(like_prefix("deleted_root"), "deleted\\_root.%");
    }
}
