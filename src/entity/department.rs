//! Department entity
//!
//! Table: org_department
//!
//! A department is a node of the materialized-path tree. `path` is the
//! dot-delimited chain of ancestor identifiers ending in the department's own
//! identifier, and `depth` is always `segment count - 1`. Soft deletion keeps
//! the row but rewrites the own path segment with the `deleted_` marker.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "org_department")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Parent department (NULL for roots)
    pub parent_id: Option<i64>,

    /// Display name
    #[sea_orm(column_type = "String(Some(150))")]
    pub name: String,

    /// Lowercase-latin token, unique within its parent path
    #[sea_orm(column_type = "String(Some(150))")]
    pub identifier: String,

    /// Materialized ancestry path, e.g. "root.dev.grp"
    #[sea_orm(column_type = "Text")]
    pub path: String,

    /// Number of path segments minus one
    pub depth: i32,

    pub is_active: bool,

    /// Unix timestamps (seconds)
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

// Self-reference and link-table relations are handled via manual queries

impl ActiveModelBehavior for ActiveModel {}
