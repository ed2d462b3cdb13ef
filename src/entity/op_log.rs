//! OpLog entity - operation log
//!
//! Table: org_op_log
//!
//! Audit trail of tree mutations, written fire-and-forget after commit.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "org_op_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Operation time (Unix timestamp)
    pub op_time: i64,

    /// Operation type, e.g. "create_department"
    #[sea_orm(column_type = "String(Some(32))")]
    pub op_type: String,

    /// Affected department (NULL for sweep summaries)
    pub department_id: Option<i64>,

    /// JSON detail payload
    #[sea_orm(column_type = "Text")]
    pub detail: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
