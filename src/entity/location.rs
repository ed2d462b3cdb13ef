//! Location entity
//!
//! Table: org_location
//!
//! A physical site a department operates from. Deactivated (not deleted) when
//! the last department referencing it is soft-deleted; removed permanently by
//! the expiry sweep once every linked department is collected.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "org_location")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "String(Some(150))")]
    pub name: String,

    /// Street address
    #[sea_orm(column_type = "Text", nullable)]
    pub address: Option<String>,

    /// IANA timezone name, e.g. "Europe/Berlin"
    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub timezone: Option<String>,

    pub is_active: bool,

    /// Unix timestamps (seconds)
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

// Department links are handled via manual queries on org_department_location

impl ActiveModelBehavior for ActiveModel {}
