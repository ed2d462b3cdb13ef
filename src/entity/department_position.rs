//! DepartmentPosition entity - department/position association
//!
//! Table: org_department_position

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "org_department_position")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub department_id: i64,

    pub position_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
