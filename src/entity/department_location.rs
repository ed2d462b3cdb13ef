//! DepartmentLocation entity - department/location association
//!
//! Table: org_department_location
//!
//! Pure association rows with no independent lifecycle; created and removed
//! only as a side effect of department mutation or garbage collection.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "org_department_location")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub department_id: i64,

    pub location_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
