//! Entity module - SeaORM models
//!
//! One module per database table.

pub mod department;
pub mod department_location;
pub mod department_position;
pub mod location;
pub mod op_log;
pub mod position;
