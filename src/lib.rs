//! Orgdir - an organizational directory service
//!
//! This crate maintains a materialized-path tree of departments linked to
//! physical locations and positions: concurrent create/move/soft-delete
//! workflows over a row-locking store, plus a background sweep that
//! permanently collects long-soft-deleted subtrees.

pub mod config;
pub mod db;
pub mod domain;
pub mod entity;
pub mod error;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{OrgError, OrgResult};
pub use service::{CancelSignal, DepartmentService, ExpiredSubtreeCollector, TreeEvent};
