//! Operation log writer
//!
//! Queued audit trail of tree mutations. Entries are recorded after commit
//! and drained by a background task; writing the log never blocks or fails a
//! workflow, overflow drops the entry with a warning.

use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::entity::op_log;

/// Operation type constants
pub mod ops {
    pub const CREATE_DEPARTMENT: &str = "create_department";
    pub const MOVE_DEPARTMENT: &str = "move_department";
    pub const SOFT_DELETE_DEPARTMENT: &str = "soft_delete_department";
    pub const UPDATE_DEPARTMENT: &str = "update_department";
    pub const EXPIRY_SWEEP: &str = "expiry_sweep";
}

/// Log entry to be written
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub op_type: &'static str,
    pub department_id: Option<i64>,
    pub detail: String,
}

/// Handle to the queued writer; cheap to clone.
#[derive(Clone)]
pub struct OpLogWriter {
    tx: mpsc::Sender<LogEntry>,
}

impl OpLogWriter {
    /// Spawn the drain task and return the writer handle.
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        let (tx, mut rx) = mpsc::channel::<LogEntry>(200);

        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                let row = op_log::ActiveModel {
                    op_time: Set(chrono::Utc::now().timestamp()),
                    op_type: Set(entry.op_type.to_string()),
                    department_id: Set(entry.department_id),
                    detail: Set(entry.detail),
                    ..Default::default()
                };
                if let Err(e) = row.insert(&*db).await {
                    tracing::error!("failed to write operation log: {}", e);
                }
            }
        });

        Self { tx }
    }

    /// Queue one entry; drops it with a warning when the queue is full.
    pub fn record(&self, op_type: &'static str, department_id: Option<i64>, detail: String) {
        let entry = LogEntry {
            op_type,
            department_id,
            detail,
        };
        if self.tx.try_send(entry).is_err() {
            tracing::warn!("operation log queue is full, entry dropped: {}", op_type);
        }
    }
}
