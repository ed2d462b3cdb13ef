//! Service layer - transactional workflows over the department tree
//!
//! `department` hosts the Create/Move/SoftDelete/Update orchestrators,
//! `collector` the background expiry sweep, `audit` the operation log writer.

pub mod audit;
pub mod collector;
pub mod department;

use tokio::sync::watch;

use crate::error::{OrgError, OrgResult};

pub use collector::{ExpiredSubtreeCollector, SweepStats};
pub use department::{
    CreateDepartment, DepartmentService, MoveDepartment, SoftDeleteDepartment, UpdateDepartment,
};

/// Cooperative cancellation signal checked at workflow step boundaries.
/// Raised before commit, it rolls the transaction back and surfaces
/// [`OrgError::Cancelled`]; the collector treats it as "stop this pass".
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// New signal plus the sender that raises it (`send(true)`).
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// A signal that can never be raised, for callers without cancellation.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn check(&self) -> OrgResult<()> {
        if self.is_cancelled() {
            Err(OrgError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once the signal is raised; pends forever if the sender is
    /// dropped without raising it.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

/// Tree change notification, broadcast only after a successful commit.
/// Downstream read caches subscribe and invalidate on receipt.
#[derive(Clone, Debug)]
pub enum TreeEvent {
    Created { id: i64 },
    Moved { id: i64 },
    SoftDeleted { id: i64 },
    Updated { id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_signal() {
        let (tx, cancel) = CancelSignal::new();
        assert!(!cancel.is_cancelled());
        assert!(cancel.check().is_ok());

        tx.send(true).unwrap();
        assert!(cancel.is_cancelled());
        assert!(matches!(cancel.check(), Err(OrgError::Cancelled)));
    }

    #[tokio::test]
    async fn test_never_signal_stays_clear() {
        let cancel = CancelSignal::never();
        assert!(!cancel.is_cancelled());
        assert!(cancel.check().is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_on_raise() {
        let (tx, mut cancel) = CancelSignal::new();
        tx.send(true).unwrap();
        // must resolve immediately, not wait for another change
        cancel.cancelled().await;
    }
}
