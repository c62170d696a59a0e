//! Explicit transaction handles for enlisting message settlement.
//!
//! The receive pump owns the unit of work. It hands the settlement coordinator
//! an optional [`Transaction`]; the coordinator wraps a single remote call in a
//! [`TransactionScope`] which reports the call's outcome back through the
//! handle's commit/rollback callbacks and never resolves the transaction itself.

use std::fmt;
use std::sync::Mutex;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "transaction_tests.rs"]
mod tests;

/// Commit/rollback callback pair supplied by the owner of a unit of work.
pub trait Transaction: Send + Sync {
    /// The enlisted operation finished and its scope was completed.
    fn commit(&self);

    /// The enlisted operation's scope ended without being completed.
    fn rollback(&self);
}

/// Scope binding one remote call to an optional caller-owned transaction.
///
/// Dropping the scope without calling [`TransactionScope::complete`] rolls the
/// transaction back, including when the owning future is dropped mid-await.
#[must_use = "a scope that is dropped immediately rolls back its transaction"]
pub struct TransactionScope<'a> {
    transaction: Option<&'a dyn Transaction>,
    completed: bool,
}

impl<'a> TransactionScope<'a> {
    /// Open a scope over `transaction`, or a purely local scope when `None`.
    pub fn enlist(transaction: Option<&'a dyn Transaction>) -> Self {
        Self {
            transaction,
            completed: false,
        }
    }

    pub fn is_enlisted(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Mark the scope successful and commit the enlisted transaction.
    pub fn complete(mut self) {
        self.completed = true;
        if let Some(transaction) = self.transaction {
            transaction.commit();
        }
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if let Some(transaction) = self.transaction {
            debug!("Transaction scope ended without completion, rolling back");
            transaction.rollback();
        }
    }
}

impl fmt::Debug for TransactionScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionScope")
            .field("enlisted", &self.is_enlisted())
            .field("completed", &self.completed)
            .finish()
    }
}

/// Resolution of a [`CommittableTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

/// Transaction handle that records how it was resolved. First outcome wins.
#[derive(Debug)]
pub struct CommittableTransaction {
    state: Mutex<TransactionState>,
}

impl CommittableTransaction {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TransactionState::Active),
        }
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_committed(&self) -> bool {
        self.state() == TransactionState::Committed
    }

    fn resolve(&self, outcome: TransactionState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            TransactionState::Active => *state = outcome,
            current if current == outcome => {}
            current => warn!(
                current = ?current,
                requested = ?outcome,
                "Ignoring conflicting resolution of an already resolved transaction"
            ),
        }
    }
}

impl Default for CommittableTransaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction for CommittableTransaction {
    fn commit(&self) {
        self.resolve(TransactionState::Committed);
    }

    fn rollback(&self) {
        self.resolve(TransactionState::RolledBack);
    }
}

/// Adapts a pair of closures into a [`Transaction`].
pub struct CallbackTransaction<C, R> {
    on_commit: C,
    on_rollback: R,
}

impl<C, R> CallbackTransaction<C, R>
where
    C: Fn() + Send + Sync,
    R: Fn() + Send + Sync,
{
    pub fn new(on_commit: C, on_rollback: R) -> Self {
        Self {
            on_commit,
            on_rollback,
        }
    }
}

impl<C, R> Transaction for CallbackTransaction<C, R>
where
    C: Fn() + Send + Sync,
    R: Fn() + Send + Sync,
{
    fn commit(&self) {
        (self.on_commit)();
    }

    fn rollback(&self) {
        (self.on_rollback)();
    }
}
