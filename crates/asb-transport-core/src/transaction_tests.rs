//! Tests for transaction scopes and handles.

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_completed_scope_commits_transaction() {
    let transaction = CommittableTransaction::new();

    let scope = TransactionScope::enlist(Some(&transaction));
    assert!(scope.is_enlisted());
    assert!(!scope.is_completed());
    scope.complete();

    assert_eq!(transaction.state(), TransactionState::Committed);
}

#[test]
fn test_dropped_scope_rolls_back_transaction() {
    let transaction = CommittableTransaction::new();

    {
        let _scope = TransactionScope::enlist(Some(&transaction));
    }

    assert_eq!(transaction.state(), TransactionState::RolledBack);
    assert!(!transaction.is_committed());
}

#[test]
fn test_local_scope_without_transaction_is_inert() {
    let scope = TransactionScope::enlist(None);
    assert!(!scope.is_enlisted());
    scope.complete();

    let _dropped = TransactionScope::enlist(None);
}

#[test]
fn test_first_resolution_wins() {
    let transaction = CommittableTransaction::new();
    transaction.rollback();
    transaction.commit();

    assert_eq!(transaction.state(), TransactionState::RolledBack);
}

#[test]
fn test_callback_transaction_invokes_matching_callback() {
    let commits = Arc::new(AtomicUsize::new(0));
    let rollbacks = Arc::new(AtomicUsize::new(0));

    let transaction = {
        let commits = Arc::clone(&commits);
        let rollbacks = Arc::clone(&rollbacks);
        CallbackTransaction::new(
            move || {
                commits.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                rollbacks.fetch_add(1, Ordering::SeqCst);
            },
        )
    };

    TransactionScope::enlist(Some(&transaction)).complete();
    drop(TransactionScope::enlist(Some(&transaction)));

    assert_eq!(commits.load(Ordering::SeqCst), 1);
    assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
}
