use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};

use uuid::Uuid;

use crate::deferred::Deferred;
use crate::failure::StorageFailure;
use crate::turns::TurnQueue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnMode {
    ReadOnly,
    ReadWrite,
}

impl TxnMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "readonly",
            Self::ReadWrite => "readwrite",
        }
    }
}

impl fmt::Display for TxnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered transactions are either accepting/awaiting requests or have
/// drained and await their scheduled completion turn. Completion and abort
/// are terminal: the record is unregistered, and the settled `Deferred<()>`
/// handed out at creation carries the outcome for late listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Draining,
}

struct TxnRecord {
    mode: TxnMode,
    store_names: Vec<String>,
    pending: BTreeSet<u64>,
    state: TxnState,
    completion: Deferred<()>,
}

struct TrackerInner {
    transactions: BTreeMap<Uuid, TxnRecord>,
}

/// Tracks which in-flight requests belong to which transaction and fires each
/// transaction's completion exactly once, after the responses for all of its
/// requests have been delivered, regardless of arrival order.
///
/// Completion never fires synchronously with the last response: the drain
/// check runs on a scheduled turn and re-verifies emptiness, so a request
/// linked between the check being scheduled and running demotes the
/// transaction back to active. Terminal transitions unregister the record;
/// the registry only ever holds live transactions.
#[derive(Clone)]
pub struct TransactionTracker {
    inner: Rc<RefCell<TrackerInner>>,
    turns: TurnQueue,
}

impl TransactionTracker {
    pub fn new(turns: TurnQueue) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TrackerInner {
                transactions: BTreeMap::new(),
            })),
            turns,
        }
    }

    /// Registers a new active transaction, returning its id and the
    /// completion deferred. A drain check is scheduled right away: a
    /// transaction that never seeds a request completes on a later turn,
    /// while a caller that issues requests in the same call stack fills the
    /// pending set before the check runs.
    pub fn create(&self, mode: TxnMode, store_names: Vec<String>) -> (Uuid, Deferred<()>) {
        let id = Uuid::new_v4();
        let completion: Deferred<()> = Deferred::new(self.turns.clone());
        self.inner.borrow_mut().transactions.insert(
            id,
            TxnRecord {
                mode,
                store_names,
                pending: BTreeSet::new(),
                state: TxnState::Active,
                completion: completion.clone(),
            },
        );
        self.schedule_drain_check(id);
        (id, completion)
    }

    /// Completion deferred of a still-registered transaction. Terminal
    /// transactions are unregistered; their completion lives on in the
    /// handles that captured it at creation.
    pub fn completion(&self, txn: Uuid) -> Option<Deferred<()>> {
        self.inner
            .borrow()
            .transactions
            .get(&txn)
            .map(|record| record.completion.clone())
    }

    pub fn state(&self, txn: Uuid) -> Option<TxnState> {
        self.inner
            .borrow()
            .transactions
            .get(&txn)
            .map(|record| record.state)
    }

    pub fn mode(&self, txn: Uuid) -> Option<TxnMode> {
        self.inner
            .borrow()
            .transactions
            .get(&txn)
            .map(|record| record.mode)
    }

    pub fn covers_store(&self, txn: Uuid, store_name: &str) -> bool {
        self.inner
            .borrow()
            .transactions
            .get(&txn)
            .is_some_and(|record| record.store_names.iter().any(|name| name == store_name))
    }

    pub fn live_count(&self) -> usize {
        self.inner.borrow().transactions.len()
    }

    /// Registers a request as belonging to the transaction. A transaction
    /// already draining is demoted back to active; its scheduled drain check
    /// will then observe the new member and do nothing. Unregistered
    /// transactions are a no-op.
    pub fn link(&self, txn: Uuid, request_id: u64) {
        let mut inner = self.inner.borrow_mut();
        let Some(record) = inner.transactions.get_mut(&txn) else {
            return;
        };
        record.pending.insert(request_id);
        record.state = TxnState::Active;
    }

    /// Removes a request from its transaction's pending set. Called before
    /// the request's own completion fires. If the set drains, a completion
    /// check is scheduled on a later turn. Unknown transactions are a no-op.
    pub fn unlink(&self, txn: Uuid, request_id: u64) {
        let drained = {
            let mut inner = self.inner.borrow_mut();
            let Some(record) = inner.transactions.get_mut(&txn) else {
                return;
            };
            record.pending.remove(&request_id);
            let drained = record.pending.is_empty() && record.state == TxnState::Active;
            if drained {
                record.state = TxnState::Draining;
            }
            drained
        };
        if drained {
            self.schedule_drain_check(txn);
        }
    }

    /// At turn time the check re-verifies that the transaction is still
    /// registered with an empty pending set; anything linked in the meantime
    /// makes this a no-op and a later unlink schedules a fresh check. On
    /// success the record is unregistered before the completion fires.
    fn schedule_drain_check(&self, txn: Uuid) {
        let weak: Weak<RefCell<TrackerInner>> = Rc::downgrade(&self.inner);
        self.turns.schedule(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let completion = {
                let mut inner = inner.borrow_mut();
                let empty = inner
                    .transactions
                    .get(&txn)
                    .is_some_and(|record| record.pending.is_empty());
                if !empty {
                    return;
                }
                match inner.transactions.remove(&txn) {
                    Some(record) => record.completion,
                    None => return,
                }
            };
            completion.resolve(());
        });
    }

    /// Explicit abort: unregisters immediately and rejects the completion
    /// with the given failure. Member requests already sent keep running to
    /// their own completions; their later unlink against the unregistered
    /// transaction is a no-op.
    pub fn abort(&self, txn: Uuid, failure: StorageFailure) {
        let record = self.inner.borrow_mut().transactions.remove(&txn);
        if let Some(record) = record {
            record.completion.reject(failure);
        }
    }

    /// Terminal connection loss: every live transaction aborts with the
    /// given failure and the registry is cleared.
    pub fn fail_all(&self, failure: &StorageFailure) {
        let doomed = {
            let mut inner = self.inner.borrow_mut();
            std::mem::take(&mut inner.transactions)
        };
        for (_, record) in doomed {
            record.completion.reject(failure.clone());
        }
    }
}
