use std::collections::BTreeMap;

use serde_json::Value;
use uuid::Uuid;

use crate::deferred::Deferred;
use crate::wire::OpKind;

/// One in-flight request awaiting its correlated response.
pub struct PendingRequest {
    pub id: u64,
    pub kind: OpKind,
    pub txn: Option<Uuid>,
    pub deferred: Deferred<Value>,
}

/// Assigns monotonically increasing request ids and matches responses back to
/// the request that produced them. Ids are never reused within a connection.
#[derive(Default)]
pub struct RequestCorrelator {
    next_id: u64,
    pending: BTreeMap<u64, PendingRequest>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            pending: BTreeMap::new(),
        }
    }

    pub fn assign_id(&mut self) -> u64 {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        id
    }

    pub fn register(&mut self, request: PendingRequest) {
        self.pending.insert(request.id, request);
    }

    /// Removes and returns the pending entry for a correlated response id.
    /// Unknown ids return None; the caller discards such responses.
    pub fn take(&mut self, id: u64) -> Option<PendingRequest> {
        self.pending.remove(&id)
    }

    /// Empties the table in issuance order, for terminal connection loss.
    pub fn drain_all(&mut self) -> Vec<PendingRequest> {
        let drained = std::mem::take(&mut self.pending);
        drained.into_values().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
