//! # Liveness Tracker
//!
//! Tracks the last heartbeat time seen for each registered [`NodeId`] and
//! answers the single question the coordinator's sweep loop needs: has
//! this worker gone quiet? The timeout predicate carries the `+1` second
//! bias from `PSServer.ps_check_heartbeat` verbatim — it forgives the
//! quantization race between a heartbeat landing and the sweep tick that
//! checks for it, so a worker heartbeating exactly on the timeout
//! boundary is never falsely evicted.

use crate::node_id::NodeId;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs_f64()
}

/// Per-worker last-seen timestamps, keyed by [`NodeId`].
#[derive(Debug, Default)]
pub struct LivenessTracker {
    last_seen: HashMap<NodeId, f64>,
    timeout_secs: u64,
}

impl LivenessTracker {
    pub fn new(timeout_secs: u64) -> Self {
        LivenessTracker {
            last_seen: HashMap::new(),
            timeout_secs,
        }
    }

    /// Record (or refresh) a worker's presence at the current time.
    pub fn touch(&mut self, id: NodeId) {
        self.last_seen.insert(id, now_secs());
    }

    /// Stop tracking a worker entirely, e.g. after it is evicted.
    pub fn remove(&mut self, id: NodeId) {
        self.last_seen.remove(&id);
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.last_seen.contains_key(&id)
    }

    /// `true` once `now - last_seen + 1 > timeout`, matching
    /// `ps_check_heartbeat`'s exact predicate. A worker never tracked is
    /// not considered timed out — the caller is expected to have
    /// registered it via `touch` on `Init`.
    pub fn is_timed_out(&self, id: NodeId) -> bool {
        match self.last_seen.get(&id) {
            Some(&seen) => (now_secs() - seen + 1.0) as u64 > self.timeout_secs,
            None => false,
        }
    }

    /// All currently-tracked ids whose last heartbeat has expired.
    pub fn timed_out_ids(&self) -> Vec<NodeId> {
        self.last_seen
            .keys()
            .copied()
            .filter(|id| self.is_timed_out(*id))
            .collect()
    }
}
