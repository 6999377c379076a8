//! # NodeId — Opaque Worker Identity
//!
//! Every worker process mints exactly one [`NodeId`] at startup and keeps it
//! for its entire lifetime. It is never persisted and never reassigned; the
//! coordinator only ever learns of a `NodeId` through an `Init` message.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 128-bit random identifier, UUIDv4 semantics. Equality and hashing are
/// defined on the underlying bit pattern.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Mint a fresh, random node id. Called exactly once per worker process.
    pub fn new() -> Self {
        NodeId(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
