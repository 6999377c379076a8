//! # Wire Protocol
//!
//! [`Message`] is the single tagged union carried by every frame, worker to
//! coordinator and back. It is generic over three user-defined payload
//! types — `I` (init reply data), `W` (a unit of work), `R` (a result) — so
//! that a job's own data model never has to be shoehorned into a
//! library-defined envelope.
//!
//! Variant names mirror `spec.md` §6.2's table one for one. `NewData(None)`
//! is the sentinel a coordinator sends when it has nothing left to hand
//! out; it is not an error and the worker's state machine treats it as
//! "try again after a rest", never as `NewData` without a payload being a
//! distinct failure mode.

use crate::node_id::NodeId;
use serde::{Deserialize, Serialize};

/// One frame's worth of protocol content. `ConnectionError` from
/// `spec.md` §6.2 has no variant here: it is never serialized onto the
/// wire, only synthesized locally by a worker when a connection attempt
/// fails, and is represented instead as a [`crate::error::TransportError`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Message<I, W, R> {
    // Worker -> Coordinator
    Heartbeat(NodeId),
    Init(NodeId),
    NeedData(NodeId),
    Result(NodeId, R),

    // Coordinator -> Worker
    HeartbeatOk,
    HeartbeatError,
    InitOk(I),
    InitError,
    NewData(Option<W>),
    ResultOk,
    Quit,
}

impl<I, W, R> Message<I, W, R> {
    /// Short tag name, used only for logging — never affects wire bytes.
    pub fn tag(&self) -> &'static str {
        match self {
            Message::Heartbeat(_) => "Heartbeat",
            Message::Init(_) => "Init",
            Message::NeedData(_) => "NeedData",
            Message::Result(_, _) => "Result",
            Message::HeartbeatOk => "HeartbeatOk",
            Message::HeartbeatError => "HeartbeatError",
            Message::InitOk(_) => "InitOk",
            Message::InitError => "InitError",
            Message::NewData(_) => "NewData",
            Message::ResultOk => "ResultOk",
            Message::Quit => "Quit",
        }
    }
}
