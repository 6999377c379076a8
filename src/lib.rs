//! # farflung — Distributed Work-Dispatch Framework
//!
//! A coordinator hands units of work to a fleet of workers over a small,
//! authenticated, compressed wire protocol, and collects their results.
//! It is built for embarrassingly parallel batch jobs — parameter
//! sweeps, search spaces, anything that decomposes into independent
//! units a single worker can finish without talking to any other worker.
//!
//! ## Module Organization
//!
//! - [`node_id`] — opaque worker identity (`NodeId`)
//! - [`config`] — shared configuration (`Configuration`), loaded from JSON
//! - [`message`] — the wire protocol tagged union (`Message`)
//! - [`codec`] — serialize → compress → encrypt frame pipeline
//! - [`liveness`] — per-worker heartbeat tracking
//! - [`coordinator`] — the dispatcher side (`Coordinator`, `CoordinatorCallbacks`)
//! - [`worker`] — the worker side (`Worker`, `WorkerCallbacks`)
//! - [`error`] — typed error kinds (`FarflungError` and friends)
//!
//! ## Extension model
//!
//! There is no base class to subclass. A job supplies a
//! [`coordinator::CoordinatorCallbacks`] and a [`worker::WorkerCallbacks`]
//! record of plain closures; the framework owns the state machines,
//! connection handling, and concurrency, and calls back into the job's
//! closures at well-defined points.

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod liveness;
pub mod message;
pub mod node_id;
pub mod worker;

pub use config::Configuration;
pub use coordinator::{Coordinator, CoordinatorCallbacks};
pub use error::FarflungError;
pub use message::Message;
pub use node_id::NodeId;
pub use worker::{Worker, WorkerCallbacks};
