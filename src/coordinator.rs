//! # Coordinator
//!
//! Dispatches work to a fleet of workers over the wire protocol in
//! [`crate::message`]. One TCP connection carries exactly one
//! request/reply exchange (`spec.md` §4.1): a worker connects, sends a
//! frame, half-closes its write side, and the coordinator replies and
//! closes. There is no persistent per-worker connection and no
//! length-prefixed framing — the half-close itself delimits the frame,
//! mirroring `PSServer.ps_handle_node`'s use of `reader.read()` to read
//! until EOF.
//!
//! User extension points are a capability record, [`CoordinatorCallbacks`],
//! rather than a base class to override: `get_init_data`, `get_new_data`,
//! and `process_result` run with the shared [`Configuration`]-scoped user
//! state locked and are dispatched onto the blocking thread pool, exactly
//! as `ps_get_init_data_lock` et al. run under `self.lock` inside
//! `asyncio.to_thread`. `is_job_done`, `on_timeout`, and `save_data` run
//! inline on the sweep task, unthreaded, because the original never wraps
//! them in `asyncio.to_thread` either.
//!
//! A panic escaping any of the four per-connection/sweep callbacks is
//! fatal to the whole coordinator (`spec.md` §7: "`UserError`... by
//! default... terminates the coordinator"), not just the one connection
//! that triggered it — a panic means user state may be left half-mutated,
//! and serving further requests against it would be unsound. A sweep-task
//! panic already terminates `run()` by construction (it unwinds the task
//! tokio spawned for `sweep_loop`, and `run()` joins that task with `?`).
//! Per-connection callbacks run inside `spawn_blocking`, which catches the
//! unwind instead of propagating it to the task that awaits it, so a
//! fatal-error channel carries the same signal back to `run()`'s accept
//! loop instead.

use crate::config::Configuration;
use crate::error::{FarflungError, ProtocolError, TransportError};
use crate::liveness::LivenessTracker;
use crate::message::Message;
use crate::node_id::NodeId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;

const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// User callback surface for a coordinator, generic over its shared state
/// `S`, the init-reply payload `I`, the work-item payload `W`, and the
/// result payload `R`. Every field is mandatory; there is no "must be
/// implemented by the subclass" default to forget to override.
pub struct CoordinatorCallbacks<S, I, W, R> {
    /// Produce the per-worker init payload sent back with `InitOk`.
    pub get_init_data: Arc<dyn Fn(&mut S, NodeId) -> I + Send + Sync>,
    /// Produce the next unit of work for a worker, or `None` if there is
    /// currently nothing left to hand out.
    pub get_new_data: Arc<dyn Fn(&mut S, NodeId) -> Option<W> + Send + Sync>,
    /// Merge a worker's result into shared state.
    pub process_result: Arc<dyn Fn(&mut S, NodeId, R) + Send + Sync>,
    /// Has every unit of work been completed?
    pub is_job_done: Arc<dyn Fn(&S) -> bool + Send + Sync>,
    /// Persist final state once the job is done and every worker has quit.
    pub save_data: Arc<dyn Fn(&S) + Send + Sync>,
    /// A worker's heartbeat has expired. The coordinator does not evict
    /// the worker from its own liveness bookkeeping; recovering any
    /// work the worker was holding is this callback's responsibility.
    pub on_timeout: Arc<dyn Fn(&mut S, NodeId) + Send + Sync>,
}

/// A running coordinator, parameterized the same way as its callbacks.
pub struct Coordinator<S, I, W, R> {
    config: Configuration,
    callbacks: CoordinatorCallbacks<S, I, W, R>,
    state: S,
}

impl<S, I, W, R> Coordinator<S, I, W, R>
where
    S: Send + 'static,
    I: Serialize + DeserializeOwned + Send + 'static,
    W: Serialize + DeserializeOwned + Send + 'static,
    R: Serialize + DeserializeOwned + Send + 'static,
{
    pub fn new(config: Configuration, callbacks: CoordinatorCallbacks<S, I, W, R>, state: S) -> Self {
        Coordinator {
            config,
            callbacks,
            state,
        }
    }

    /// Bind, serve workers, and sweep for completion and dead workers
    /// until the job is done and every worker has been told to quit.
    /// Returns once `save_data` has run, mirroring `PSServer.ps_run`.
    pub async fn run(self) -> Result<(), FarflungError> {
        let heartbeat_timeout = self.config.heartbeat_timeout;
        let quit_counter = self.config.quit_counter;
        // `spec.md` §6.2: "Coordinator binds `0.0.0.0:<port>`" — unlike a
        // worker's `socket_addr()`, `server_address` is never read here.
        // `ps_server.py:172` hardcodes the same bind host and only uses
        // `server_address` on the node/worker side to know where to dial.
        let bind_addr = format!("0.0.0.0:{}", self.config.server_port);

        let config = Arc::new(self.config);
        let callbacks = Arc::new(self.callbacks);
        let user_state = Arc::new(AsyncMutex::new(self.state));
        let liveness = Arc::new(StdMutex::new(LivenessTracker::new(heartbeat_timeout)));
        let quitting = Arc::new(AtomicBool::new(false));

        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(TransportError::Io)?;
        tracing::info!(addr = %bind_addr, "coordinator listening");

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
        let (fatal_tx, mut fatal_rx) = tokio::sync::mpsc::unbounded_channel::<FarflungError>();

        let sweep_handle = tokio::spawn(sweep_loop(
            quit_counter,
            callbacks.clone(),
            user_state.clone(),
            liveness.clone(),
            quitting.clone(),
            shutdown_tx,
        ));

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let stream = match accepted {
                        Ok((stream, _)) => stream,
                        Err(error) => {
                            tracing::warn!(%error, "accept failed");
                            continue;
                        }
                    };
                    tokio::spawn(handle_connection(
                        stream,
                        config.clone(),
                        callbacks.clone(),
                        user_state.clone(),
                        liveness.clone(),
                        quitting.clone(),
                        fatal_tx.clone(),
                    ));
                }
                Some(error) = fatal_rx.recv() => {
                    tracing::error!(%error, "user callback panicked, terminating coordinator");
                    sweep_handle.abort();
                    return Err(error);
                }
                _ = shutdown_rx.changed() => break,
            }
        }

        tracing::debug!("closing coordinator listener");
        sweep_handle
            .await
            .map_err(|e| FarflungError::User(format!("sweep task panicked: {e}")))?;

        let guard = user_state.lock().await;
        (callbacks.save_data)(&guard);

        Ok(())
    }
}

async fn sweep_loop<S, I, W, R>(
    mut quit_counter: u32,
    callbacks: Arc<CoordinatorCallbacks<S, I, W, R>>,
    user_state: Arc<AsyncMutex<S>>,
    liveness: Arc<StdMutex<LivenessTracker>>,
    quitting: Arc<AtomicBool>,
    shutdown: tokio::sync::watch::Sender<bool>,
) {
    loop {
        tokio::time::sleep(SWEEP_INTERVAL).await;

        if quitting.load(Ordering::SeqCst) {
            quit_counter = quit_counter.saturating_sub(1);
            tracing::debug!(quit_counter, "quitting, counting down");
            if quit_counter == 0 {
                let _ = shutdown.send(true);
                break;
            }
            continue;
        }

        let done = {
            let guard = user_state.lock().await;
            (callbacks.is_job_done)(&guard)
        };

        if done {
            tracing::info!("job done, will tell workers to quit");
            quitting.store(true, Ordering::SeqCst);
            continue;
        }

        let timed_out = { liveness.lock().unwrap().timed_out_ids() };
        if !timed_out.is_empty() {
            let mut guard = user_state.lock().await;
            for id in timed_out {
                tracing::warn!(%id, "worker heartbeat timed out");
                (callbacks.on_timeout)(&mut guard, id);
            }
        }
    }
}

async fn handle_connection<S, I, W, R>(
    mut stream: TcpStream,
    config: Arc<Configuration>,
    callbacks: Arc<CoordinatorCallbacks<S, I, W, R>>,
    user_state: Arc<AsyncMutex<S>>,
    liveness: Arc<StdMutex<LivenessTracker>>,
    quitting: Arc<AtomicBool>,
    fatal: tokio::sync::mpsc::UnboundedSender<FarflungError>,
) where
    S: Send + 'static,
    I: Serialize + DeserializeOwned + Send + 'static,
    W: Serialize + DeserializeOwned + Send + 'static,
    R: Serialize + DeserializeOwned + Send + 'static,
{
    let mut buf = Vec::new();
    if stream.read_to_end(&mut buf).await.is_err() {
        return;
    }

    let incoming: Message<I, W, R> = match crate::codec::decode(&buf, &config) {
        Ok(msg) => msg,
        Err(error) => {
            tracing::warn!(%error, "dropping connection with malformed frame");
            return;
        }
    };

    let reply = if quitting.load(Ordering::SeqCst) {
        tracing::debug!("job done, telling worker to quit");
        Message::<I, W, R>::Quit
    } else {
        match incoming {
            Message::Init(node_id) => {
                // Check-and-register under one critical section so two
                // concurrent `Init`s for the same id can never both
                // observe "not yet registered" (spec.md §8's "idempotent
                // registration" invariant).
                let already_registered = {
                    let mut live = liveness.lock().unwrap();
                    let existed = live.contains(node_id);
                    if !existed {
                        live.touch(node_id);
                    }
                    existed
                };
                if already_registered {
                    tracing::error!(%node_id, error = %ProtocolError::AlreadyRegistered, "rejecting init");
                    Message::InitError
                } else {
                    match run_with_state(&user_state, callbacks.get_init_data.clone(), node_id).await
                    {
                        Ok(data) => Message::InitOk(data),
                        Err(error) => {
                            let _ = fatal.send(error);
                            return;
                        }
                    }
                }
            }
            Message::Heartbeat(node_id) => {
                let mut live = liveness.lock().unwrap();
                if live.contains(node_id) {
                    live.touch(node_id);
                    Message::HeartbeatOk
                } else {
                    tracing::error!(%node_id, error = %ProtocolError::UnknownNode, "rejecting heartbeat");
                    Message::HeartbeatError
                }
            }
            Message::NeedData(node_id) => {
                let registered = touch_if_registered(&liveness, node_id);
                if registered {
                    match run_with_state(&user_state, callbacks.get_new_data.clone(), node_id).await
                    {
                        Ok(data) => Message::NewData(data),
                        Err(error) => {
                            let _ = fatal.send(error);
                            return;
                        }
                    }
                } else {
                    tracing::error!(%node_id, error = %ProtocolError::UnknownNode, "rejecting data request");
                    Message::InitError
                }
            }
            Message::Result(node_id, result) => {
                let registered = touch_if_registered(&liveness, node_id);
                if registered {
                    let callback = callbacks.process_result.clone();
                    let guard = user_state.clone().lock_owned().await;
                    let outcome = tokio::task::spawn_blocking(move || {
                        let mut guard = guard;
                        callback(&mut guard, node_id, result);
                    })
                    .await;
                    match outcome {
                        Ok(()) => Message::ResultOk,
                        Err(error) => {
                            let _ = fatal.send(FarflungError::User(format!(
                                "process_result callback panicked: {error}"
                            )));
                            return;
                        }
                    }
                } else {
                    tracing::error!(%node_id, error = %ProtocolError::UnknownNode, "rejecting result");
                    Message::InitError
                }
            }
            other => {
                let error = ProtocolError::UnexpectedMessage(other.tag());
                tracing::warn!(%error, "coordinator received a worker-bound message");
                return;
            }
        }
    };

    if let Ok(bytes) = crate::codec::encode(&reply, &config) {
        let _ = stream.write_all(&bytes).await;
        let _ = stream.shutdown().await;
    }
}

fn touch_if_registered(liveness: &StdMutex<LivenessTracker>, node_id: NodeId) -> bool {
    let mut live = liveness.lock().unwrap();
    let registered = live.contains(node_id);
    if registered {
        live.touch(node_id);
    }
    registered
}

/// Lock `state`, hand the owned guard to `callback` on the blocking pool,
/// and return its result. A panicking callback is fatal — propagated to
/// the caller rather than swallowed, so it reaches `run()`'s accept loop
/// and terminates the coordinator instead of leaving `state` served to
/// further connections in a possibly half-mutated shape.
async fn run_with_state<S, T>(
    state: &Arc<AsyncMutex<S>>,
    callback: Arc<dyn Fn(&mut S, NodeId) -> T + Send + Sync>,
    node_id: NodeId,
) -> Result<T, FarflungError>
where
    S: Send + 'static,
    T: Send + 'static,
{
    let guard = state.clone().lock_owned().await;
    tokio::task::spawn_blocking(move || {
        let mut guard = guard;
        callback(&mut guard, node_id)
    })
    .await
    .map_err(|error| FarflungError::User(format!("coordinator callback panicked: {error}")))
}
