//! # Worker
//!
//! Runs two concurrent tasks for the lifetime of the process: a main task
//! driving the `Init -> NeedData -> HasData` state machine, and a
//! heartbeat task sending a `Heartbeat` on its own timer. Either task
//! ending — job finished, heartbeat rejected, connection refused — tears
//! down the other, the same all-or-nothing semantics `asyncio.TaskGroup`
//! gives `PSNode.ps_start_tasks`.
//!
//! A worker's own state `N` is owned exclusively by the main task: unlike
//! the coordinator side, nothing else ever touches it concurrently, so it
//! needs no lock at all. `process_data` still moves it onto the blocking
//! thread pool and back (mirroring `ps_process_data_thread`'s
//! `asyncio.to_thread`), since a CPU-bound callback would otherwise stall
//! every other task on the runtime.

use crate::codec;
use crate::config::Configuration;
use crate::error::{FarflungError, TransportError};
use crate::message::Message;
use crate::node_id::NodeId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const NO_DATA_BACKOFF: Duration = Duration::from_secs(10);

/// User callback surface for a worker, generic over its own state `N`,
/// the init-reply payload `I`, the work-item payload `W`, and the result
/// payload `R`.
pub struct WorkerCallbacks<N, I, W, R> {
    /// Consume the coordinator's init payload. Runs inline on the main
    /// task, not on the blocking pool — it is expected to be cheap.
    pub init: Arc<dyn Fn(&mut N, I) + Send + Sync>,
    /// Compute a result from one unit of work.
    pub process_data: Arc<dyn Fn(&mut N, W) -> R + Send + Sync>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Init,
    NeedData,
    HasData,
}

pub struct Worker<N, I, W, R> {
    config: Configuration,
    node_id: NodeId,
    callbacks: WorkerCallbacks<N, I, W, R>,
    state: N,
}

impl<N, I, W, R> Worker<N, I, W, R>
where
    N: Send + 'static,
    I: Serialize + DeserializeOwned + Send + Sync + 'static,
    W: Serialize + DeserializeOwned + Send + Sync + 'static,
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(config: Configuration, callbacks: WorkerCallbacks<N, I, W, R>, state: N) -> Self {
        Worker {
            config,
            node_id: NodeId::new(),
            callbacks,
            state,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Run the main and heartbeat tasks until the job finishes, the
    /// coordinator rejects this worker, or the connection is refused.
    pub async fn run(self) -> Result<(), FarflungError> {
        let addr = self.config.socket_addr();
        tracing::info!(node_id = %self.node_id, "starting worker");

        let main_config = self.config.clone();
        let heartbeat_config = self.config.clone();
        let heartbeat_timeout = self.config.heartbeat_timeout;
        let node_id = self.node_id;

        let mut main_task = tokio::spawn(main_loop(
            main_config,
            node_id,
            self.callbacks,
            self.state,
            addr.clone(),
        ));
        let mut heartbeat_task = tokio::spawn(heartbeat_loop::<I, W, R>(
            heartbeat_config,
            node_id,
            addr,
            heartbeat_timeout,
        ));

        let result = tokio::select! {
            res = &mut main_task => {
                heartbeat_task.abort();
                res
            }
            res = &mut heartbeat_task => {
                main_task.abort();
                res
            }
        };

        tracing::info!("worker exiting");
        result.map_err(|e| FarflungError::User(format!("worker task panicked: {e}")))?
    }
}

async fn send_and_receive<I, W, R>(
    addr: &str,
    msg: &Message<I, W, R>,
    config: &Configuration,
) -> Result<Message<I, W, R>, FarflungError>
where
    I: Serialize + DeserializeOwned + Sync,
    W: Serialize + DeserializeOwned + Sync,
    R: Serialize + DeserializeOwned + Sync,
{
    let mut stream = match TcpStream::connect(addr).await {
        Ok(stream) => stream,
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            return Err(TransportError::ConnectionRefused.into())
        }
        Err(e) => return Err(TransportError::Io(e).into()),
    };

    let bytes = codec::encode(msg, config)?;
    stream.write_all(&bytes).await.map_err(TransportError::Io)?;
    stream.shutdown().await.map_err(TransportError::Io)?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.map_err(TransportError::Io)?;
    let reply = codec::decode(&buf, config)?;
    Ok(reply)
}

fn is_connection_refused(err: &FarflungError) -> bool {
    matches!(
        err,
        FarflungError::Transport(TransportError::ConnectionRefused)
    )
}

async fn main_loop<N, I, W, R>(
    config: Configuration,
    node_id: NodeId,
    callbacks: WorkerCallbacks<N, I, W, R>,
    mut state: N,
    addr: String,
) -> Result<(), FarflungError>
where
    N: Send + 'static,
    I: Serialize + DeserializeOwned + Send + Sync + 'static,
    W: Serialize + DeserializeOwned + Send + Sync + 'static,
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let mut mode = Mode::Init;
    let mut pending_result: Option<R> = None;

    loop {
        let outgoing: Message<I, W, R> = match mode {
            Mode::Init => Message::Init(node_id),
            Mode::NeedData => Message::NeedData(node_id),
            Mode::HasData => {
                let result = pending_result
                    .take()
                    .expect("HasData is only entered with a pending result");
                Message::Result(node_id, result)
            }
        };

        let reply = match send_and_receive(&addr, &outgoing, &config).await {
            Ok(reply) => reply,
            Err(error) if is_connection_refused(&error) => {
                tracing::error!("could not connect to coordinator, exiting");
                return Ok(());
            }
            Err(error) => return Err(error),
        };

        match (mode, reply) {
            (Mode::Init, Message::InitOk(data)) => {
                (callbacks.init)(&mut state, data);
                mode = Mode::NeedData;
            }
            (_, Message::InitError) => {
                tracing::error!("coordinator rejected init");
                return Ok(());
            }
            (Mode::NeedData, Message::NewData(None)) => {
                tracing::debug!("no work available, waiting for other workers to finish");
                tokio::time::sleep(NO_DATA_BACKOFF).await;
            }
            (Mode::NeedData, Message::NewData(Some(work))) => {
                let callback = callbacks.process_data.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    let result = callback(&mut state, work);
                    (state, result)
                })
                .await
                .map_err(|e| FarflungError::User(format!("process_data panicked: {e}")))?;
                state = outcome.0;
                pending_result = Some(outcome.1);
                mode = Mode::HasData;
            }
            (Mode::HasData, Message::ResultOk) => {
                mode = Mode::NeedData;
            }
            (_, Message::Quit) => {
                tracing::info!("job finished");
                return Ok(());
            }
            (mode, other) => {
                tracing::error!(?mode, tag = other.tag(), "unexpected message for current mode");
                return Ok(());
            }
        }
    }
}

async fn heartbeat_loop<I, W, R>(
    config: Configuration,
    node_id: NodeId,
    addr: String,
    heartbeat_timeout: u64,
) -> Result<(), FarflungError>
where
    I: Serialize + DeserializeOwned + Send + Sync + 'static,
    W: Serialize + DeserializeOwned + Send + Sync + 'static,
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    loop {
        tokio::time::sleep(Duration::from_secs(heartbeat_timeout)).await;

        let msg: Message<I, W, R> = Message::Heartbeat(node_id);
        match send_and_receive(&addr, &msg, &config).await {
            Ok(Message::HeartbeatOk) => continue,
            Ok(Message::HeartbeatError) => {
                tracing::error!("heartbeat rejected");
                return Ok(());
            }
            Ok(Message::Quit) => {
                tracing::info!("job finished, quit");
                return Ok(());
            }
            Ok(other) => {
                tracing::error!(tag = other.tag(), "unexpected heartbeat reply");
                return Ok(());
            }
            Err(error) if is_connection_refused(&error) => {
                tracing::error!("could not connect to coordinator, exiting");
                return Ok(());
            }
            Err(error) => return Err(error),
        }
    }
}
