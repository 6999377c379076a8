//! End-to-end tests driving a real `Coordinator` and real `Worker`s over
//! actual TCP sockets on ephemeral ports, the way `tests/mock_coordinator.rs`
//! spins up a real in-process server rather than mocking the transport.
//!
//! The job under test hands out tickets `0..N`, a worker squares its
//! ticket, and the coordinator records each result. `is_job_done` once
//! every ticket has a recorded result.

use farflung::coordinator::CoordinatorCallbacks;
use farflung::worker::WorkerCallbacks;
use farflung::{Configuration, Coordinator, Worker};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Default)]
struct JobState {
    next_ticket: u32,
    total: u32,
    results: HashMap<u32, u32>,
}

type SharedJob = Arc<StdMutex<JobState>>;

fn job_callbacks() -> CoordinatorCallbacks<SharedJob, (), u32, (u32, u32)> {
    CoordinatorCallbacks {
        get_init_data: Arc::new(|_job, _node_id| {}),
        get_new_data: Arc::new(|job, _node_id| {
            let mut job = job.lock().unwrap();
            if job.next_ticket >= job.total {
                None
            } else {
                let ticket = job.next_ticket;
                job.next_ticket += 1;
                Some(ticket)
            }
        }),
        process_result: Arc::new(|job, _node_id, (ticket, squared): (u32, u32)| {
            job.lock().unwrap().results.insert(ticket, squared);
        }),
        is_job_done: Arc::new(|job| {
            let job = job.lock().unwrap();
            job.results.len() as u32 == job.total
        }),
        save_data: Arc::new(|_job| {}),
        on_timeout: Arc::new(|job, _node_id| {
            // A dead worker's ticket goes back into circulation by
            // rewinding the counter; good enough for this fixed-size test job.
            let mut job = job.lock().unwrap();
            job.next_ticket = job.next_ticket.saturating_sub(1);
        }),
    }
}

fn worker_process_callbacks() -> WorkerCallbacks<(), (), u32, (u32, u32)> {
    WorkerCallbacks {
        init: Arc::new(|_state, _data| {}),
        process_data: Arc::new(|_state, ticket| (ticket, ticket * ticket)),
    }
}

async fn free_config(key: &str) -> Configuration {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let mut config = Configuration::new(key).unwrap();
    config.server_port = port;
    config
}

/// Poll `job` until every ticket has a result, or panic after `timeout`.
/// Avoids blocking on a worker's 10-second no-work backoff or the
/// coordinator's 10-second sweep tick, neither of which this test needs
/// to wait through to observe the job finishing.
async fn wait_for_completion(job: &SharedJob, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        {
            let job = job.lock().unwrap();
            if job.results.len() as u32 == job.total {
                return;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("job did not complete within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn single_worker_completes_a_small_job() {
    let config = free_config("abcdefghijklmnopqrstuvwxyz012345").await;
    let job: SharedJob = Arc::new(StdMutex::new(JobState {
        total: 5,
        ..Default::default()
    }));

    let coordinator = Coordinator::new(config.clone(), job_callbacks(), job.clone());
    let coordinator_handle = tokio::spawn(coordinator.run());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let worker = Worker::new(config, worker_process_callbacks(), ());
    let worker_handle = tokio::spawn(worker.run());

    wait_for_completion(&job, Duration::from_secs(5)).await;

    {
        let job = job.lock().unwrap();
        assert_eq!(job.results.len(), 5);
        for (ticket, squared) in job.results.iter() {
            assert_eq!(*squared, ticket * ticket);
        }
    }

    worker_handle.abort();
    coordinator_handle.abort();
}

#[tokio::test]
async fn two_workers_race_to_complete_the_job() {
    let config = free_config("ZYXWVUTSRQPONMLKJIHGFEDCBA987654").await;
    let job: SharedJob = Arc::new(StdMutex::new(JobState {
        total: 20,
        ..Default::default()
    }));

    let coordinator = Coordinator::new(config.clone(), job_callbacks(), job.clone());
    let coordinator_handle = tokio::spawn(coordinator.run());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let worker_a = Worker::new(config.clone(), worker_process_callbacks(), ());
    let worker_b = Worker::new(config, worker_process_callbacks(), ());
    let worker_a_handle = tokio::spawn(worker_a.run());
    let worker_b_handle = tokio::spawn(worker_b.run());

    wait_for_completion(&job, Duration::from_secs(5)).await;

    assert_eq!(job.lock().unwrap().results.len(), 20);

    worker_a_handle.abort();
    worker_b_handle.abort();
    coordinator_handle.abort();
}

#[tokio::test]
async fn duplicate_init_from_the_same_node_id_is_rejected() {
    let key = "1".repeat(32);
    let config = free_config(&key).await;

    let job: SharedJob = Arc::new(StdMutex::new(JobState {
        total: 1,
        ..Default::default()
    }));
    let coordinator = Coordinator::new(config.clone(), job_callbacks(), job.clone());
    let handle = tokio::spawn(coordinator.run());
    tokio::time::sleep(Duration::from_millis(50)).await;

    use farflung::message::Message;
    use farflung::node_id::NodeId;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let node_id = NodeId::new();
    let addr = config.socket_addr();

    async fn send(
        addr: &str,
        msg: &Message<(), u32, (u32, u32)>,
        config: &Configuration,
    ) -> Message<(), u32, (u32, u32)> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let bytes = farflung::codec::encode(msg, config).unwrap();
        stream.write_all(&bytes).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        farflung::codec::decode(&buf, config).unwrap()
    }

    let first = send(&addr, &Message::Init(node_id), &config).await;
    assert!(matches!(first, Message::InitOk(())));

    let second = send(&addr, &Message::Init(node_id), &config).await;
    assert!(matches!(second, Message::InitError));

    handle.abort();
}

/// A worker that registers, takes a ticket, and then goes silent (sends no
/// further heartbeat) must eventually have its ticket put back into
/// circulation by the sweep loop's timeout callback. `heartbeat_timeout`
/// is set to the minimum allowed value to keep this test's two 10-second
/// sweep ticks from stretching any longer than necessary.
#[tokio::test]
async fn a_dead_worker_s_ticket_is_reassigned_after_timeout() {
    use farflung::message::Message;
    use farflung::node_id::NodeId;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let mut config = free_config("dead-worker-timeout-key-32-bytes").await;
    config.heartbeat_timeout = 10;

    let job: SharedJob = Arc::new(StdMutex::new(JobState {
        total: 3,
        ..Default::default()
    }));
    let coordinator = Coordinator::new(config.clone(), job_callbacks(), job.clone());
    let handle = tokio::spawn(coordinator.run());
    tokio::time::sleep(Duration::from_millis(50)).await;

    async fn send(
        addr: &str,
        msg: &Message<(), u32, (u32, u32)>,
        config: &Configuration,
    ) -> Message<(), u32, (u32, u32)> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let bytes = farflung::codec::encode(msg, config).unwrap();
        stream.write_all(&bytes).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        farflung::codec::decode(&buf, config).unwrap()
    }

    let addr = config.socket_addr();
    let dead_node = NodeId::new();
    let init_reply = send(&addr, &Message::Init(dead_node), &config).await;
    assert!(matches!(init_reply, Message::InitOk(())));

    let data_reply = send(&addr, &Message::NeedData(dead_node), &config).await;
    let claimed_ticket = match data_reply {
        Message::NewData(Some(ticket)) => ticket,
        other => panic!("expected a ticket, got {other:?}"),
    };
    assert_eq!(job.lock().unwrap().next_ticket, claimed_ticket + 1);

    // Say nothing further: no heartbeat. Wait across two sweep ticks
    // (the timeout itself can land just past the first).
    tokio::time::sleep(Duration::from_secs(21)).await;

    assert_eq!(
        job.lock().unwrap().next_ticket,
        claimed_ticket,
        "on_timeout should have put the ticket back into circulation"
    );

    handle.abort();
}
