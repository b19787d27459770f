// tests/pool_client.rs
//! Pool client state machine scenarios against an in-process mock pool

use pool_miner_rs::device::DeviceId;
use pool_miner_rs::miner::{MiningJob, Share, SubmitOutcome, Target};
use pool_miner_rs::network::{ConnectionState, Credentials, PoolClient, PoolEvent, PoolSettings};
use pool_miner_rs::stats::StatsReporter;
use pool_miner_rs::{AlgorithmType, MinerError};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::timeout;

const STEP: Duration = Duration::from_secs(5);

struct MockPool {
    listener: TcpListener,
}

impl MockPool {
    async fn bind() -> Self {
        MockPool {
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    fn endpoint(&self) -> String {
        format!("stratum+tcp://{}", self.listener.local_addr().unwrap())
    }

    async fn accept(&self) -> PoolConn {
        let (socket, _) = timeout(STEP, self.listener.accept())
            .await
            .expect("client did not connect")
            .unwrap();
        let (read, writer) = socket.into_split();
        PoolConn {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }
}

/// Server side of one client connection
struct PoolConn {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl PoolConn {
    async fn recv(&mut self) -> Option<Value> {
        let line = timeout(STEP, self.lines.next_line())
            .await
            .expect("client went quiet")
            .ok()??;
        Some(serde_json::from_str(&line).unwrap())
    }

    async fn expect(&mut self, method: &str) -> Value {
        let message = self.recv().await.expect("connection closed");
        assert_eq!(message["method"], method, "unexpected message {}", message);
        message
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn send(&mut self, message: Value) {
        self.send_raw(&message.to_string()).await;
    }

    async fn reply(&mut self, request: &Value, result: Value, error: Value) {
        self.send(json!({ "id": request["id"], "result": result, "error": error }))
            .await;
    }

    async fn reply_subscribe(&mut self) {
        self.reply_subscribe_with("08000002").await;
    }

    async fn reply_subscribe_with(&mut self, extra_nonce: &str) {
        let subscribe = self.expect("mining.subscribe").await;
        self.reply(
            &subscribe,
            json!([[["mining.notify", "sub1"]], extra_nonce, 4]),
            Value::Null,
        )
        .await;
    }

    async fn handshake(&mut self) {
        self.handshake_with("08000002").await;
    }

    async fn handshake_with(&mut self, extra_nonce: &str) {
        self.reply_subscribe_with(extra_nonce).await;
        let authorize = self.expect("mining.authorize").await;
        assert_eq!(authorize["params"][0], "wallet.rig1");
        self.reply(&authorize, json!(true), Value::Null).await;
    }

    async fn notify(&mut self, job_id: &str, clean: bool) {
        self.send(json!({
            "id": null,
            "method": "mining.notify",
            "params": [job_id, "ab".repeat(76), clean],
        }))
        .await;
    }

    async fn set_difficulty(&mut self, difficulty: f64) {
        self.send(json!({
            "id": null,
            "method": "mining.set_difficulty",
            "params": [difficulty],
        }))
        .await;
    }

    /// Reads until the client hangs up
    async fn drain(mut self) {
        while let Ok(Ok(Some(_))) = timeout(STEP, self.lines.next_line()).await {}
    }
}

fn settings() -> PoolSettings {
    PoolSettings {
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(2),
        submit_timeout: Duration::from_millis(500),
        backoff_min: Duration::from_millis(10),
        backoff_max: Duration::from_millis(50),
        stable_after: Duration::from_secs(60),
        stale_grace: Duration::from_secs(5),
        max_auth_failures: 2,
        ..PoolSettings::default()
    }
}

fn credentials() -> Credentials {
    Credentials {
        user: "wallet".into(),
        password: "x".into(),
        worker_id: Some("rig1".into()),
    }
}

fn client(settings: PoolSettings) -> (PoolClient, StatsReporter) {
    let stats = StatsReporter::new(Duration::from_secs(60));
    (
        PoolClient::new(settings, AlgorithmType::Sha256d, stats.clone()),
        stats,
    )
}

fn share(job_id: &str, nonce: u64) -> Share {
    Share {
        job_id: job_id.into(),
        nonce,
        digest: [0x11; 32],
        device_id: DeviceId::from("cpu0"),
        found_at: SystemTime::now(),
    }
}

async fn next_job(events: &mut broadcast::Receiver<PoolEvent>) -> Arc<MiningJob> {
    loop {
        match timeout(STEP, events.recv()).await.expect("no job").unwrap() {
            PoolEvent::NewJob(job) => return job,
            _ => continue,
        }
    }
}

async fn wait_state(events: &mut broadcast::Receiver<PoolEvent>, wanted: ConnectionState) {
    loop {
        match timeout(STEP, events.recv()).await.expect("state not reached").unwrap() {
            PoolEvent::StateChanged(state) if state == wanted => return,
            _ => continue,
        }
    }
}

#[tokio::test]
async fn handshake_reaches_ready_and_forces_first_job_clean() {
    let pool = MockPool::bind().await;
    let (client, stats) = client(settings());
    let mut events = client.events();
    let mut jobs = client.jobs();
    client.connect(&pool.endpoint(), credentials()).unwrap();

    let mut conn = pool.accept().await;
    conn.handshake().await;
    conn.notify("j1", false).await;
    conn.notify("j2", false).await;

    let first = next_job(&mut events).await;
    assert_eq!(first.job_id, "j1");
    assert!(first.clean_jobs);
    assert_eq!(first.extra_nonce, vec![0x08, 0x00, 0x00, 0x02]);
    assert_eq!(first.header, vec![0xab; 76]);

    let second = next_job(&mut events).await;
    assert_eq!(second.job_id, "j2");
    assert!(!second.clean_jobs);

    jobs.changed().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Ready);
    assert_eq!(stats.get_stats().connection, ConnectionState::Ready);

    client.shutdown().await;
    client.shutdown().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.wait().await.is_ok());
    conn.drain().await;
}

#[tokio::test]
async fn reconnect_after_drop_runs_full_cycle_with_one_clean_job() {
    let pool = MockPool::bind().await;
    let (client, _stats) = client(settings());
    let mut events = client.events();
    client.connect(&pool.endpoint(), credentials()).unwrap();

    let mut conn = pool.accept().await;
    conn.handshake().await;
    conn.notify("before", true).await;
    next_job(&mut events).await;
    drop(conn);

    let mut conn = pool.accept().await;
    conn.handshake().await;
    conn.notify("after-1", false).await;
    conn.notify("after-2", false).await;

    let mut states = Vec::new();
    let mut clean = Vec::new();
    while clean.len() < 3 {
        match timeout(STEP, events.recv()).await.unwrap().unwrap() {
            PoolEvent::StateChanged(state) => states.push(state),
            PoolEvent::NewJob(job) => clean.push((job.job_id.clone(), job.clean_jobs)),
            _ => {}
        }
    }

    assert_eq!(
        states,
        vec![
            ConnectionState::Reconnecting,
            ConnectionState::Connecting,
            ConnectionState::Subscribing,
            ConnectionState::Authorizing,
            ConnectionState::Ready,
        ]
    );
    // The restarted previous job is the only clean one
    assert_eq!(
        clean,
        vec![
            ("before".to_string(), true),
            ("after-1".to_string(), false),
            ("after-2".to_string(), false),
        ]
    );

    client.shutdown().await;
    conn.drain().await;
}

#[tokio::test]
async fn reconnect_without_notify_restarts_previous_job_clean() {
    let pool = MockPool::bind().await;
    let (client, _stats) = client(settings());
    let mut events = client.events();
    let jobs = client.jobs();
    client.connect(&pool.endpoint(), credentials()).unwrap();

    let mut conn = pool.accept().await;
    conn.handshake().await;
    conn.set_difficulty(8.0).await;
    conn.notify("before", false).await;
    let before = next_job(&mut events).await;
    drop(conn);

    // The new session hands out another extra-nonce and no job
    let mut conn = pool.accept().await;
    conn.handshake_with("0a0b0c0d").await;
    wait_state(&mut events, ConnectionState::Ready).await;

    let restarted = next_job(&mut events).await;
    assert_eq!(restarted.job_id, "before");
    assert!(restarted.clean_jobs);
    assert_eq!(restarted.extra_nonce, vec![0x0a, 0x0b, 0x0c, 0x0d]);
    assert_eq!(restarted.header, before.header);
    assert_eq!(restarted.target, before.target);
    assert_eq!(
        jobs.borrow().as_ref().map(|job| job.extra_nonce.clone()),
        Some(vec![0x0a, 0x0b, 0x0c, 0x0d])
    );

    // A real job afterwards is not forced clean again
    conn.notify("fresh", false).await;
    let fresh = next_job(&mut events).await;
    assert_eq!(fresh.job_id, "fresh");
    assert!(!fresh.clean_jobs);

    client.shutdown().await;
    conn.drain().await;
}

#[tokio::test]
async fn submit_results_are_correlated_and_counted() {
    let pool = MockPool::bind().await;
    let (client, stats) = client(settings());
    let mut events = client.events();
    client.connect(&pool.endpoint(), credentials()).unwrap();

    let server = tokio::spawn(async move {
        let mut conn = pool.accept().await;
        conn.handshake().await;
        conn.notify("j1", true).await;

        let good = conn.expect("mining.submit").await;
        assert_eq!(
            good["params"],
            json!(["wallet.rig1", "j1", "0000002a", "11".repeat(32)])
        );
        let bad = conn.expect("mining.submit").await;
        // Answer out of order; ids correlate the replies
        conn.reply(&bad, Value::Null, json!([23, "Low difficulty share", null]))
            .await;
        conn.reply(&good, json!(true), Value::Null).await;
        conn.drain().await;
    });

    next_job(&mut events).await;
    let (good, bad) = tokio::join!(client.submit_share(share("j1", 42)), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.submit_share(share("j1", 43)).await
    });

    assert_eq!(good, SubmitOutcome::Accepted);
    assert_eq!(
        bad,
        SubmitOutcome::Rejected("Low difficulty share (code 23)".into())
    );

    let totals = stats.get_stats();
    assert_eq!(totals.shares_accepted, 1);
    assert_eq!(totals.shares_rejected, 1);
    assert_eq!(totals.shares_stale, 0);
    let cpu0 = &totals.devices[&DeviceId::from("cpu0")];
    assert_eq!((cpu0.accepted, cpu0.rejected), (1, 1));

    client.shutdown().await;
    server.await.unwrap();
}

#[tokio::test]
async fn transient_submit_failure_is_retried_once() {
    let pool = MockPool::bind().await;
    let (client, stats) = client(settings());
    let mut events = client.events();
    client.connect(&pool.endpoint(), credentials()).unwrap();

    let server = tokio::spawn(async move {
        let mut conn = pool.accept().await;
        conn.handshake().await;
        conn.notify("j1", true).await;
        let first = conn.expect("mining.submit").await;
        // Connection dies before the reply
        drop(conn);

        let mut conn = pool.accept().await;
        conn.handshake().await;
        let retry = conn.expect("mining.submit").await;
        assert_eq!(retry["params"], first["params"]);
        conn.reply(&retry, json!(true), Value::Null).await;
        conn.drain().await;
    });

    next_job(&mut events).await;
    assert_eq!(client.submit_share(share("j1", 7)).await, SubmitOutcome::Accepted);

    let totals = stats.get_stats();
    assert_eq!(totals.shares_accepted, 1);
    assert_eq!(totals.shares_lost, 0);

    client.shutdown().await;
    server.await.unwrap();
}

#[tokio::test]
async fn unanswered_share_is_lost_after_retry() {
    let pool = MockPool::bind().await;
    let (client, stats) = client(PoolSettings {
        submit_timeout: Duration::from_millis(200),
        ..settings()
    });
    let mut events = client.events();
    client.connect(&pool.endpoint(), credentials()).unwrap();

    tokio::spawn(async move {
        let mut first = true;
        loop {
            let mut conn = pool.accept().await;
            conn.handshake().await;
            if first {
                conn.notify("j1", true).await;
                first = false;
            }
            conn.drain().await;
        }
    });

    next_job(&mut events).await;
    let outcome = client.submit_share(share("j1", 9)).await;
    assert!(matches!(outcome, SubmitOutcome::Error(_)));
    assert_eq!(stats.get_stats().shares_lost, 1);
    assert_eq!(stats.get_stats().shares_accepted, 0);

    client.shutdown().await;
}

#[tokio::test]
async fn repeated_auth_rejection_is_fatal() {
    let pool = MockPool::bind().await;
    let (client, _stats) = client(settings());
    client.connect(&pool.endpoint(), credentials()).unwrap();

    for _ in 0..2 {
        let mut conn = pool.accept().await;
        conn.reply_subscribe().await;
        let authorize = conn.expect("mining.authorize").await;
        conn.reply(&authorize, Value::Null, json!([24, "Unauthorized worker", null]))
            .await;
        conn.drain().await;
    }

    let result = client.wait().await;
    assert!(matches!(result, Err(MinerError::AuthRejected(_))));
    assert!(result.unwrap_err().is_fatal());
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // No further attempts
    assert!(
        timeout(Duration::from_millis(200), pool.listener.accept())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn malformed_frame_forces_reconnect() {
    let pool = MockPool::bind().await;
    let (client, _stats) = client(settings());
    let mut events = client.events();
    client.connect(&pool.endpoint(), credentials()).unwrap();

    let mut conn = pool.accept().await;
    conn.handshake().await;
    wait_state(&mut events, ConnectionState::Ready).await;
    conn.send_raw("this is not json").await;
    wait_state(&mut events, ConnectionState::Reconnecting).await;

    let mut conn = pool.accept().await;
    conn.handshake().await;
    wait_state(&mut events, ConnectionState::Ready).await;

    client.shutdown().await;
    conn.drain().await;
}

#[tokio::test]
async fn difficulty_and_explicit_targets_shape_jobs() {
    let pool = MockPool::bind().await;
    let (client, _stats) = client(settings());
    let mut events = client.events();
    client.connect(&pool.endpoint(), credentials()).unwrap();

    let mut conn = pool.accept().await;
    conn.handshake().await;
    conn.set_difficulty(4.0).await;
    conn.notify("d4", true).await;
    conn.send(json!({
        "id": null,
        "method": "mining.notify",
        "params": ["explicit", "ab".repeat(76), false, "00ff"],
    }))
    .await;

    let job = next_job(&mut events).await;
    assert_eq!(job.difficulty, 4.0);
    assert_eq!(job.target, Target::from_difficulty(4.0));

    let job = next_job(&mut events).await;
    assert_eq!(job.job_id, "explicit");
    assert_eq!(job.target, Target::from_hex("00ff").unwrap());

    client.shutdown().await;
    conn.drain().await;
}

#[tokio::test]
async fn notifications_during_handshake_are_kept() {
    let pool = MockPool::bind().await;
    let (client, _stats) = client(settings());
    let mut events = client.events();
    client.connect(&pool.endpoint(), credentials()).unwrap();

    let mut conn = pool.accept().await;
    conn.reply_subscribe().await;
    let authorize = conn.expect("mining.authorize").await;
    conn.set_difficulty(2.0).await;
    conn.notify("early", false).await;
    conn.reply(&authorize, json!(true), Value::Null).await;

    let job = next_job(&mut events).await;
    assert_eq!(job.job_id, "early");
    assert!(job.clean_jobs);
    assert_eq!(job.difficulty, 2.0);

    client.shutdown().await;
    conn.drain().await;
}

#[tokio::test]
async fn stale_share_is_still_submitted() {
    let pool = MockPool::bind().await;
    let (client, stats) = client(settings());
    let mut events = client.events();
    client.connect(&pool.endpoint(), credentials()).unwrap();

    let server = tokio::spawn(async move {
        let mut conn = pool.accept().await;
        conn.handshake().await;
        conn.notify("old", true).await;
        conn.notify("new", true).await;
        let submit = conn.expect("mining.submit").await;
        assert_eq!(submit["params"][1], "old");
        conn.reply(&submit, json!(true), Value::Null).await;
        conn.drain().await;
    });

    next_job(&mut events).await;
    next_job(&mut events).await;
    assert_eq!(client.submit_share(share("old", 1)).await, SubmitOutcome::Accepted);

    let totals = stats.get_stats();
    assert_eq!(totals.shares_stale, 1);
    assert_eq!(totals.shares_accepted, 1);

    client.shutdown().await;
    server.await.unwrap();
}

#[tokio::test]
async fn connect_twice_is_refused() {
    let pool = MockPool::bind().await;
    let (client, _stats) = client(settings());
    client.connect(&pool.endpoint(), credentials()).unwrap();
    assert!(client.connect(&pool.endpoint(), credentials()).is_err());

    let mut conn = pool.accept().await;
    conn.handshake().await;
    client.shutdown().await;
    conn.drain().await;
}
