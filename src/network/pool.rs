// src/network/pool.rs

//! Mining pool client implementation
//!
//! Runs one logical session with the pool as an explicit state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Subscribing -> Authorizing -> Ready
//!                     ^                                        |
//!                     +------------- Reconnecting <------------+
//! ```
//!
//! Any transport or protocol failure moves the session to `Reconnecting`,
//! which waits out an exponential backoff before connecting again. Jobs are
//! published on a `watch` channel (latest value only), and every other
//! change is broadcast as a [`PoolEvent`]. Shares are handed to the session
//! task through a command channel and answered through a oneshot.
//!
//! Every entry into `Ready` publishes exactly one clean job: the first
//! notification of the new session, or the previous job restarted under the
//! new extra-nonce when the pool has not sent one yet.
use crate::miner::job::{MiningJob, Share, SubmitOutcome};
use crate::network::backoff::Backoff;
use crate::network::codec::{
    Inbound, JobNotification, Outbound, RpcResponse, StratumCodec, WireCodec,
};
use crate::network::tracker::JobTracker;
use crate::network::transport::{Connection, PoolAddress};
use crate::stats::{ShareResult, StatsEvent, StatsReporter};
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// Time allowed for closing a connection
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the event broadcast; slow subscribers skip ahead
const EVENT_CAPACITY: usize = 256;

/// Pool session states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; initial and terminal state
    Disconnected,
    /// Opening the transport
    Connecting,
    /// Waiting for the subscription reply
    Subscribing,
    /// Waiting for the authorization reply
    Authorizing,
    /// Receiving jobs and submitting shares
    Ready,
    /// Waiting out the backoff delay
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Authorizing => "authorizing",
            ConnectionState::Ready => "ready",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Notifications published by the pool client
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// The session moved to a new state
    StateChanged(ConnectionState),
    /// A job was published to the engine
    NewJob(Arc<MiningJob>),
    /// The pool changed the session difficulty
    DifficultyChanged(f64),
    /// A share submission finished
    ShareResult {
        /// Job the share belonged to
        job_id: String,
        /// Final outcome after any retry
        outcome: SubmitOutcome,
    },
}

/// Validated pool client settings
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Limit on opening the transport
    pub connect_timeout: Duration,
    /// Limit on waiting for a subscribe or authorize reply
    pub request_timeout: Duration,
    /// Limit on waiting for a submit reply, and on waiting for `Ready`
    /// before retrying a failed submission
    pub submit_timeout: Duration,
    /// First reconnect delay
    pub backoff_min: Duration,
    /// Reconnect delay cap
    pub backoff_max: Duration,
    /// Ready time after which the reconnect delay resets
    pub stable_after: Duration,
    /// How long shares for a superseded job count as grace rather than expired
    pub stale_grace: Duration,
    /// Consecutive authorization rejections that end the session
    pub max_auth_failures: u32,
    /// Client identification sent on subscribe
    pub user_agent: String,
}

impl Default for PoolSettings {
    fn default() -> Self {
        PoolSettings {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            submit_timeout: Duration::from_secs(15),
            backoff_min: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            stable_after: Duration::from_secs(60),
            stale_grace: Duration::from_secs(5),
            max_auth_failures: 3,
            user_agent: format!("pool_miner-rs/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Worker login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Wallet address or pool username
    pub user: String,
    /// Worker password (often "x" if not required)
    pub password: String,
    /// Worker identifier appended to the user as `user.worker`
    pub worker_id: Option<String>,
}

impl Credentials {
    /// Login name sent to the pool
    pub fn login(&self) -> String {
        match self.worker_id.as_deref() {
            Some(worker) if !worker.is_empty() => format!("{}.{}", self.user, worker),
            _ => self.user.clone(),
        }
    }
}

enum Command {
    Submit {
        share: Share,
        reply: oneshot::Sender<SubmitOutcome>,
    },
}

/// State visible to both the client handle and the session task
struct ClientShared {
    settings: PoolSettings,
    codec: Arc<dyn WireCodec>,
    stats: StatsReporter,
    tracker: JobTracker,
    state: watch::Sender<ConnectionState>,
    jobs: watch::Sender<Option<Arc<MiningJob>>>,
    events: broadcast::Sender<PoolEvent>,
}

impl ClientShared {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            log::info!("Pool connection: {} -> {}", previous, state);
            self.stats.record(StatsEvent::ConnectionState(state));
            let _ = self.events.send(PoolEvent::StateChanged(state));
        }
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<Result<(), MinerError>>>,
}

/// Client for communicating with a mining pool
pub struct PoolClient {
    shared: Arc<ClientShared>,
    session: Mutex<Option<SessionHandle>>,
}

impl PoolClient {
    /// Creates a new PoolClient speaking Stratum JSON-RPC
    ///
    /// # Arguments
    /// * `settings` - Timeouts, backoff and stale-share policy
    /// * `algorithm` - Selected algorithm; fixes the nonce encoding
    /// * `stats` - Collector receiving share results and state changes
    pub fn new(settings: PoolSettings, algorithm: AlgorithmType, stats: StatsReporter) -> Self {
        Self::with_codec(settings, Arc::new(StratumCodec::new(algorithm)), stats)
    }

    /// Creates a client with a custom wire codec
    pub fn with_codec(
        settings: PoolSettings,
        codec: Arc<dyn WireCodec>,
        stats: StatsReporter,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (jobs, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        PoolClient {
            shared: Arc::new(ClientShared {
                tracker: JobTracker::new(settings.stale_grace),
                settings,
                codec,
                stats,
                state,
                jobs,
                events,
            }),
            session: Mutex::new(None),
        }
    }

    /// Subscribes to pool events
    pub fn events(&self) -> broadcast::Receiver<PoolEvent> {
        self.shared.events.subscribe()
    }

    /// Latest-value job stream
    pub fn jobs(&self) -> watch::Receiver<Option<Arc<MiningJob>>> {
        self.shared.jobs.subscribe()
    }

    /// Current session state
    pub fn state(&self) -> ConnectionState {
        self.shared.current_state()
    }

    /// Starts the session state machine
    ///
    /// Returns as soon as the session task is spawned; progress is reported
    /// through [`events`](Self::events) and [`state`](Self::state). Must be
    /// called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns `MinerError::Config` for an unusable endpoint and
    /// `MinerError::Task` if a session is already running.
    pub fn connect(&self, endpoint: &str, credentials: Credentials) -> Result<(), MinerError> {
        let address = PoolAddress::parse(endpoint)?;

        let mut session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let task_running = session
            .as_ref()
            .is_some_and(|s| s.task.as_ref().is_some_and(|t| !t.is_finished()));
        if task_running || self.state() != ConnectionState::Disconnected {
            return Err(MinerError::Task("Pool session already running".into()));
        }

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let settings = &self.shared.settings;

        let task = Session {
            shared: self.shared.clone(),
            address,
            credentials,
            commands: command_rx,
            shutdown: shutdown_rx,
            backoff: Backoff::new(
                settings.backoff_min,
                settings.backoff_max,
                settings.stable_after,
            ),
            next_id: 0,
            auth_failures: 0,
            difficulty: 1.0,
            extra_nonce: Vec::new(),
            force_clean: false,
            pending: HashMap::new(),
        };

        log::info!("Connecting to pool {}", endpoint);
        *session = Some(SessionHandle {
            commands,
            shutdown,
            task: Some(tokio::spawn(task.run())),
        });
        Ok(())
    }

    /// Submits a share and returns its final outcome
    ///
    /// Shares for superseded jobs are still submitted and counted as stale.
    /// A transient `Error` is retried once after waiting up to the submit
    /// timeout for the session to be `Ready` again; a second failure counts
    /// the share as lost.
    pub async fn submit_share(&self, share: Share) -> SubmitOutcome {
        let freshness = self.shared.tracker.classify(&share.job_id);
        if freshness.is_stale() {
            log::warn!(
                "Submitting stale share for job {} ({:?})",
                share.job_id,
                freshness
            );
            self.shared.stats.record(StatsEvent::StaleSubmitted);
        }

        let mut outcome = self.try_submit(&share).await;
        if let SubmitOutcome::Error(reason) = &outcome {
            log::warn!("Share submission failed ({}), retrying once", reason);
            outcome = if self.wait_ready(self.shared.settings.submit_timeout).await {
                self.try_submit(&share).await
            } else {
                SubmitOutcome::Error(format!("{}; pool not ready for retry", reason))
            };
        }

        let result = match &outcome {
            SubmitOutcome::Accepted => {
                log::info!("Share accepted (job {}, nonce {:#x})", share.job_id, share.nonce);
                ShareResult::Accepted
            }
            SubmitOutcome::Rejected(reason) => {
                log::warn!("Share rejected (job {}): {}", share.job_id, reason);
                ShareResult::Rejected
            }
            SubmitOutcome::Error(reason) => {
                log::error!("Share lost (job {}): {}", share.job_id, reason);
                ShareResult::Lost
            }
        };
        self.shared.stats.record(StatsEvent::Share {
            device: share.device_id.clone(),
            result,
        });
        let _ = self.shared.events.send(PoolEvent::ShareResult {
            job_id: share.job_id.clone(),
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn try_submit(&self, share: &Share) -> SubmitOutcome {
        if self.state() != ConnectionState::Ready {
            return SubmitOutcome::Error(format!("Pool connection is {}", self.state()));
        }

        let commands = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.commands.clone());
        let Some(commands) = commands else {
            return SubmitOutcome::Error("Not connected".into());
        };

        let (reply, reply_rx) = oneshot::channel();
        let command = Command::Submit {
            share: share.clone(),
            reply,
        };
        if commands.send(command).is_err() {
            return SubmitOutcome::Error("Pool session ended".into());
        }

        // The session answers on reply, on timeout, or drops the sender
        reply_rx
            .await
            .unwrap_or_else(|_| SubmitOutcome::Error("Connection lost before reply".into()))
    }

    async fn wait_ready(&self, limit: Duration) -> bool {
        let mut state = self.shared.state.subscribe();
        matches!(
            time::timeout(limit, state.wait_for(|s| *s == ConnectionState::Ready)).await,
            Ok(Ok(_))
        )
    }

    /// Stops the session and waits for it to finish
    ///
    /// Safe to call repeatedly.
    pub async fn shutdown(&self) {
        let task = {
            let mut session = self
                .session
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match session.as_mut() {
                Some(handle) => {
                    let _ = handle.shutdown.send(true);
                    handle.task.take()
                }
                None => None,
            }
        };

        if let Some(task) = task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("Pool session ended with error: {}", e),
                Err(e) => log::error!("Pool session task failed: {}", e),
            }
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Waits for the session to end on its own
    ///
    /// # Returns
    /// The session result: `Err(MinerError::AuthRejected)` when authorization
    /// was refused too many times in a row, `Ok(())` after a shutdown.
    pub async fn wait(&self) -> Result<(), MinerError> {
        let task = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
            .and_then(|s| s.task.take());

        match task {
            Some(task) => task.await?,
            None => Ok(()),
        }
    }
}

/// Why one connection attempt ended
enum SessionEnd {
    Shutdown,
    Fatal(MinerError),
    Retry {
        error: MinerError,
        ready_for: Option<Duration>,
    },
}

impl From<MinerError> for SessionEnd {
    fn from(error: MinerError) -> Self {
        SessionEnd::Retry {
            error,
            ready_for: None,
        }
    }
}

impl SessionEnd {
    fn with_ready_for(self, duration: Duration) -> Self {
        match self {
            SessionEnd::Retry { error, .. } => SessionEnd::Retry {
                error,
                ready_for: Some(duration),
            },
            other => other,
        }
    }
}

struct PendingSubmit {
    job_id: String,
    reply: oneshot::Sender<SubmitOutcome>,
    deadline: Instant,
}

/// The session task's private state
struct Session {
    shared: Arc<ClientShared>,
    address: PoolAddress,
    credentials: Credentials,
    commands: mpsc::UnboundedReceiver<Command>,
    shutdown: watch::Receiver<bool>,
    backoff: Backoff,
    next_id: u64,
    auth_failures: u32,
    /// Session difficulty used for jobs without an explicit target
    difficulty: f64,
    extra_nonce: Vec<u8>,
    /// The next published job must be clean
    force_clean: bool,
    pending: HashMap<u64, PendingSubmit>,
}

/// Resolves once shutdown is requested or the client is gone
async fn shutdown_signal(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

impl Session {
    async fn run(mut self) -> Result<(), MinerError> {
        let result = loop {
            if *self.shutdown.borrow() {
                break Ok(());
            }

            self.shared.set_state(ConnectionState::Connecting);
            match self.connect_once().await {
                SessionEnd::Shutdown => break Ok(()),
                SessionEnd::Fatal(e) => {
                    log::error!("Pool session stopped: {}", e);
                    break Err(e);
                }
                SessionEnd::Retry { error, ready_for } => {
                    self.shared.set_state(ConnectionState::Reconnecting);
                    self.fail_outstanding(&error.to_string());

                    if ready_for.is_some_and(|d| self.backoff.reset_if_stable(d)) {
                        log::debug!("Session was stable, reconnect delay reset");
                    }
                    let delay = self.backoff.next_delay();
                    log::warn!("Pool session lost: {}. Reconnecting in {:?}", error, delay);

                    tokio::select! {
                        _ = time::sleep(delay) => {}
                        _ = shutdown_signal(&mut self.shutdown) => break Ok(()),
                    }
                }
            }
        };

        self.fail_outstanding("Pool client shut down");
        self.shared.set_state(ConnectionState::Disconnected);
        result
    }

    async fn connect_once(&mut self) -> SessionEnd {
        let timeout = self.shared.settings.connect_timeout;
        let opened = tokio::select! {
            conn = Connection::open(&self.address, timeout) => conn,
            _ = shutdown_signal(&mut self.shutdown) => return SessionEnd::Shutdown,
        };
        let mut conn = match opened {
            Ok(conn) => conn,
            Err(e) => return e.into(),
        };

        let end = match self.establish(&mut conn).await {
            Ok(()) => {
                let ready_at = Instant::now();
                self.serve(&mut conn)
                    .await
                    .with_ready_for(ready_at.elapsed())
            }
            Err(end) => end,
        };
        conn.close(CLOSE_TIMEOUT).await;
        end
    }

    /// Subscribe and authorize, then enter `Ready`
    async fn establish(&mut self, conn: &mut Connection) -> Result<(), SessionEnd> {
        let codec = self.shared.codec.clone();
        // Notifications that arrive before Ready are replayed in order
        let mut early = Vec::new();

        self.shared.set_state(ConnectionState::Subscribing);
        let id = self.next_request_id();
        let subscribe = Outbound::Subscribe {
            id,
            user_agent: self.shared.settings.user_agent.clone(),
        };
        conn.write_frame(&codec.encode(&subscribe)?).await?;
        let response = self.await_response(conn, id, &mut early).await?;
        let subscription = codec.parse_subscription(&response)?;
        log::debug!(
            "Subscribed: extranonce1={}, extranonce2_size={}",
            hex::encode(&subscription.extra_nonce),
            subscription.extra_nonce2_size
        );

        self.shared.set_state(ConnectionState::Authorizing);
        let id = self.next_request_id();
        let authorize = Outbound::Authorize {
            id,
            user: self.credentials.login(),
            password: self.credentials.password.clone(),
        };
        conn.write_frame(&codec.encode(&authorize)?).await?;
        let response = self.await_response(conn, id, &mut early).await?;
        if let Err(reason) = codec.parse_authorization(&response) {
            self.auth_failures += 1;
            let error = MinerError::AuthRejected(format!(
                "{} ({} of {} attempts)",
                reason, self.auth_failures, self.shared.settings.max_auth_failures
            ));
            return Err(if self.auth_failures >= self.shared.settings.max_auth_failures {
                SessionEnd::Fatal(error)
            } else {
                SessionEnd::Retry {
                    error,
                    ready_for: None,
                }
            });
        }
        self.auth_failures = 0;

        self.extra_nonce = subscription.extra_nonce;
        self.force_clean = true;
        self.shared.set_state(ConnectionState::Ready);

        for message in early {
            self.handle_notification(message);
        }
        if self.force_clean {
            self.restart_previous_job();
        }
        Ok(())
    }

    /// Republishes the last job as clean under the new extra-nonce
    ///
    /// Work for the old session is useless once the extra-nonce changes, so
    /// the engine restarts on this copy until the pool sends a real job.
    fn restart_previous_job(&mut self) {
        let previous = self.shared.jobs.borrow().clone();
        let Some(previous) = previous else {
            return;
        };
        self.force_clean = false;

        let mut job = previous.with_clean_jobs(true);
        job.extra_nonce = self.extra_nonce.clone();
        job.received_at = std::time::Instant::now();
        log::debug!("Restarting job {} after reconnect", job.job_id);
        self.publish(job);
    }

    /// Reads frames until the reply to request `id` arrives
    async fn await_response(
        &mut self,
        conn: &mut Connection,
        id: u64,
        early: &mut Vec<Inbound>,
    ) -> Result<RpcResponse, SessionEnd> {
        let deadline = Instant::now() + self.shared.settings.request_timeout;

        loop {
            let frame = tokio::select! {
                frame = conn.read_frame() => frame?,
                _ = time::sleep_until(deadline) => {
                    return Err(MinerError::Transport(format!("No reply to request {}", id)).into());
                }
                _ = shutdown_signal(&mut self.shutdown) => return Err(SessionEnd::Shutdown),
            };
            let Some(frame) = frame else {
                return Err(MinerError::Transport("Pool closed the connection".into()).into());
            };

            match self.shared.codec.decode(&frame)? {
                Inbound::Response(response) if response.id == id => return Ok(response),
                Inbound::Response(response) => {
                    log::debug!("Ignoring reply to unknown request {}", response.id);
                }
                Inbound::Reconnect => {
                    return Err(MinerError::Transport("Pool requested reconnect".into()).into());
                }
                message @ (Inbound::Notify(_) | Inbound::SetDifficulty(_)) => early.push(message),
                Inbound::Unknown(method) => log::debug!("Ignoring pool method {}", method),
            }
        }
    }

    /// Steady state: jobs in, shares out
    async fn serve(&mut self, conn: &mut Connection) -> SessionEnd {
        match self.serve_inner(conn).await {
            Ok(end) | Err(end) => end,
        }
    }

    async fn serve_inner(&mut self, conn: &mut Connection) -> Result<SessionEnd, SessionEnd> {
        let codec = self.shared.codec.clone();

        loop {
            let next_deadline = self.pending.values().map(|p| p.deadline).min();

            tokio::select! {
                frame = conn.read_frame() => {
                    let Some(frame) = frame? else {
                        return Err(MinerError::Transport("Pool closed the connection".into()).into());
                    };
                    match codec.decode(&frame)? {
                        Inbound::Response(response) => self.resolve(response),
                        Inbound::Reconnect => {
                            return Err(MinerError::Transport("Pool requested reconnect".into()).into());
                        }
                        Inbound::Unknown(method) => log::debug!("Ignoring pool method {}", method),
                        message => self.handle_notification(message),
                    }
                }
                command = self.commands.recv() => {
                    let Some(Command::Submit { share, reply }) = command else {
                        return Ok(SessionEnd::Shutdown);
                    };
                    let id = self.next_request_id();
                    let submit = Outbound::Submit {
                        id,
                        user: self.credentials.login(),
                        job_id: share.job_id.clone(),
                        nonce: share.nonce,
                        digest: share.digest,
                    };
                    let deadline = Instant::now() + self.shared.settings.submit_timeout;
                    self.pending.insert(id, PendingSubmit { job_id: share.job_id, reply, deadline });
                    conn.write_frame(&codec.encode(&submit)?).await?;
                }
                _ = time::sleep_until(next_deadline.unwrap_or_else(Instant::now)), if next_deadline.is_some() => {
                    return Err(MinerError::Submission("Share submission timed out".into()).into());
                }
                _ = shutdown_signal(&mut self.shutdown) => return Ok(SessionEnd::Shutdown),
            }
        }
    }

    fn resolve(&mut self, response: RpcResponse) {
        match self.pending.remove(&response.id) {
            Some(pending) => {
                let outcome = self.shared.codec.parse_submission(&response);
                log::debug!("Submit reply for job {}: {:?}", pending.job_id, outcome);
                let _ = pending.reply.send(outcome);
            }
            None => log::debug!("Ignoring reply to unknown request {}", response.id),
        }
    }

    fn handle_notification(&mut self, message: Inbound) {
        match message {
            Inbound::Notify(notification) => self.publish_job(notification),
            Inbound::SetDifficulty(difficulty) => {
                log::info!("Pool difficulty set to {}", difficulty);
                self.difficulty = difficulty;
                let _ = self
                    .shared
                    .events
                    .send(PoolEvent::DifficultyChanged(difficulty));
            }
            other => log::debug!("Unexpected message {:?}", other),
        }
    }

    fn publish_job(&mut self, notification: JobNotification) {
        // The first job after (re)entering Ready discards all earlier work
        let clean_jobs = notification.clean_jobs || self.force_clean;
        self.force_clean = false;

        let mut job = MiningJob::new(
            notification.job_id,
            notification.header,
            self.extra_nonce.clone(),
            self.difficulty,
            clean_jobs,
        );
        if let Some(target) = notification.target {
            job = job.with_target(target);
        }
        self.publish(job);
    }

    fn publish(&self, job: MiningJob) {
        let job = Arc::new(job);
        log::debug!("New job {} (clean: {})", job.job_id, job.clean_jobs);
        self.shared.tracker.set_current(&job.job_id);
        self.shared.jobs.send_replace(Some(job.clone()));
        let _ = self.shared.events.send(PoolEvent::NewJob(job));
    }

    /// Answers every in-flight and queued submission with `Error`
    fn fail_outstanding(&mut self, reason: &str) {
        for (_, pending) in self.pending.drain() {
            let _ = pending.reply.send(SubmitOutcome::Error(reason.to_string()));
        }
        while let Ok(Command::Submit { reply, .. }) = self.commands.try_recv() {
            let _ = reply.send(SubmitOutcome::Error(reason.to_string()));
        }
    }

    fn next_request_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_includes_worker() {
        let mut creds = Credentials {
            user: "wallet".into(),
            password: "x".into(),
            worker_id: Some("rig1".into()),
        };
        assert_eq!(creds.login(), "wallet.rig1");
        creds.worker_id = Some(String::new());
        assert_eq!(creds.login(), "wallet");
        creds.worker_id = None;
        assert_eq!(creds.login(), "wallet");
    }

    #[tokio::test]
    async fn submit_without_session_is_lost() {
        let stats = StatsReporter::new(Duration::from_secs(60));
        let settings = PoolSettings {
            submit_timeout: Duration::from_millis(20),
            ..PoolSettings::default()
        };
        let client = PoolClient::new(settings, AlgorithmType::Sha256d, stats.clone());

        let share = Share {
            job_id: "j".into(),
            nonce: 1,
            digest: [0; 32],
            device_id: "cpu0".into(),
            found_at: std::time::SystemTime::now(),
        };
        assert!(matches!(client.submit_share(share).await, SubmitOutcome::Error(_)));
        assert_eq!(stats.get_stats().shares_lost, 1);
        assert_eq!(stats.get_stats().shares_stale, 1);

        client.shutdown().await;
        client.shutdown().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn bad_endpoint_is_a_config_error() {
        let client = PoolClient::new(
            PoolSettings::default(),
            AlgorithmType::Sha256d,
            StatsReporter::new(Duration::from_secs(60)),
        );
        let creds = Credentials {
            user: "u".into(),
            password: "x".into(),
            worker_id: None,
        };
        assert!(matches!(
            client.connect("http://example.com:80", creds),
            Err(MinerError::Config(_))
        ));
    }
}
