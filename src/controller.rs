// src/controller.rs
//! Mining controller
//!
//! Wires the mining engine, the pool client and the stats collector into one
//! running miner. Two bridges connect the halves:
//!
//! - the job bridge forwards every job the pool client publishes to
//!   [`Scheduler::submit_job`];
//! - the share pump drains the engine's share channel on a dedicated thread
//!   and submits each share through the pool client, one device's shares
//!   strictly in the order they were found.
//!
//! Front ends (the CLI here, a GUI elsewhere) only ever talk to the
//! controller: [`run`](MiningController::run), [`stop`](MiningController::stop)
//! and [`snapshot`](MiningController::snapshot).

use crate::config::Config;
use crate::device::{ComputeDevice, Device, DeviceId, detect_cpu_devices};
use crate::miner::algorithm;
use crate::miner::job::{Share, SubmitOutcome};
use crate::miner::scheduler::{Scheduler, StartReport};
use crate::network::pool::{ConnectionState, PoolClient, PoolEvent};
use crate::stats::{MiningStats, ReportingHandle, StatsReporter};
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use crossbeam_channel::RecvTimeoutError;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, mpsc, watch};

/// Number of share outcomes kept for [`Snapshot::recent_shares`]
pub const RECENT_SHARES: usize = 50;

/// How often the share pump checks for shutdown while idle
const PUMP_POLL: Duration = Duration::from_millis(100);

/// One submitted share and what happened to it
#[derive(Debug, Clone, PartialEq)]
pub struct ShareRecord {
    /// Job the share was found against
    pub job_id: String,
    /// Winning nonce
    pub nonce: u64,
    /// Device that found it
    pub device: DeviceId,
    /// Final submission outcome
    pub outcome: SubmitOutcome,
    /// When the device found it
    pub found_at: SystemTime,
}

/// Point-in-time view of the whole miner
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Pool session state
    pub connection: ConnectionState,
    /// Per-device status, hashrate and last error
    pub devices: Vec<Device>,
    /// Newest-first submitted shares, at most [`RECENT_SHARES`]
    pub recent_shares: Vec<ShareRecord>,
    /// Aggregate counters and hashrate history
    pub stats: MiningStats,
}

/// Runs the engine and the pool client together
pub struct MiningController {
    config: Config,
    algorithm: AlgorithmType,
    stats: StatsReporter,
    scheduler: Arc<Scheduler>,
    pool: Arc<PoolClient>,
    devices: Mutex<Option<Vec<Box<dyn ComputeDevice>>>>,
    recent: Arc<Mutex<VecDeque<ShareRecord>>>,
    stopping: watch::Sender<bool>,
    stopped: AtomicBool,
    /// Set once the first `stop` call has finished
    stop_done: watch::Sender<bool>,
    pump_running: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
    reporting: Mutex<Option<ReportingHandle>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MiningController {
    /// Creates a controller mining on the configured CPU device groups
    ///
    /// # Errors
    /// Returns `MinerError::Config` if the configuration does not validate.
    pub fn new(config: Config) -> Result<Self, MinerError> {
        let devices = detect_cpu_devices(&config.device_specs())
            .into_iter()
            .map(|d| Box::new(d) as Box<dyn ComputeDevice>)
            .collect();
        Self::with_devices(config, devices)
    }

    /// Creates a controller over an explicit device list
    ///
    /// # Errors
    /// Returns `MinerError::Config` if the configuration does not validate.
    pub fn with_devices(
        config: Config,
        devices: Vec<Box<dyn ComputeDevice>>,
    ) -> Result<Self, MinerError> {
        config.validate()?;
        let algorithm = config.algorithm_type()?;
        let stats = StatsReporter::new(config.stats_interval());
        let scheduler = Scheduler::new(config.engine_settings(), stats.clone());
        let pool = PoolClient::new(config.pool_settings(), algorithm, stats.clone());
        let (stopping, _) = watch::channel(false);
        let (stop_done, _) = watch::channel(false);

        Ok(MiningController {
            config,
            algorithm,
            stats,
            scheduler: Arc::new(scheduler),
            pool: Arc::new(pool),
            devices: Mutex::new(Some(devices)),
            recent: Arc::new(Mutex::new(VecDeque::with_capacity(RECENT_SHARES))),
            stopping,
            stopped: AtomicBool::new(false),
            stop_done,
            pump_running: Arc::new(AtomicBool::new(false)),
            pump: Mutex::new(None),
            reporting: Mutex::new(None),
        })
    }

    /// Starts the engine, both bridges and the pool session
    ///
    /// Must be called from within a tokio runtime. Returns once every
    /// device has been prepared; the pool connects in the background.
    ///
    /// # Errors
    /// Returns an error if the controller was already started, no device
    /// could be prepared, or the pool endpoint is unusable.
    pub fn start(&self) -> Result<StartReport, MinerError> {
        let devices = lock(&self.devices)
            .take()
            .ok_or_else(|| MinerError::Task("Controller already started".into()))?;

        log::info!(
            "Starting {} miner with {} device(s)",
            self.algorithm,
            devices.len()
        );
        let report = self
            .scheduler
            .start(devices, algorithm::create(self.algorithm))?;
        for failure in &report.failed {
            log::error!("{}", failure);
        }

        self.spawn_job_bridge();
        self.spawn_share_pump()?;
        self.pool
            .connect(&self.config.pool.url, self.config.credentials())?;
        *lock(&self.reporting) = Some(self.stats.start_reporting());

        Ok(report)
    }

    /// Starts mining and runs until stopped or a fatal pool error
    ///
    /// # Returns
    /// `Ok(())` after [`stop`](Self::stop), or the fatal error
    /// (`AuthRejected`) that ended the pool session.
    pub async fn run(&self) -> Result<(), MinerError> {
        if let Err(e) = self.start() {
            self.stop().await;
            return Err(e);
        }
        let result = self.pool.wait().await;
        if let Err(e) = &result {
            log::error!("Pool session ended: {}", e);
        }
        self.stop().await;
        result
    }

    /// Stops the pool session, the engine and both bridges
    ///
    /// Safe to call repeatedly and concurrently; every call returns only
    /// after the first one has finished tearing everything down.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            let mut done = self.stop_done.subscribe();
            let _ = done.wait_for(|done| *done).await;
            return;
        }
        log::info!("Stopping miner");

        let _ = self.stopping.send(true);
        self.pool.shutdown().await;

        let scheduler = self.scheduler.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || scheduler.stop()).await {
            log::error!("Engine stop failed: {}", e);
        }

        self.pump_running.store(false, Ordering::Release);
        let pump = lock(&self.pump).take();
        if let Some(pump) = pump {
            if let Err(e) = tokio::task::spawn_blocking(move || pump.join()).await {
                log::error!("Share pump join failed: {}", e);
            }
        }

        let reporting = lock(&self.reporting).take();
        if let Some(reporting) = reporting {
            reporting.stop();
        }
        self.stop_done.send_replace(true);
        log::info!("Miner stopped");
    }

    /// Point-in-time view for front ends
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            connection: self.pool.state(),
            devices: self.scheduler.device_status(),
            recent_shares: lock(&self.recent).iter().cloned().collect(),
            stats: self.stats.get_stats(),
        }
    }

    /// Stats collector shared by the engine and pool client
    pub fn stats(&self) -> &StatsReporter {
        &self.stats
    }

    /// Subscribes to pool events
    pub fn events(&self) -> broadcast::Receiver<PoolEvent> {
        self.pool.events()
    }

    fn spawn_job_bridge(&self) {
        let mut events = self.pool.events();
        let jobs = self.pool.jobs();
        let scheduler = self.scheduler.clone();
        let mut stopping = self.stopping.subscribe();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    event = events.recv() => event,
                    _ = async { let _ = stopping.wait_for(|s| *s).await; } => break,
                };
                match event {
                    Ok(PoolEvent::NewJob(job)) => scheduler.submit_job(job),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // A missed job may have been clean; restart on the latest
                        log::warn!("Job bridge skipped {} pool events", missed);
                        let latest = jobs.borrow().clone();
                        if let Some(job) = latest {
                            scheduler.submit_job(Arc::new(job.with_clean_jobs(true)));
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            log::debug!("Job bridge stopped");
        });
    }

    fn spawn_share_pump(&self) -> Result<(), MinerError> {
        let shares = self.scheduler.shares();
        let running = self.pump_running.clone();
        let (tx, mut rx) = mpsc::unbounded_channel::<Share>();
        running.store(true, Ordering::Release);

        let pump = std::thread::Builder::new()
            .name("share-pump".into())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    match shares.recv_timeout(PUMP_POLL) {
                        Ok(share) => {
                            if tx.send(share).is_err() {
                                break;
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| MinerError::Task(format!("Failed to spawn share pump: {}", e)))?;
        *lock(&self.pump) = Some(pump);

        let pool = self.pool.clone();
        let recent = self.recent.clone();
        tokio::spawn(async move {
            // Devices submit independently of each other
            let mut lanes: HashMap<DeviceId, mpsc::UnboundedSender<Share>> = HashMap::new();
            while let Some(share) = rx.recv().await {
                let lane = lanes
                    .entry(share.device_id.clone())
                    .or_insert_with(|| spawn_submit_lane(pool.clone(), recent.clone()));
                if lane.send(share).is_err() {
                    log::error!("Share submission lane closed");
                }
            }
        });
        Ok(())
    }
}

/// Submits one device's shares one after another
fn spawn_submit_lane(
    pool: Arc<PoolClient>,
    recent: Arc<Mutex<VecDeque<ShareRecord>>>,
) -> mpsc::UnboundedSender<Share> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Share>();
    tokio::spawn(async move {
        while let Some(share) = rx.recv().await {
            let record = ShareRecord {
                job_id: share.job_id.clone(),
                nonce: share.nonce,
                device: share.device_id.clone(),
                found_at: share.found_at,
                outcome: pool.submit_share(share).await,
            };
            let mut recent = lock(&recent);
            if recent.len() == RECENT_SHARES {
                recent.pop_back();
            }
            recent.push_front(record);
        }
    });
    tx
}
