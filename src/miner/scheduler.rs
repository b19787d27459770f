// src/miner/scheduler.rs
//! Mining job scheduler implementation
//!
//! The scheduler is the mining engine: it owns one worker thread per device,
//! publishes the latest job through a lock-free slot, and collects shares on
//! a channel.
//!
//! Job replacement is epoch based. Every published job gets a new epoch and
//! a fresh nonce cursor. A clean job also raises `clean_epoch`; workers
//! abandon any sub-range whose epoch is older. Shares are emitted under a
//! read lock and jobs are published under the write lock, so once
//! `submit_job` returns for a clean job no share for an earlier job can enter
//! the channel.

use crate::device::{ComputeDevice, Device, DeviceId, DeviceInitError, DeviceState, DeviceStatus};
use crate::miner::algorithm::Algorithm;
use crate::miner::job::{MiningJob, Share};
use crate::miner::nonce::{ClaimedRange, NonceCursor, RangeLog};
use crate::miner::worker::{Readiness, Worker};
use crate::stats::StatsReporter;
use crate::utils::error::MinerError;
use arc_swap::ArcSwapOption;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::JoinHandle;

/// Tuning knobs for the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Nonces claimed by a worker at a time
    pub batch_size: u64,
    /// Digests computed between stop and job-replacement checks
    pub hash_chunk: u64,
    /// Keep a log of every claimed range
    pub record_ranges: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            batch_size: 65_536,
            hash_chunk: 1024,
            record_ranges: false,
        }
    }
}

/// Outcome of [`Scheduler::start`]
#[derive(Debug, Default)]
pub struct StartReport {
    /// Devices with a running worker
    pub started: Vec<DeviceId>,
    /// Devices that could not be prepared, now Errored
    pub failed: Vec<DeviceInitError>,
    /// Devices skipped because they are disabled
    pub disabled: Vec<DeviceId>,
}

/// The published job together with its search state
pub(crate) struct JobSlot {
    pub(crate) job: Arc<MiningJob>,
    pub(crate) preimage: Vec<u8>,
    pub(crate) epoch: u64,
    pub(crate) cursor: NonceCursor,
}

/// State shared between the scheduler and its workers
pub(crate) struct EngineShared {
    pub(crate) settings: EngineSettings,
    pub(crate) stats: StatsReporter,
    pub(crate) slot: ArcSwapOption<JobSlot>,
    pub(crate) clean_epoch: AtomicU64,
    next_epoch: AtomicU64,
    nonce_space: AtomicU64,
    pub(crate) emission: RwLock<()>,
    running: AtomicBool,
    pub(crate) share_tx: Sender<Share>,
    pub(crate) ranges: Option<RangeLog>,
}

impl EngineShared {
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Publishes `job` under the emission write lock
    fn publish(&self, job: Arc<MiningJob>) -> u64 {
        let _emission = self.emission.write().unwrap_or_else(PoisonError::into_inner);
        let epoch = self.next_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let clean = job.clean_jobs;

        self.slot.store(Some(Arc::new(JobSlot {
            preimage: job.preimage(),
            job,
            epoch,
            cursor: NonceCursor::new(self.nonce_space.load(Ordering::Acquire)),
        })));
        if clean {
            self.clean_epoch.store(epoch, Ordering::Release);
        }
        epoch
    }
}

struct WorkerHandle {
    device: DeviceId,
    thread: JoinHandle<()>,
}

/// Coordinates mining jobs across device workers
pub struct Scheduler {
    shared: Arc<EngineShared>,
    share_rx: Receiver<Share>,
    workers: Mutex<Vec<WorkerHandle>>,
    states: Mutex<Vec<Arc<DeviceState>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scheduler {
    /// Creates a new, stopped Scheduler
    ///
    /// # Arguments
    /// * `settings` - Sub-range and batch sizes
    /// * `stats` - Collector receiving hash counts and hashrate samples
    pub fn new(settings: EngineSettings, stats: StatsReporter) -> Self {
        let (share_tx, share_rx) = crossbeam_channel::unbounded();
        let ranges = settings.record_ranges.then(RangeLog::default);

        Scheduler {
            shared: Arc::new(EngineShared {
                settings,
                stats,
                slot: ArcSwapOption::empty(),
                clean_epoch: AtomicU64::new(0),
                next_epoch: AtomicU64::new(0),
                nonce_space: AtomicU64::new(u64::MAX),
                emission: RwLock::new(()),
                running: AtomicBool::new(false),
                share_tx,
                ranges,
            }),
            share_rx,
            workers: Mutex::new(Vec::new()),
            states: Mutex::new(Vec::new()),
        }
    }

    /// Spawns one worker per enabled device
    ///
    /// Returns once every worker has finished preparing its device. Devices
    /// that fail to prepare are reported Errored and the rest keep running.
    ///
    /// # Errors
    /// Returns an error if the engine is already running, or if no device at
    /// all could be started.
    pub fn start(
        &self,
        devices: Vec<Box<dyn ComputeDevice>>,
        algorithm: Arc<dyn Algorithm>,
    ) -> Result<StartReport, MinerError> {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(MinerError::Task("Engine is already running".into()));
        }

        self.shared
            .nonce_space
            .store(algorithm.nonce_space(), Ordering::Release);
        // Re-publish a job left over from a previous run against the new space
        if let Some(slot) = self.shared.slot.load_full() {
            self.shared.publish(slot.job.clone());
        }

        let (ready_tx, ready_rx) = crossbeam_channel::unbounded::<Readiness>();
        let mut report = StartReport::default();
        let mut states = Vec::with_capacity(devices.len());
        let mut handles = Vec::with_capacity(devices.len());

        for device in devices {
            let id = device.id().clone();
            let state = Arc::new(DeviceState::new(
                id.clone(),
                device.name().to_string(),
                device.kind(),
                DeviceStatus::Idle,
            ));
            states.push(state.clone());

            if !device.enabled() {
                log::info!("{}: disabled, no worker started", id);
                state.set_status(DeviceStatus::Disabled);
                report.disabled.push(id);
                continue;
            }

            let worker = Worker::new(device, algorithm.clone(), self.shared.clone(), state.clone());
            let ready = ready_tx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("miner-{}", id))
                .spawn(move || worker.run(ready));

            match spawned {
                Ok(thread) => handles.push(WorkerHandle { device: id, thread }),
                Err(e) => {
                    let reason = format!("Failed to spawn worker thread: {}", e);
                    state.fail(reason.clone());
                    report.failed.push(DeviceInitError { device: id, reason });
                }
            }
        }
        drop(ready_tx);

        // Every spawned worker reports exactly once, then drops its sender
        for (id, result) in ready_rx.iter() {
            match result {
                Ok(()) => report.started.push(id),
                Err(e) => report.failed.push(e),
            }
        }

        *lock(&self.states) = states;
        *lock(&self.workers) = handles;

        if report.started.is_empty() {
            self.stop();
            return Err(match report.failed.into_iter().next() {
                Some(e) => MinerError::DeviceInit(e),
                None => MinerError::Config("No enabled devices".into()),
            });
        }

        log::info!(
            "Mining engine started: {} running, {} failed, {} disabled",
            report.started.len(),
            report.failed.len(),
            report.disabled.len()
        );
        self.wake_workers();
        Ok(report)
    }

    /// Replaces the current job
    ///
    /// Never waits for workers. A clean job makes workers drop their current
    /// sub-range at the next batch boundary; otherwise they finish it first.
    ///
    /// # Arguments
    /// * `job` - The new job to mine
    pub fn submit_job(&self, job: Arc<MiningJob>) {
        let job_id = job.job_id.clone();
        let clean = job.clean_jobs;
        let epoch = self.shared.publish(job);

        log::debug!("Published job {} (epoch {}, clean: {})", job_id, epoch, clean);
        self.wake_workers();
    }

    /// Stream of found shares
    ///
    /// The receiver stays valid for the engine's whole lifetime, across
    /// stop and restart.
    pub fn shares(&self) -> Receiver<Share> {
        self.share_rx.clone()
    }

    /// Drains every share found so far without blocking
    pub fn poll_shares(&self) -> Vec<Share> {
        self.share_rx.try_iter().collect()
    }

    /// Status snapshot of every device from the last start
    pub fn device_status(&self) -> Vec<Device> {
        lock(&self.states).iter().map(|s| s.snapshot()).collect()
    }

    /// Every claim so far in claim order, when range recording is on
    pub fn assigned_ranges(&self) -> Vec<ClaimedRange> {
        self.shared
            .ranges
            .as_ref()
            .map(RangeLog::entries)
            .unwrap_or_default()
    }

    /// Whether workers are running
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Stops all mining workers and waits for them
    ///
    /// Safe to call repeatedly; later calls are no-ops.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        let handles = std::mem::take(&mut *lock(&self.workers));
        if handles.is_empty() {
            return;
        }

        for handle in &handles {
            handle.thread.thread().unpark();
        }
        for handle in handles {
            if handle.thread.join().is_err() {
                log::error!("{}: worker thread panicked", handle.device);
            }
        }
        log::info!("Mining engine stopped");
    }

    fn wake_workers(&self) {
        for handle in lock(&self.workers).iter() {
            handle.thread.thread().unpark();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
