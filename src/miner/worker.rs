// src/miner/worker.rs
//! Worker thread implementation
//!
//! One worker drives one device. It claims nonce sub-ranges for the latest
//! job, splits each into small digest batches, and checks for stop and clean
//! job replacement between batches. Found shares go back through the
//! scheduler's share channel.

use crate::device::{
    BatchWork, ComputeDevice, DeviceFault, DeviceId, DeviceInitError, DeviceState, DeviceStatus,
};
use crate::miner::algorithm::Algorithm;
use crate::miner::job::{Digest, Share};
use crate::miner::scheduler::{EngineShared, JobSlot};
use crate::stats::StatsEvent;
use crossbeam_channel::Sender;
use std::ops::Range;
use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant, SystemTime};

/// How long an idle worker sleeps before re-checking for work
const IDLE_PARK: Duration = Duration::from_millis(50);

/// Minimum spacing of hashrate samples sent to the stats collector
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Weight of the newest measurement in the rolling hash rate
const RATE_SMOOTHING: f64 = 0.2;

/// Readiness report sent once `prepare` has finished
pub(crate) type Readiness = (DeviceId, Result<(), DeviceInitError>);

/// Worker thread that performs mining computations for one device
///
/// Dropping the worker tears the device down, so teardown happens exactly
/// once whichever way the thread exits.
pub(crate) struct Worker {
    device: Box<dyn ComputeDevice>,
    algorithm: Arc<dyn Algorithm>,
    shared: Arc<EngineShared>,
    state: Arc<DeviceState>,
    /// Rolling hash rate estimate
    hashrate: f64,
    last_sample: Instant,
    /// Epoch of the job whose space was last reported exhausted
    exhausted_epoch: Option<u64>,
}

impl Worker {
    /// Creates a new Worker instance
    ///
    /// # Arguments
    /// * `device` - The device this worker owns
    /// * `algorithm` - The mining algorithm to use
    /// * `shared` - Engine state shared with the scheduler
    /// * `state` - Status cell this worker publishes to
    pub(crate) fn new(
        device: Box<dyn ComputeDevice>,
        algorithm: Arc<dyn Algorithm>,
        shared: Arc<EngineShared>,
        state: Arc<DeviceState>,
    ) -> Self {
        Worker {
            device,
            algorithm,
            shared,
            state,
            hashrate: 0.0,
            last_sample: Instant::now(),
            exhausted_epoch: None,
        }
    }

    /// Thread body: prepare, report readiness, then mine until stopped
    pub(crate) fn run(mut self, ready: Sender<Readiness>) {
        let id = self.device.id().clone();

        if let Err(e) = self.device.prepare(self.algorithm.as_ref()) {
            log::error!("{}", e);
            self.state.fail(e.reason.clone());
            let _ = ready.send((id, Err(e)));
            return;
        }

        self.state.set_status(DeviceStatus::Idle);
        let _ = ready.send((id.clone(), Ok(())));
        drop(ready);
        log::info!("{}: worker started ({})", id, self.algorithm.name());

        match self.mine() {
            Ok(()) => {
                self.state.set_status(DeviceStatus::Idle);
                log::info!("{}: worker stopped", id);
            }
            Err(fault) => {
                log::error!("{}", fault);
                self.state.fail(fault.reason);
            }
        }
    }

    fn mine(&mut self) -> Result<(), DeviceFault> {
        while self.shared.is_running() {
            let Some(slot) = self.shared.slot.load_full() else {
                self.idle();
                continue;
            };

            let Some(range) = slot.cursor.claim(self.shared.settings.batch_size) else {
                if self.exhausted_epoch != Some(slot.epoch) {
                    log::info!(
                        "{}: nonce space exhausted for job {}, waiting for new work",
                        self.device.id(),
                        slot.job.job_id
                    );
                    self.exhausted_epoch = Some(slot.epoch);
                }
                self.idle();
                continue;
            };

            // A job published since the load wins; the claim is dropped unhashed
            if self.replaced(&slot) {
                continue;
            }
            if let Some(ranges) = &self.shared.ranges {
                ranges.record(self.device.id(), &slot.job.job_id, range.clone());
            }

            self.state.set_status(DeviceStatus::Working);
            self.search(&slot, range)?;
        }
        Ok(())
    }

    /// Hashes one claimed sub-range in `hash_chunk` sized batches
    fn search(&mut self, slot: &JobSlot, range: Range<u64>) -> Result<(), DeviceFault> {
        let chunk = self.shared.settings.hash_chunk.max(1);
        let mut start = range.start;

        while start < range.end {
            if !self.shared.is_running() || self.superseded(slot) {
                return Ok(());
            }

            let end = start.saturating_add(chunk).min(range.end);
            let started = Instant::now();
            let result = self.device.run_batch(&BatchWork {
                algorithm: self.algorithm.as_ref(),
                preimage: &slot.preimage,
                target: &slot.job.target,
                nonces: start..end,
            })?;

            self.emit(slot, result.hits);
            self.account(result.hashes, started.elapsed());
            start = end;
        }
        Ok(())
    }

    /// Any job published after this slot
    fn replaced(&self, slot: &JobSlot) -> bool {
        let current = self.shared.slot.load();
        (*current).as_ref().map(|current| current.epoch) != Some(slot.epoch)
    }

    /// A clean job published after this slot invalidates it
    fn superseded(&self, slot: &JobSlot) -> bool {
        self.shared.clean_epoch.load(Ordering::Acquire) > slot.epoch
    }

    fn emit(&self, slot: &JobSlot, hits: Vec<(u64, Digest)>) {
        if hits.is_empty() {
            return;
        }

        let _emission = self
            .shared
            .emission
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if self.superseded(slot) {
            log::debug!(
                "{}: dropping {} hits for replaced job {}",
                self.device.id(),
                hits.len(),
                slot.job.job_id
            );
            return;
        }

        for (nonce, digest) in hits {
            log::info!(
                "{}: share found for job {} (nonce {:#x})",
                self.device.id(),
                slot.job.job_id,
                nonce
            );
            let share = Share {
                job_id: slot.job.job_id.clone(),
                nonce,
                digest,
                device_id: self.device.id().clone(),
                found_at: SystemTime::now(),
            };
            if self.shared.share_tx.send(share).is_err() {
                log::warn!("Share receiver dropped");
            }
        }
    }

    fn account(&mut self, hashes: u64, elapsed: Duration) {
        self.state.add_hashes(hashes);
        self.shared.stats.record(StatsEvent::Hashes(hashes));

        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            let instant = hashes as f64 / secs;
            self.hashrate = if self.hashrate == 0.0 {
                instant
            } else {
                RATE_SMOOTHING * instant + (1.0 - RATE_SMOOTHING) * self.hashrate
            };
            self.state.set_hashrate(self.hashrate);
        }

        if self.last_sample.elapsed() >= SAMPLE_INTERVAL {
            self.last_sample = Instant::now();
            self.shared.stats.record(StatsEvent::HashrateSample {
                device: self.device.id().clone(),
                hashes_per_sec: self.hashrate,
            });
        }
    }

    fn idle(&mut self) {
        if self.state.status() == DeviceStatus::Working {
            self.state.set_status(DeviceStatus::Idle);
        }
        std::thread::park_timeout(IDLE_PARK);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.device.teardown();
    }
}
