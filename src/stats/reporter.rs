// src/stats/reporter.rs
use crate::device::DeviceId;
use crate::network::ConnectionState;
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};
use sysinfo::{Components, System};

/// Number of hashrate samples kept for charts
pub const HISTORY_CAPACITY: usize = 1000;

/// Statistics related to mining performance
#[derive(Debug, Clone)]
pub struct MiningStats {
    /// Total number of hashes computed
    pub hashes_total: u64,
    /// Number of shares accepted by the pool
    pub shares_accepted: u64,
    /// Number of shares rejected by the pool
    pub shares_rejected: u64,
    /// Shares dropped after a failed retry
    pub shares_lost: u64,
    /// Shares submitted against a superseded job
    pub shares_stale: u64,
    /// Lifetime average hashrate (hashes per second)
    pub avg_hashrate: f64,
    /// Sum of the latest per-device estimates (hashes per second)
    pub current_hashrate: f64,
    /// Per-device figures
    pub devices: HashMap<DeviceId, DeviceStats>,
    /// Oldest-first total hashrate samples, at most [`HISTORY_CAPACITY`]
    pub history: Vec<HashrateSample>,
    /// Last reported pool connection state
    pub connection: ConnectionState,
    /// Time since the reporter was created
    pub uptime: Duration,
}

/// Per-device figures
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceStats {
    /// Latest hashrate estimate
    pub hashrate: f64,
    /// Accepted shares found by this device
    pub accepted: u64,
    /// Rejected shares found by this device
    pub rejected: u64,
    /// Lost shares found by this device
    pub lost: u64,
}

/// One point of the hashrate history
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HashrateSample {
    /// When the sample was taken
    pub at: SystemTime,
    /// Combined hashrate of all devices
    pub hashes_per_sec: f64,
}

/// Statistics related to hardware performance
#[derive(Debug, Clone)]
pub struct HardwareStats {
    /// Current CPU usage percentage (0-100)
    pub cpu_usage: f32,
    /// Memory currently in use (in bytes)
    pub memory_used: u64,
    /// Current CPU temperature in Celsius
    pub temperature: f32,
}

/// Final accounting of one submitted share
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareResult {
    /// The share was accepted as valid
    Accepted,
    /// The share was rejected by the pool
    Rejected,
    /// The submission failed twice and the share was dropped
    Lost,
}

/// Everything the engine and pool client report
#[derive(Debug, Clone, PartialEq)]
pub enum StatsEvent {
    /// Digests computed since the last report
    Hashes(u64),
    /// Fresh hashrate estimate for one device
    HashrateSample {
        /// Reporting device
        device: DeviceId,
        /// Estimate in hashes per second
        hashes_per_sec: f64,
    },
    /// Final result of one share
    Share {
        /// Device that found the share
        device: DeviceId,
        /// What happened to it
        result: ShareResult,
    },
    /// A share for a superseded job was submitted anyway
    StaleSubmitted,
    /// The pool connection changed state
    ConnectionState(ConnectionState),
}

struct StatsInner {
    hashes: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    lost: AtomicU64,
    stale: AtomicU64,
    devices: Mutex<HashMap<DeviceId, DeviceStats>>,
    history: Mutex<VecDeque<HashrateSample>>,
    connection: Mutex<ConnectionState>,
    hardware: Mutex<HardwareMonitor>,
    start_time: Instant,
}

/// System and component collectors, refreshed on demand
struct HardwareMonitor {
    system: System,
    components: Components,
}

/// Collects and reports mining and hardware statistics
///
/// Cloning is cheap: every clone shares the same counters.
#[derive(Clone)]
pub struct StatsReporter {
    stats: Arc<StatsInner>,
    /// Interval at which stats are logged
    report_interval: Duration,
}

/// Stops the periodic log line when dropped or stopped
pub struct ReportingHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ReportingHandle {
    /// Stops the reporting thread and waits for it
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ReportingHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StatsReporter {
    /// Creates a new StatsReporter with the specified reporting interval
    ///
    /// # Arguments
    /// * `report_interval` - How often to log statistics
    pub fn new(report_interval: Duration) -> Self {
        StatsReporter {
            stats: Arc::new(StatsInner {
                hashes: AtomicU64::new(0),
                accepted: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                lost: AtomicU64::new(0),
                stale: AtomicU64::new(0),
                devices: Mutex::new(HashMap::new()),
                history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
                connection: Mutex::new(ConnectionState::Disconnected),
                hardware: Mutex::new(HardwareMonitor {
                    system: System::new(),
                    components: Components::new_with_refreshed_list(),
                }),
                start_time: Instant::now(),
            }),
            report_interval,
        }
    }

    /// Records one event
    pub fn record(&self, event: StatsEvent) {
        let stats = &self.stats;
        match event {
            StatsEvent::Hashes(count) => {
                stats.hashes.fetch_add(count, Ordering::Relaxed);
            }
            StatsEvent::HashrateSample {
                device,
                hashes_per_sec,
            } => {
                let total: f64 = {
                    let mut devices = lock(&stats.devices);
                    devices.entry(device).or_default().hashrate = hashes_per_sec;
                    devices.values().map(|d| d.hashrate).sum()
                };

                let mut history = lock(&stats.history);
                if history.len() == HISTORY_CAPACITY {
                    history.pop_front();
                }
                history.push_back(HashrateSample {
                    at: SystemTime::now(),
                    hashes_per_sec: total,
                });
            }
            StatsEvent::Share { device, result } => {
                let mut devices = lock(&stats.devices);
                let entry = devices.entry(device).or_default();
                match result {
                    ShareResult::Accepted => {
                        stats.accepted.fetch_add(1, Ordering::Relaxed);
                        entry.accepted += 1;
                    }
                    ShareResult::Rejected => {
                        stats.rejected.fetch_add(1, Ordering::Relaxed);
                        entry.rejected += 1;
                    }
                    ShareResult::Lost => {
                        stats.lost.fetch_add(1, Ordering::Relaxed);
                        entry.lost += 1;
                    }
                }
            }
            StatsEvent::StaleSubmitted => {
                stats.stale.fetch_add(1, Ordering::Relaxed);
            }
            StatsEvent::ConnectionState(state) => {
                *lock(&stats.connection) = state;
            }
        }
    }

    /// Gets the current mining statistics
    ///
    /// # Returns
    /// A snapshot of the current mining statistics
    pub fn get_stats(&self) -> MiningStats {
        let uptime = self.stats.start_time.elapsed();
        let hashes = self.stats.hashes.load(Ordering::Relaxed);
        let devices = lock(&self.stats.devices).clone();

        MiningStats {
            hashes_total: hashes,
            shares_accepted: self.stats.accepted.load(Ordering::Relaxed),
            shares_rejected: self.stats.rejected.load(Ordering::Relaxed),
            shares_lost: self.stats.lost.load(Ordering::Relaxed),
            shares_stale: self.stats.stale.load(Ordering::Relaxed),
            avg_hashrate: hashes as f64 / uptime.as_secs_f64().max(1.0),
            current_hashrate: devices.values().map(|d| d.hashrate).sum(),
            devices,
            history: lock(&self.stats.history).iter().copied().collect(),
            connection: *lock(&self.stats.connection),
            uptime,
        }
    }

    /// Gets the current hardware statistics
    ///
    /// This refreshes system information before returning the stats.
    ///
    /// # Returns
    /// A snapshot of the current hardware statistics
    pub fn get_hardware_stats(&self) -> HardwareStats {
        let mut hw = lock(&self.stats.hardware);
        let HardwareMonitor { system, components } = &mut *hw;
        system.refresh_cpu_all();
        system.refresh_memory();
        components.refresh(true);

        let cpus = system.cpus();
        let cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };

        let temperature = components
            .iter()
            .find(|c| c.label().contains("CPU") || c.label().contains("Package"))
            .and_then(|c| c.temperature())
            .unwrap_or(0.0);

        HardwareStats {
            cpu_usage,
            memory_used: system.used_memory(),
            temperature,
        }
    }

    /// Starts the periodic reporting of statistics
    ///
    /// Spawns a background thread that logs a summary line every interval
    /// until the returned handle is stopped or dropped.
    pub fn start_reporting(&self) -> ReportingHandle {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let reporter = self.clone();

        let thread = std::thread::Builder::new()
            .name("stats-reporter".into())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(reporter.report_interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }

                    let mining = reporter.get_stats();
                    let hw = reporter.get_hardware_stats();
                    log::info!(
                        "Hashrate: {:.2} H/s | Accepted/Rejected/Lost: {}/{}/{} | Stale: {} | Pool: {} | CPU: {:.1}% | Temp: {:.1}°C",
                        mining.current_hashrate,
                        mining.shares_accepted,
                        mining.shares_rejected,
                        mining.shares_lost,
                        mining.shares_stale,
                        mining.connection,
                        hw.cpu_usage,
                        hw.temperature
                    );
                }
            });

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("Failed to start stats reporter: {}", e);
                None
            }
        };

        ReportingHandle {
            stop: Some(stop_tx),
            thread,
        }
    }
}
