// src/device/cpu.rs
//! CPU thread-group device
//!
//! Each `CpuDevice` owns a dedicated rayon pool so that several groups can
//! run side by side without competing for the global pool.

use crate::device::{
    BatchResult, BatchWork, ComputeDevice, DeviceCapabilities, DeviceFault, DeviceId,
    DeviceInitError, DeviceKind,
};
use crate::miner::algorithm::Algorithm;
use crate::types::AlgorithmType;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Inventory entry for one CPU thread group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    /// Stable identifier, e.g. `cpu0`
    pub id: String,
    /// Threads in the group; 0 means all logical cores
    #[serde(default)]
    pub threads: usize,
    /// Whether the group should mine
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl DeviceSpec {
    /// Spec for a single group spanning every logical core
    pub fn all_cores(id: impl Into<String>) -> Self {
        DeviceSpec {
            id: id.into(),
            threads: num_cpus::get(),
            enabled: true,
        }
    }
}

/// A group of CPU threads hashing one nonce range in parallel
pub struct CpuDevice {
    id: DeviceId,
    name: String,
    threads: usize,
    enabled: bool,
    pool: Option<ThreadPool>,
}

impl CpuDevice {
    /// Creates an unprepared device
    ///
    /// # Arguments
    /// * `spec` - Inventory entry; `threads == 0` selects all logical cores
    /// * `brand` - CPU brand string used for the display name
    pub fn new(spec: &DeviceSpec, brand: &str) -> Self {
        let threads = if spec.threads == 0 {
            num_cpus::get()
        } else {
            spec.threads
        };

        CpuDevice {
            id: DeviceId(spec.id.clone()),
            name: format!("{} ({} threads)", brand, threads),
            threads,
            enabled: spec.enabled,
            pool: None,
        }
    }
}

impl ComputeDevice for CpuDevice {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::CpuThreadGroup {
            threads: self.threads,
        }
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            supported_algorithms: AlgorithmType::ALL.to_vec(),
            threads: self.threads,
        }
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn prepare(&mut self, algorithm: &dyn Algorithm) -> Result<(), DeviceInitError> {
        if !self.capabilities().supports(algorithm.algorithm_type()) {
            return Err(DeviceInitError {
                device: self.id.clone(),
                reason: format!("{} is not supported", algorithm.name()),
            });
        }

        let prefix = self.id.to_string();
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(move |i| format!("{}-hash-{}", prefix, i))
            .build()
            .map_err(|e| DeviceInitError {
                device: self.id.clone(),
                reason: format!("Failed to build thread pool: {}", e),
            })?;

        log::debug!("{}: prepared {} hashing threads", self.id, self.threads);
        self.pool = Some(pool);
        Ok(())
    }

    fn run_batch(&mut self, work: &BatchWork<'_>) -> Result<BatchResult, DeviceFault> {
        let pool = self.pool.as_ref().ok_or_else(|| DeviceFault {
            device: self.id.clone(),
            reason: "run_batch called before prepare".into(),
        })?;

        let algorithm = work.algorithm;
        let preimage = work.preimage;
        let target = work.target;
        let hashes = work.nonces.end.saturating_sub(work.nonces.start);

        let mut hits: Vec<_> = pool.install(|| {
            work.nonces
                .clone()
                .into_par_iter()
                .filter_map(|nonce| {
                    let digest = algorithm.hash(preimage, nonce);
                    algorithm
                        .meets_target(&digest, target)
                        .then_some((nonce, digest))
                })
                .collect()
        });
        hits.sort_unstable_by_key(|(nonce, _)| *nonce);

        Ok(BatchResult { hashes, hits })
    }

    fn teardown(&mut self) {
        if self.pool.take().is_some() {
            log::debug!("{}: thread pool released", self.id);
        }
    }
}

/// Reads the CPU brand string
pub fn cpu_brand() -> String {
    let mut sys = System::new();
    sys.refresh_cpu_all();
    sys.cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .filter(|brand| !brand.is_empty())
        .unwrap_or_else(|| "Unknown CPU".to_string())
}

/// Builds the CPU inventory
///
/// An empty `specs` list yields one group spanning all logical cores.
pub fn detect_cpu_devices(specs: &[DeviceSpec]) -> Vec<CpuDevice> {
    let brand = cpu_brand();
    log::info!(
        "Detected CPU: {} ({} logical cores)",
        brand,
        num_cpus::get()
    );

    if specs.is_empty() {
        return vec![CpuDevice::new(&DeviceSpec::all_cores("cpu0"), &brand)];
    }

    specs.iter().map(|spec| CpuDevice::new(spec, &brand)).collect()
}
