// src/device/mod.rs
//! Compute device abstraction
//!
//! A device is one compute resource driven by exactly one engine worker.
//! Device kinds differ only in how they implement [`ComputeDevice`]:
//! prepare, run a batch of nonces, tear down.

/// CPU thread-group devices and inventory detection
pub mod cpu;

/// Per-worker shared status cell
pub mod state;

pub use cpu::{CpuDevice, DeviceSpec, detect_cpu_devices};
pub use state::DeviceState;

use crate::miner::algorithm::Algorithm;
use crate::miner::job::{Digest, Target};
use crate::types::AlgorithmType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// Stable, unique device identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        DeviceId(id.to_string())
    }
}

/// Kind of compute resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DeviceKind {
    /// A group of CPU threads hashing one range together
    CpuThreadGroup {
        /// Number of OS threads in the group
        threads: usize,
    },
}

/// Lifecycle status, driven only by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    /// Ready, waiting for work
    Idle,
    /// Hashing a job
    Working,
    /// Failed to initialize or faulted while running
    Errored,
    /// Turned off in the inventory
    Disabled,
}

/// What a device can do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Algorithms this device can run
    pub supported_algorithms: Vec<AlgorithmType>,
    /// Degree of parallelism inside one batch
    pub threads: usize,
}

impl DeviceCapabilities {
    /// Whether the device can run `algorithm`
    pub fn supports(&self, algorithm: AlgorithmType) -> bool {
        self.supported_algorithms.contains(&algorithm)
    }
}

/// Point-in-time view of a device
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    /// Stable identifier
    pub id: DeviceId,
    /// Display name
    pub name: String,
    /// Device kind
    pub kind: DeviceKind,
    /// Current status
    pub status: DeviceStatus,
    /// Rolling hash rate estimate (hashes per second)
    pub hashrate: f64,
    /// Total digests computed since start
    pub hashes: u64,
    /// Reason for the last failure, if any
    pub last_error: Option<String>,
}

/// A device could not be prepared for mining
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Device {device} failed to initialize: {reason}")]
pub struct DeviceInitError {
    /// Device that failed
    pub device: DeviceId,
    /// Why preparation failed
    pub reason: String,
}

/// A device failed while running a batch
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Device {device} fault: {reason}")]
pub struct DeviceFault {
    /// Device that faulted
    pub device: DeviceId,
    /// Fault description
    pub reason: String,
}

/// One batch of work handed to a device
pub struct BatchWork<'a> {
    /// Algorithm to apply
    pub algorithm: &'a dyn Algorithm,
    /// Job preimage (extra-nonce prefix and header)
    pub preimage: &'a [u8],
    /// Share threshold
    pub target: &'a Target,
    /// Nonces to try
    pub nonces: Range<u64>,
}

/// Result of one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    /// Digests computed
    pub hashes: u64,
    /// Qualifying `(nonce, digest)` pairs, ascending by nonce
    pub hits: Vec<(u64, Digest)>,
}

/// Capability-set interface implemented by every device kind
///
/// The engine calls `prepare` once on the worker's own thread, then
/// `run_batch` repeatedly, then `teardown` exactly once on every exit path.
pub trait ComputeDevice: Send {
    /// Stable identifier
    fn id(&self) -> &DeviceId;

    /// Display name
    fn name(&self) -> &str;

    /// Device kind
    fn kind(&self) -> DeviceKind;

    /// Capability descriptor
    fn capabilities(&self) -> DeviceCapabilities;

    /// Disabled devices are reported but never given a worker
    fn enabled(&self) -> bool {
        true
    }

    /// Acquire resources and check that `algorithm` is supported
    ///
    /// # Errors
    /// Returns `DeviceInitError` when the device cannot run the algorithm or
    /// its resources cannot be acquired.
    fn prepare(&mut self, algorithm: &dyn Algorithm) -> Result<(), DeviceInitError>;

    /// Hash every nonce in `work.nonces`
    ///
    /// # Errors
    /// Returns `DeviceFault` if the hardware fails; the engine then marks the
    /// device Errored and stops feeding it.
    fn run_batch(&mut self, work: &BatchWork<'_>) -> Result<BatchResult, DeviceFault>;

    /// Release resources acquired in `prepare`
    fn teardown(&mut self);
}
