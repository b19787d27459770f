//! Pool Miner - cryptocurrency pool mining client in Rust
//!
//! This crate provides a complete pool mining client with support for:
//! - Multiple proof-of-work algorithms (SHA-256d, Keccak-256d, SHA-256)
//! - A mining engine spreading the nonce space over compute devices
//! - A reconnecting Stratum pool client over TCP or WebSocket
//! - Performance benchmarking
//! - Hardware monitoring

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Miner core implementation including algorithms and scheduling
pub mod miner;

/// Compute devices driven by the mining engine
pub mod device;

/// Network communication with the mining pool
pub mod network;

/// Statistics collection and reporting functionality
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

/// Engine and pool client wired together for front ends
pub mod controller;

// Core exports
pub use cli::Commands;
pub use config::Config;
pub use controller::{MiningController, ShareRecord, Snapshot};
pub use device::{ComputeDevice, CpuDevice, Device, DeviceId, DeviceStatus};
pub use miner::{Algorithm, MiningJob, Scheduler, Share, SubmitOutcome, Target};
pub use network::{ConnectionState, PoolClient, PoolEvent};
pub use stats::{HardwareStats, MiningStats, StatsReporter};
pub use types::AlgorithmType;
pub use utils::{MinerError, init_logging};
