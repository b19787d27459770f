// src/stats/mod.rs
//! Statistics collection and reporting module
//!
//! This module tracks:
//! - Hash counts and per-device hashrate estimates
//! - Share outcomes (accepted, rejected, lost, stale)
//! - Pool connection state
//! - Hardware usage (CPU, memory, temperature)
//!
//! The main component is [`StatsReporter`], shared by the engine and the pool
//! client, which can also log a summary periodically.

/// Submodule containing the statistics reporter implementation
pub mod reporter;

// Re-export main components
pub use reporter::{
    DeviceStats, HardwareStats, HashrateSample, MiningStats, ReportingHandle, ShareResult,
    StatsEvent, StatsReporter,
};
