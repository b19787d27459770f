// src/miner/mod.rs
//! Core mining functionality
//!
//! This module contains all components related to the mining process:
//! - Algorithm implementations (SHA-256d, Keccak-256d, SHA-256)
//! - Job, target and share types
//! - Nonce space partitioning
//! - The engine (scheduler) and its per-device workers

/// Mining algorithm implementations
pub mod algorithm;

/// Jobs, targets and shares
pub mod job;

/// Per-job nonce cursors
pub mod nonce;

/// Mining engine
///
/// Publishes the latest job to device workers and collects their shares.
pub mod scheduler;

/// Per-device worker loop
mod worker;

// Re-export main components for cleaner imports
pub use self::algorithm::Algorithm;
pub use self::job::{MiningJob, Share, ShareFreshness, SubmitOutcome, Target};
pub use self::nonce::ClaimedRange;
pub use self::scheduler::{EngineSettings, Scheduler, StartReport};
