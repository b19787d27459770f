// src/utils/mod.rs
//! Utilities module for common functionality
//!
//! Shared error handling and logging infrastructure.

/// Error types and handling utilities
///
/// Contains the [`MinerError`] enum which defines all failure categories
/// of the miner, along with conversion implementations.
pub mod error;

/// Logging configuration
pub mod logging;

// Re-export for easier access
pub use error::MinerError;
pub use logging::init_logging;
