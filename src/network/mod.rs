// src/network/mod.rs
//! Network communication components
//!
//! This module handles all interaction with the mining pool:
//! - `codec`: message encoding (Stratum JSON-RPC)
//! - `transport`: TCP and WebSocket connections
//! - `backoff`: reconnect delays
//! - `tracker`: current-job tracking for stale shares
//! - `pool`: the session state machine tying them together

/// Wire message encoding
pub mod codec;

/// Pool connections
pub mod transport;

/// Reconnect backoff policy
pub mod backoff;

/// Current and superseded job ids
pub mod tracker;

/// Mining pool client implementation
///
/// Negotiates the session, streams jobs and submits shares, reconnecting
/// with backoff on any failure.
pub mod pool;

// Re-export main components for cleaner imports
pub use codec::{StratumCodec, WireCodec};
pub use pool::{ConnectionState, Credentials, PoolClient, PoolEvent, PoolSettings};
