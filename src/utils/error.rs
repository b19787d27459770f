// src/utils/error.rs
use crate::device::DeviceInitError;
use crate::miner::job::{MiningJob, Share};
use serde_json;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio_tungstenite::tungstenite;
use url;

/// Main error type for the pool miner
///
/// Variants follow the failure taxonomy of the two core subsystems: device
/// faults stay inside the engine, network faults stay inside the pool client's
/// state machine, and only `AuthRejected` and `Config` are fatal.
#[derive(Error, Debug)]
pub enum MinerError {
    /// A device could not be prepared for mining
    #[error(transparent)]
    DeviceInit(#[from] DeviceInitError),

    /// Malformed or unexpected message from the pool
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Connect, read, write or timeout failure on the pool connection
    #[error("Transport error: {0}")]
    Transport(String),

    /// The pool rejected our credentials
    #[error("Authorization rejected: {0}")]
    AuthRejected(String),

    /// Transient share submission failure
    #[error("Share submission failed: {0}")]
    Submission(String),

    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Algorithm selection or capability errors
    #[error("Algorithm error: {0}")]
    Algorithm(String),

    /// Thread communication channel errors
    #[error("Thread communication error: {0}")]
    Channel(String),

    /// Async task or worker thread execution errors
    #[error("Task execution error: {0}")]
    Task(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// WebSocket communication errors
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),
}

impl MinerError {
    /// Whether this error must terminate the process
    ///
    /// Everything else is retried, counted or reported as state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MinerError::AuthRejected(_) | MinerError::Config(_))
    }

    /// Whether this error should send the pool client to `Reconnecting`
    pub fn forces_reconnect(&self) -> bool {
        matches!(
            self,
            MinerError::Protocol(_)
                | MinerError::Transport(_)
                | MinerError::Io(_)
                | MinerError::Json(_)
                | MinerError::Ws(_)
        )
    }
}

/// Converts crossbeam channel send errors for Shares into MinerError
impl From<crossbeam_channel::SendError<Share>> for MinerError {
    fn from(e: crossbeam_channel::SendError<Share>) -> Self {
        MinerError::Channel(format!("Share send failed: {}", e))
    }
}

/// Converts watch channel send errors for jobs into MinerError
impl From<tokio::sync::watch::error::SendError<Option<Arc<MiningJob>>>> for MinerError {
    fn from(e: tokio::sync::watch::error::SendError<Option<Arc<MiningJob>>>) -> Self {
        MinerError::Channel(format!("Job publish failed: {}", e))
    }
}

/// Hex payloads from the pool are protocol data, so bad hex is a protocol error
impl From<hex::FromHexError> for MinerError {
    fn from(e: hex::FromHexError) -> Self {
        MinerError::Protocol(format!("Hex conversion failed: {}", e))
    }
}

/// Converts async task join errors into MinerError
impl From<tokio::task::JoinError> for MinerError {
    fn from(e: tokio::task::JoinError) -> Self {
        MinerError::Task(format!("Async task failed: {}", e))
    }
}
