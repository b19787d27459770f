// src/miner/algorithm/mod.rs
//! Mining algorithm implementations
//!
//! This module contains all supported proof-of-work algorithms and their
//! common interface. Currently implements:
//! - SHA-256d and single SHA-256
//! - Keccak-256d

/// SHA-256 based algorithms
pub mod sha256;

/// Keccak-256 based algorithm
pub mod keccak;

use crate::miner::job::{Digest, Target};
use crate::types::AlgorithmType;
use std::sync::Arc;

pub use self::keccak::Keccak256d;
pub use self::sha256::{Sha256, Sha256d};

/// Common interface for all mining algorithms
///
/// Implementations are stateless and pure: the same `(preimage, nonce)`
/// always produces the same digest, so one instance is shared by every
/// worker thread.
pub trait Algorithm: Send + Sync {
    /// Get the algorithm type
    fn algorithm_type(&self) -> AlgorithmType;

    /// Human-readable algorithm name
    fn name(&self) -> &'static str;

    /// Digest length in bytes
    fn digest_size(&self) -> usize {
        32
    }

    /// Exclusive upper bound of the nonce space
    fn nonce_space(&self) -> u64 {
        self.algorithm_type().nonce_space()
    }

    /// Compute the digest for a job preimage and nonce
    ///
    /// # Arguments
    /// * `preimage` - Extra-nonce prefix followed by the header template
    /// * `nonce` - The nonce value; only the algorithm's nonce width is used
    fn hash(&self, preimage: &[u8], nonce: u64) -> Digest;

    /// Whether a digest satisfies the target under this algorithm's ordering
    fn meets_target(&self, digest: &Digest, target: &Target) -> bool;

    /// Hash and compare in one step
    ///
    /// # Returns
    /// `true` if the digest for `(preimage, nonce)` is within `target`
    fn verify(&self, preimage: &[u8], nonce: u64, target: &Target) -> bool {
        self.meets_target(&self.hash(preimage, nonce), target)
    }
}

/// Creates the shared algorithm instance for the selected family
pub fn create(algorithm: AlgorithmType) -> Arc<dyn Algorithm> {
    match algorithm {
        AlgorithmType::Sha256d => Arc::new(Sha256d),
        AlgorithmType::Keccak256d => Arc::new(Keccak256d),
        AlgorithmType::Sha256 => Arc::new(Sha256),
    }
}
