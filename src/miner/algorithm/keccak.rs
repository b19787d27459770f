// src/miner/algorithm/keccak.rs
//! Keccak-256d algorithm
//!
//! Keccak-256 of `preimage || nonce_le64`, hashed a second time. The digest
//! is compared against the target as a big-endian number.

use crate::miner::algorithm::Algorithm;
use crate::miner::job::{Digest, Target};
use crate::types::AlgorithmType;
use sha3::{Digest as _, Keccak256};

/// Double Keccak-256 with a 64-bit nonce
#[derive(Debug, Clone, Copy, Default)]
pub struct Keccak256d;

impl Algorithm for Keccak256d {
    fn algorithm_type(&self) -> AlgorithmType {
        AlgorithmType::Keccak256d
    }

    fn name(&self) -> &'static str {
        "Keccak-256d"
    }

    fn hash(&self, preimage: &[u8], nonce: u64) -> Digest {
        let mut hasher = Keccak256::new();
        hasher.update(preimage);
        hasher.update(nonce.to_le_bytes());
        let first = hasher.finalize();

        Keccak256::digest(first).into()
    }

    fn meets_target(&self, digest: &Digest, target: &Target) -> bool {
        target.admits_be(digest)
    }
}
