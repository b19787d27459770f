// src/miner/algorithm/sha256.rs
//! SHA-256 family
//!
//! Both variants append the nonce as 4 little-endian bytes after the
//! preimage. `Sha256d` follows Bitcoin conventions and compares the digest as
//! a little-endian number; `Sha256` compares it big-endian.

use crate::miner::algorithm::Algorithm;
use crate::miner::job::{Digest, Target};
use crate::types::AlgorithmType;
use sha2::Digest as _;

/// Double SHA-256
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256d;

/// Single SHA-256
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256;

fn sha256_with_nonce(preimage: &[u8], nonce: u64) -> Digest {
    let mut hasher = sha2::Sha256::new();
    hasher.update(preimage);
    hasher.update((nonce as u32).to_le_bytes());
    hasher.finalize().into()
}

impl Algorithm for Sha256d {
    fn algorithm_type(&self) -> AlgorithmType {
        AlgorithmType::Sha256d
    }

    fn name(&self) -> &'static str {
        "SHA-256d"
    }

    fn hash(&self, preimage: &[u8], nonce: u64) -> Digest {
        let first = sha256_with_nonce(preimage, nonce);
        sha2::Sha256::digest(first).into()
    }

    fn meets_target(&self, digest: &Digest, target: &Target) -> bool {
        target.admits_le(digest)
    }
}

impl Algorithm for Sha256 {
    fn algorithm_type(&self) -> AlgorithmType {
        AlgorithmType::Sha256
    }

    fn name(&self) -> &'static str {
        "SHA-256"
    }

    fn hash(&self, preimage: &[u8], nonce: u64) -> Digest {
        sha256_with_nonce(preimage, nonce)
    }

    fn meets_target(&self, digest: &Digest, target: &Target) -> bool {
        target.admits_be(digest)
    }
}
