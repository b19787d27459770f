// src/miner/job.rs
//! Work and solution value types
//!
//! A [`MiningJob`] is published by the pool client as an `Arc` and never
//! mutated afterwards; a newer job supersedes it. A [`Share`] is created by a
//! worker and consumed exactly once by the pool client.

use crate::device::DeviceId;
use crate::utils::error::MinerError;
use std::fmt;
use std::time::{Instant, SystemTime};
use uint::construct_uint;

construct_uint! {
    /// 256-bit unsigned integer used for target arithmetic
    pub struct U256(4);
}

/// Output of one digest computation
pub type Digest = [u8; 32];

/// Difficulty-1 target shifted left by 32 bits (`0xFFFF << 240`)
///
/// Dividing this by `difficulty * 2^32` yields the target for fractional
/// difficulties without losing precision.
const DIFF1_SHL32: [u8; 32] = {
    let mut bytes = [0u8; 32];
    bytes[0] = 0xFF;
    bytes[1] = 0xFF;
    bytes
};

/// Big-endian 256-bit share threshold
///
/// A digest qualifies when its numeric value (as interpreted by the
/// algorithm) is less than or equal to the target. Smaller is harder.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target(pub [u8; 32]);

impl Target {
    /// Every digest qualifies
    pub const MAX: Target = Target([0xFF; 32]);

    /// Converts a pool difficulty into a target
    ///
    /// Uses the classic difficulty-1 target `0x00000000FFFF0000...`.
    /// Non-positive or non-finite difficulties map to [`Target::MAX`].
    pub fn from_difficulty(difficulty: f64) -> Self {
        if !difficulty.is_finite() || difficulty <= 0.0 {
            return Target::MAX;
        }

        let denominator = (difficulty * 4_294_967_296.0).round() as u128;
        if denominator == 0 {
            return Target::MAX;
        }

        let quotient = U256::from_big_endian(&DIFF1_SHL32) / U256::from(denominator);
        Target(quotient.to_big_endian())
    }

    /// Parses a big-endian hex target of up to 32 bytes
    ///
    /// Shorter values are right-aligned (treated as the low-order bytes).
    pub fn from_hex(hex_str: &str) -> Result<Self, MinerError> {
        let bytes = hex::decode(hex_str)?;
        if bytes.len() > 32 {
            return Err(MinerError::Protocol(format!(
                "Target too long: {} bytes",
                bytes.len()
            )));
        }
        let mut target = [0u8; 32];
        target[32 - bytes.len()..].copy_from_slice(&bytes);
        Ok(Target(target))
    }

    /// Hex representation (64 characters, big-endian)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether a big-endian 256-bit value is within this target
    pub fn admits_be(&self, value: &[u8; 32]) -> bool {
        value <= &self.0
    }

    /// Whether a little-endian 256-bit value is within this target
    pub fn admits_le(&self, value: &[u8; 32]) -> bool {
        let mut be = *value;
        be.reverse();
        self.admits_be(&be)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target({})", self.to_hex())
    }
}

/// Represents a mining job received from the pool
#[derive(Debug, Clone)]
pub struct MiningJob {
    /// Opaque job identifier, unique per pool session
    pub job_id: String,
    /// Header template bytes (without nonce)
    pub header: Vec<u8>,
    /// Pool-assigned extra-nonce prefix
    pub extra_nonce: Vec<u8>,
    /// Share threshold for this job
    pub target: Target,
    /// Pool difficulty the target was derived from
    pub difficulty: f64,
    /// Abandon in-flight work for earlier jobs
    pub clean_jobs: bool,
    /// When the notification was turned into this job
    pub received_at: Instant,
}

impl MiningJob {
    /// Creates a job whose target is derived from `difficulty`
    pub fn new(
        job_id: impl Into<String>,
        header: Vec<u8>,
        extra_nonce: Vec<u8>,
        difficulty: f64,
        clean_jobs: bool,
    ) -> Self {
        MiningJob {
            job_id: job_id.into(),
            header,
            extra_nonce,
            target: Target::from_difficulty(difficulty),
            difficulty,
            clean_jobs,
            received_at: Instant::now(),
        }
    }

    /// Replaces the derived target with an explicit one
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Copy of this job with a different `clean_jobs` flag
    ///
    /// Jobs are never mutated once published, so forcing a clean restart
    /// means publishing this copy in place of the original.
    pub fn with_clean_jobs(&self, clean_jobs: bool) -> Self {
        MiningJob {
            clean_jobs,
            ..self.clone()
        }
    }

    /// Bytes hashed in front of the nonce: `extra_nonce || header`
    pub fn preimage(&self) -> Vec<u8> {
        let mut preimage = Vec::with_capacity(self.extra_nonce.len() + self.header.len());
        preimage.extend_from_slice(&self.extra_nonce);
        preimage.extend_from_slice(&self.header);
        preimage
    }
}

/// Represents a candidate solution found by a worker
#[derive(Debug, Clone, PartialEq)]
pub struct Share {
    /// Job ID this share was found against
    pub job_id: String,
    /// Nonce that produced the digest
    pub nonce: u64,
    /// Resulting digest that meets the job target
    pub digest: Digest,
    /// Device that found the share
    pub device_id: DeviceId,
    /// Discovery time
    pub found_at: SystemTime,
}

/// How a share's job relates to the pool client's current job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareFreshness {
    /// Found against the job the client currently tracks
    Current,
    /// Found against a job superseded less than the grace window ago
    Grace,
    /// Found against an older or unknown job
    Expired,
}

impl ShareFreshness {
    /// Stale shares are still submitted but flagged as low-confidence
    pub fn is_stale(&self) -> bool {
        !matches!(self, ShareFreshness::Current)
    }
}

/// Final result of submitting one share
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The pool accepted the share
    Accepted,
    /// The pool rejected the share, with its reason
    Rejected(String),
    /// Transient failure (timeout, disconnect); the share may be lost
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_one_is_classic_target() {
        let target = Target::from_difficulty(1.0);
        assert_eq!(
            target.to_hex(),
            "00000000ffff0000000000000000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn higher_difficulty_gives_smaller_target() {
        let easy = Target::from_difficulty(0.001);
        let one = Target::from_difficulty(1.0);
        let hard = Target::from_difficulty(1024.0);
        assert!(easy.0 > one.0);
        assert!(one.0 > hard.0);
        assert_eq!(Target::from_difficulty(0.0), Target::MAX);
        assert_eq!(Target::from_difficulty(f64::NAN), Target::MAX);
    }

    #[test]
    fn fractional_difficulty_scales_target() {
        // difficulty 1/256 moves the difficulty-1 target up by one byte
        let target = Target::from_difficulty(1.0 / 256.0);
        assert_eq!(&target.0[..6], &[0x00, 0x00, 0x00, 0xff, 0xff, 0x00]);
    }

    #[test]
    fn hex_target_is_right_aligned() {
        let target = Target::from_hex("00ff").unwrap();
        assert_eq!(target.0[30], 0x00);
        assert_eq!(target.0[31], 0xff);
        assert!(Target::from_hex(&"ff".repeat(33)).is_err());
        assert!(Target::from_hex("zz").is_err());
    }

    #[test]
    fn endianness_of_comparison() {
        let target = Target::from_difficulty(1.0);
        // Tiny as a little-endian number, huge as a big-endian one
        let mut digest = [0u8; 32];
        digest[0] = 0xFF;
        assert!(target.admits_le(&digest));
        assert!(!target.admits_be(&digest));
    }

    #[test]
    fn preimage_puts_extra_nonce_first() {
        let job = MiningJob::new("a", vec![3, 4], vec![1, 2], 1.0, false);
        assert_eq!(job.preimage(), vec![1, 2, 3, 4]);

        let clean = job.with_clean_jobs(true);
        assert!(clean.clean_jobs);
        assert_eq!(clean.job_id, job.job_id);
    }
}
