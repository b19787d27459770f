// src/types.rs
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported proof-of-work algorithm families
///
/// Selected once at configuration time and fixed for the lifetime of the
/// process. Each family defines its digest function, its nonce width and
/// how a digest is compared against a target.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmType {
    /// Double SHA-256 (Bitcoin-style)
    ///
    /// 32-bit nonce, digest read as a little-endian 256-bit number.
    #[clap(name = "sha256d")]
    Sha256d,

    /// Double Keccak-256
    ///
    /// 64-bit nonce, digest read as a big-endian 256-bit number.
    #[clap(name = "keccak256d")]
    Keccak256d,

    /// Single SHA-256
    ///
    /// Light CPU-friendly variant with a 32-bit nonce.
    #[clap(name = "sha256")]
    Sha256,
}

impl AlgorithmType {
    /// Every supported algorithm, in declaration order
    pub const ALL: [AlgorithmType; 3] = [
        AlgorithmType::Sha256d,
        AlgorithmType::Keccak256d,
        AlgorithmType::Sha256,
    ];

    /// Width of the nonce field in bytes
    pub fn nonce_bytes(&self) -> usize {
        match self {
            AlgorithmType::Sha256d | AlgorithmType::Sha256 => 4,
            AlgorithmType::Keccak256d => 8,
        }
    }

    /// Number of distinct nonces (exclusive upper bound of the nonce space)
    ///
    /// Saturates at `u64::MAX` for 64-bit nonces.
    pub fn nonce_space(&self) -> u64 {
        match self.nonce_bytes() {
            8 => u64::MAX,
            n => 1u64 << (n * 8),
        }
    }
}

impl fmt::Display for AlgorithmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmType::Sha256d => write!(f, "sha256d"),
            AlgorithmType::Keccak256d => write!(f, "keccak256d"),
            AlgorithmType::Sha256 => write!(f, "sha256"),
        }
    }
}

impl FromStr for AlgorithmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256d" | "bitcoin" => Ok(AlgorithmType::Sha256d),
            "keccak256d" | "keccak" | "ethash" => Ok(AlgorithmType::Keccak256d),
            "sha256" | "gxhash" => Ok(AlgorithmType::Sha256),
            _ => Err(format!("Unknown algorithm: {}", s)),
        }
    }
}
