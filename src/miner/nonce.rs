// src/miner/nonce.rs
//! Nonce space partitioning
//!
//! Every published job gets a fresh [`NonceCursor`]. Workers claim disjoint
//! sub-ranges from it with a single `fetch_add`, so no two workers ever hash
//! the same nonce for the same job.

use crate::device::DeviceId;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Shared claim counter for one job's nonce space
#[derive(Debug)]
pub struct NonceCursor {
    next: AtomicU64,
    space: u64,
}

impl NonceCursor {
    /// Creates a cursor over `0..space`
    pub fn new(space: u64) -> Self {
        NonceCursor {
            next: AtomicU64::new(0),
            space,
        }
    }

    /// Claims the next sub-range of at most `size` nonces
    ///
    /// # Returns
    /// `None` once the whole space has been handed out
    pub fn claim(&self, size: u64) -> Option<Range<u64>> {
        let size = size.max(1);
        // Stop advancing once past the end so the counter cannot wrap
        let start = self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                (next < self.space).then(|| next.saturating_add(size))
            })
            .ok()?;

        let end = start.saturating_add(size).min(self.space);
        Some(start..end)
    }

    /// Nonces not yet handed out
    pub fn remaining(&self) -> u64 {
        self.space
            .saturating_sub(self.next.load(Ordering::Acquire).min(self.space))
    }
}

/// One sub-range a device claimed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedRange {
    /// Device that claimed it
    pub device: DeviceId,
    /// Job the range belongs to
    pub job_id: String,
    /// Claimed nonces
    pub range: Range<u64>,
}

/// Record of every claim, in the order claims were made
#[derive(Debug, Default)]
pub struct RangeLog {
    entries: Mutex<Vec<ClaimedRange>>,
}

impl RangeLog {
    /// Appends a claim
    pub fn record(&self, device: &DeviceId, job_id: &str, range: Range<u64>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ClaimedRange {
                device: device.clone(),
                job_id: job_id.to_string(),
                range,
            });
    }

    /// Copy of every claim so far
    pub fn entries(&self) -> Vec<ClaimedRange> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of claims so far
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing was claimed yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
