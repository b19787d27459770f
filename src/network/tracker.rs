// src/network/tracker.rs
//! Current-job tracking for stale share classification

use crate::miner::job::ShareFreshness;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Superseded jobs remembered beyond the grace window are pruned
const MAX_SUPERSEDED: usize = 64;

#[derive(Debug, Default)]
struct Tracked {
    current: Option<String>,
    /// Newest last: `(job_id, superseded_at)`
    superseded: VecDeque<(String, Instant)>,
}

/// Tracks the pool's current job and recently superseded ones
#[derive(Debug)]
pub struct JobTracker {
    grace: Duration,
    inner: Mutex<Tracked>,
}

impl JobTracker {
    /// Creates a tracker with the given stale grace window
    pub fn new(grace: Duration) -> Self {
        JobTracker {
            grace,
            inner: Mutex::new(Tracked::default()),
        }
    }

    /// Makes `job_id` current, superseding the previous job
    pub fn set_current(&self, job_id: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.current.as_deref() == Some(job_id) {
            return;
        }

        if let Some(previous) = inner.current.replace(job_id.to_string()) {
            inner.superseded.push_back((previous, Instant::now()));
        }
        inner.superseded.retain(|(id, _)| id != job_id);
        while inner.superseded.len() > MAX_SUPERSEDED {
            inner.superseded.pop_front();
        }
    }

    /// Id of the current job
    pub fn current(&self) -> Option<String> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
    }

    /// How a share for `job_id` relates to the current job
    pub fn classify(&self, job_id: &str) -> ShareFreshness {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.current.as_deref() == Some(job_id) {
            return ShareFreshness::Current;
        }

        match inner.superseded.iter().rev().find(|(id, _)| id == job_id) {
            Some((_, at)) if at.elapsed() < self.grace => ShareFreshness::Grace,
            _ => ShareFreshness::Expired,
        }
    }
}
