// src/device/state.rs
//! Shared device status cell
//!
//! Written by exactly one worker thread, read by anyone holding the engine.

use crate::device::{Device, DeviceId, DeviceKind, DeviceStatus};
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Live status of one device
#[derive(Debug)]
pub struct DeviceState {
    id: DeviceId,
    name: String,
    kind: DeviceKind,
    status: AtomicU8,
    /// `f64` hash rate stored as raw bits
    hashrate: AtomicU64,
    hashes: AtomicU64,
    last_error: Mutex<Option<String>>,
}

fn encode_status(status: DeviceStatus) -> u8 {
    match status {
        DeviceStatus::Idle => 0,
        DeviceStatus::Working => 1,
        DeviceStatus::Errored => 2,
        DeviceStatus::Disabled => 3,
    }
}

fn decode_status(raw: u8) -> DeviceStatus {
    match raw {
        0 => DeviceStatus::Idle,
        1 => DeviceStatus::Working,
        2 => DeviceStatus::Errored,
        _ => DeviceStatus::Disabled,
    }
}

impl DeviceState {
    /// Creates a state cell with the given initial status
    pub fn new(id: DeviceId, name: String, kind: DeviceKind, status: DeviceStatus) -> Self {
        DeviceState {
            id,
            name,
            kind,
            status: AtomicU8::new(encode_status(status)),
            hashrate: AtomicU64::new(0f64.to_bits()),
            hashes: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    /// Device identifier
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status
    pub fn status(&self) -> DeviceStatus {
        decode_status(self.status.load(Ordering::Acquire))
    }

    /// Sets the status
    pub fn set_status(&self, status: DeviceStatus) {
        self.status.store(encode_status(status), Ordering::Release);
    }

    /// Marks the device Errored and records why
    pub fn fail(&self, reason: impl Into<String>) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
        self.set_status(DeviceStatus::Errored);
    }

    /// Adds to the lifetime hash count
    pub fn add_hashes(&self, count: u64) {
        self.hashes.fetch_add(count, Ordering::Relaxed);
    }

    /// Current hash rate estimate
    pub fn hashrate(&self) -> f64 {
        f64::from_bits(self.hashrate.load(Ordering::Relaxed))
    }

    /// Replaces the hash rate estimate
    pub fn set_hashrate(&self, hashes_per_sec: f64) {
        self.hashrate.store(hashes_per_sec.to_bits(), Ordering::Relaxed);
    }

    /// Consistent-enough snapshot for reporting
    pub fn snapshot(&self) -> Device {
        Device {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind.clone(),
            status: self.status(),
            hashrate: self.hashrate(),
            hashes: self.hashes.load(Ordering::Relaxed),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}
