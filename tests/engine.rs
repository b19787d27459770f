// tests/engine.rs
//! Mining engine scenarios driven through the public API with fake devices

use pool_miner_rs::device::{
    BatchResult, BatchWork, ComputeDevice, CpuDevice, DeviceCapabilities, DeviceFault, DeviceId,
    DeviceInitError, DeviceKind, DeviceSpec, DeviceStatus,
};
use pool_miner_rs::miner::algorithm::{self, Algorithm, Sha256};
use pool_miner_rs::miner::job::Digest;
use pool_miner_rs::miner::{EngineSettings, MiningJob, Scheduler, Target};
use pool_miner_rs::stats::StatsReporter;
use pool_miner_rs::{AlgorithmType, MinerError};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Every nonce divisible by this is reported as a hit by the fake device
const HIT_EVERY: u64 = 64;

/// Scriptable device that reports hits without hashing
struct FakeDevice {
    id: DeviceId,
    fail_prepare: bool,
    fault_after: Option<usize>,
    enabled: bool,
    batches: usize,
    teardowns: Arc<AtomicUsize>,
}

impl FakeDevice {
    fn new(id: &str) -> Self {
        FakeDevice {
            id: DeviceId::from(id),
            fail_prepare: false,
            fault_after: None,
            enabled: true,
            batches: 0,
            teardowns: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing(id: &str) -> Self {
        FakeDevice {
            fail_prepare: true,
            ..FakeDevice::new(id)
        }
    }

    fn boxed(self) -> Box<dyn ComputeDevice> {
        Box::new(self)
    }
}

impl ComputeDevice for FakeDevice {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn name(&self) -> &str {
        "fake device"
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::CpuThreadGroup { threads: 1 }
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            supported_algorithms: AlgorithmType::ALL.to_vec(),
            threads: 1,
        }
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn prepare(&mut self, _algorithm: &dyn Algorithm) -> Result<(), DeviceInitError> {
        if self.fail_prepare {
            return Err(DeviceInitError {
                device: self.id.clone(),
                reason: "simulated init failure".into(),
            });
        }
        Ok(())
    }

    fn run_batch(&mut self, work: &BatchWork<'_>) -> Result<BatchResult, DeviceFault> {
        self.batches += 1;
        if self.fault_after.is_some_and(|limit| self.batches > limit) {
            return Err(DeviceFault {
                device: self.id.clone(),
                reason: "simulated hardware fault".into(),
            });
        }

        std::thread::sleep(Duration::from_micros(200));
        let hits = work
            .nonces
            .clone()
            .filter(|n| n % HIT_EVERY == 0)
            .map(|n| (n, [0u8; 32]))
            .collect();
        Ok(BatchResult {
            hashes: work.nonces.end - work.nonces.start,
            hits,
        })
    }

    fn teardown(&mut self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// SHA-256 with a tiny nonce space, so exhaustion is quick
struct TinySpace;

impl Algorithm for TinySpace {
    fn algorithm_type(&self) -> AlgorithmType {
        AlgorithmType::Sha256
    }

    fn name(&self) -> &'static str {
        "tiny"
    }

    fn nonce_space(&self) -> u64 {
        10_000
    }

    fn hash(&self, preimage: &[u8], nonce: u64) -> Digest {
        Sha256.hash(preimage, nonce)
    }

    fn meets_target(&self, digest: &Digest, target: &Target) -> bool {
        Sha256.meets_target(digest, target)
    }
}

fn settings(batch_size: u64, hash_chunk: u64) -> EngineSettings {
    EngineSettings {
        batch_size,
        hash_chunk,
        record_ranges: true,
    }
}

fn engine(batch_size: u64, hash_chunk: u64) -> Scheduler {
    Scheduler::new(
        settings(batch_size, hash_chunk),
        StatsReporter::new(Duration::from_secs(60)),
    )
}

fn job(id: &str, clean: bool) -> Arc<MiningJob> {
    Arc::new(MiningJob::new(id, vec![0xAB; 76], vec![1, 2, 3, 4], 1.0, clean))
}

fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn sub_ranges_never_overlap_within_a_job() {
    let scheduler = engine(1000, 100);
    let devices = (0..4)
        .map(|i| FakeDevice::new(&format!("fake{}", i)).boxed())
        .collect();

    scheduler.submit_job(job("a", true));
    scheduler.start(devices, algorithm::create(AlgorithmType::Sha256)).unwrap();
    std::thread::sleep(Duration::from_millis(150));
    scheduler.submit_job(job("b", false));
    std::thread::sleep(Duration::from_millis(150));
    scheduler.stop();

    let mut by_job: HashMap<String, Vec<std::ops::Range<u64>>> = HashMap::new();
    for claim in scheduler.assigned_ranges() {
        by_job.entry(claim.job_id).or_default().push(claim.range);
    }
    assert!(by_job.contains_key("a"));
    assert!(by_job.contains_key("b"));

    for (job_id, mut ranges) in by_job {
        ranges.sort_by_key(|r| r.start);
        // A fresh cursor per job starts at zero
        assert_eq!(ranges[0].start, 0, "job {}", job_id);
        for pair in ranges.windows(2) {
            assert!(
                pair[0].end <= pair[1].start,
                "job {}: {:?} overlaps {:?}",
                job_id,
                pair[0],
                pair[1]
            );
        }
    }
}

#[test]
fn non_clean_job_takes_over_at_the_next_sub_range() {
    let scheduler = engine(1000, 100);
    let devices = (0..4)
        .map(|i| FakeDevice::new(&format!("fake{}", i)).boxed())
        .collect();

    scheduler.submit_job(job("a", true));
    scheduler.start(devices, algorithm::create(AlgorithmType::Sha256)).unwrap();
    std::thread::sleep(Duration::from_millis(150));
    scheduler.submit_job(job("b", false));
    let at_switch = scheduler.assigned_ranges().len();

    let everyone_on_b = || {
        let claims = scheduler.assigned_ranges();
        (0..4).all(|i| {
            let device = DeviceId::from(format!("fake{}", i).as_str());
            claims.iter().any(|c| c.device == device && c.job_id == "b")
        })
    };
    assert!(wait_until(Duration::from_secs(5), everyone_on_b));
    scheduler.stop();

    let claims = scheduler.assigned_ranges();
    let mut per_device: HashMap<DeviceId, Vec<&str>> = HashMap::new();
    for claim in &claims {
        per_device
            .entry(claim.device.clone())
            .or_default()
            .push(claim.job_id.as_str());
    }
    assert_eq!(per_device.len(), 4);

    for (device, jobs) in &per_device {
        let first_b = jobs
            .iter()
            .position(|j| *j == "b")
            .unwrap_or_else(|| panic!("{:?} never switched: {:?}", device, jobs));
        assert!(first_b > 0, "{:?} never mined a: {:?}", device, jobs);
        assert_eq!(jobs[first_b - 1], "a");
        assert!(
            jobs[first_b..].iter().all(|j| *j == "b"),
            "{:?} went back to a: {:?}",
            device,
            jobs
        );

        // Only the sub-range already under way may still be for "a"
        let late = claims[at_switch..]
            .iter()
            .filter(|c| &c.device == device && c.job_id == "a")
            .count();
        assert!(late <= 1, "{:?} claimed {} new a ranges", device, late);
    }
}

#[test]
fn no_share_for_replaced_job_after_clean_publish() {
    let scheduler = engine(4096, 64);
    let shares = scheduler.shares();
    let devices = vec![FakeDevice::new("a").boxed(), FakeDevice::new("b").boxed()];
    scheduler.start(devices, algorithm::create(AlgorithmType::Sha256)).unwrap();

    scheduler.submit_job(job("1", true));
    assert!(wait_until(Duration::from_secs(5), || !shares.is_empty()));
    scheduler.submit_job(job("1", false));
    std::thread::sleep(Duration::from_millis(20));
    scheduler.submit_job(job("2", true));

    // Anything already queued may still belong to job 1
    let before: Vec<_> = scheduler.poll_shares();
    assert!(before.iter().all(|s| s.job_id == "1" || s.job_id == "2"));

    std::thread::sleep(Duration::from_millis(100));
    let after = scheduler.poll_shares();
    scheduler.stop();

    assert!(!after.is_empty());
    assert!(after.iter().all(|s| s.job_id == "2"));
}

#[test]
fn shares_from_one_device_keep_discovery_order() {
    let scheduler = engine(100_000, 256);
    scheduler
        .start(
            vec![FakeDevice::new("solo").boxed()],
            algorithm::create(AlgorithmType::Sha256),
        )
        .unwrap();
    scheduler.submit_job(job("ordered", true));
    assert!(wait_until(Duration::from_secs(5), || scheduler.shares().len() > 50));
    scheduler.stop();

    let nonces: Vec<u64> = scheduler.poll_shares().iter().map(|s| s.nonce).collect();
    assert!(nonces.windows(2).all(|w| w[0] < w[1]));
    assert!(nonces.iter().all(|n| n % HIT_EVERY == 0));
}

#[test]
fn failed_device_is_reported_while_others_mine() {
    let scheduler = engine(1000, 100);
    let devices = vec![FakeDevice::new("good").boxed(), FakeDevice::failing("bad").boxed()];

    let report = scheduler
        .start(devices, algorithm::create(AlgorithmType::Sha256d))
        .unwrap();
    assert_eq!(report.started, vec![DeviceId::from("good")]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].device, DeviceId::from("bad"));

    scheduler.submit_job(job("x", true));
    assert!(wait_until(Duration::from_secs(5), || !scheduler.shares().is_empty()));

    let status: HashMap<_, _> = scheduler
        .device_status()
        .into_iter()
        .map(|d| (d.id.clone(), d))
        .collect();
    let good = &status[&DeviceId::from("good")];
    assert!(matches!(good.status, DeviceStatus::Idle | DeviceStatus::Working));
    let bad = &status[&DeviceId::from("bad")];
    assert_eq!(bad.status, DeviceStatus::Errored);
    assert!(bad.last_error.as_deref().unwrap_or_default().contains("simulated"));

    scheduler.stop();
}

#[test]
fn start_fails_only_when_no_device_starts() {
    let scheduler = engine(1000, 100);
    let result = scheduler.start(
        vec![FakeDevice::failing("x").boxed(), FakeDevice::failing("y").boxed()],
        algorithm::create(AlgorithmType::Sha256),
    );
    assert!(matches!(result, Err(MinerError::DeviceInit(_))));
    assert!(!scheduler.is_running());

    let disabled = FakeDevice {
        enabled: false,
        ..FakeDevice::new("off")
    };
    let result = scheduler.start(vec![disabled.boxed()], algorithm::create(AlgorithmType::Sha256));
    assert!(matches!(result, Err(MinerError::Config(_))));
}

#[test]
fn disabled_device_gets_no_worker() {
    let scheduler = engine(1000, 100);
    let disabled = FakeDevice {
        enabled: false,
        ..FakeDevice::new("off")
    };
    let report = scheduler
        .start(
            vec![FakeDevice::new("on").boxed(), disabled.boxed()],
            algorithm::create(AlgorithmType::Sha256),
        )
        .unwrap();
    assert_eq!(report.disabled, vec![DeviceId::from("off")]);

    let off = scheduler
        .device_status()
        .into_iter()
        .find(|d| d.id == DeviceId::from("off"))
        .unwrap();
    assert_eq!(off.status, DeviceStatus::Disabled);
    scheduler.stop();
}

#[test]
fn device_fault_marks_only_that_device() {
    let scheduler = engine(1000, 100);
    let flaky = FakeDevice {
        fault_after: Some(3),
        ..FakeDevice::new("flaky")
    };
    scheduler
        .start(
            vec![flaky.boxed(), FakeDevice::new("steady").boxed()],
            algorithm::create(AlgorithmType::Sha256),
        )
        .unwrap();
    scheduler.submit_job(job("f", true));

    let errored = wait_until(Duration::from_secs(5), || {
        scheduler
            .device_status()
            .iter()
            .any(|d| d.id == DeviceId::from("flaky") && d.status == DeviceStatus::Errored)
    });
    assert!(errored);
    assert!(scheduler.is_running());

    let hashes_before = steady_hashes(&scheduler);
    assert!(wait_until(Duration::from_secs(5), || {
        steady_hashes(&scheduler) > hashes_before
    }));
    scheduler.stop();
}

fn steady_hashes(scheduler: &Scheduler) -> u64 {
    scheduler
        .device_status()
        .iter()
        .find(|d| d.id == DeviceId::from("steady"))
        .map(|d| d.hashes)
        .unwrap_or_default()
}

#[test]
fn exhausted_space_idles_until_next_job() {
    let scheduler = engine(1000, 250);
    scheduler
        .start(
            vec![FakeDevice::new("a").boxed(), FakeDevice::new("b").boxed()],
            Arc::new(TinySpace),
        )
        .unwrap();

    scheduler.submit_job(job("small", true));
    let covered = |job_id: &str| -> u64 {
        scheduler
            .assigned_ranges()
            .into_iter()
            .filter(|claim| claim.job_id == job_id)
            .map(|claim| claim.range.end - claim.range.start)
            .sum()
    };
    assert!(wait_until(Duration::from_secs(5), || covered("small") == 10_000));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(covered("small"), 10_000);
    assert!(
        scheduler
            .device_status()
            .iter()
            .all(|d| d.status != DeviceStatus::Errored)
    );

    scheduler.submit_job(job("next", false));
    assert!(wait_until(Duration::from_secs(5), || covered("next") > 0));
    scheduler.stop();
}

#[test]
fn stop_is_idempotent_and_tears_down_once() {
    let teardowns = Arc::new(AtomicUsize::new(0));
    let devices = (0..3)
        .map(|i| {
            FakeDevice {
                teardowns: teardowns.clone(),
                ..FakeDevice::new(&format!("d{}", i))
            }
            .boxed()
        })
        .collect();

    let scheduler = engine(1000, 100);
    scheduler.start(devices, algorithm::create(AlgorithmType::Sha256)).unwrap();
    scheduler.submit_job(job("t", true));
    std::thread::sleep(Duration::from_millis(50));

    scheduler.stop();
    scheduler.stop();
    assert!(!scheduler.is_running());
    assert_eq!(teardowns.load(Ordering::SeqCst), 3);

    drop(scheduler);
    assert_eq!(teardowns.load(Ordering::SeqCst), 3);
}

#[test]
fn cpu_device_shares_verify() {
    let algorithm = algorithm::create(AlgorithmType::Sha256d);
    let spec = DeviceSpec {
        id: "cpu-test".into(),
        threads: 2,
        enabled: true,
    };
    let scheduler = engine(8192, 1024);

    let mut target = [0xFF; 32];
    target[0] = 0x00;
    let job = Arc::new(
        MiningJob::new("real", vec![0x42; 76], vec![0xde, 0xad], 1.0, true)
            .with_target(Target(target)),
    );
    scheduler.submit_job(job.clone());
    let device: Box<dyn ComputeDevice> = Box::new(CpuDevice::new(&spec, "Test CPU"));
    scheduler.start(vec![device], algorithm.clone()).unwrap();

    assert!(wait_until(Duration::from_secs(10), || scheduler.shares().len() >= 3));
    scheduler.stop();

    let preimage = job.preimage();
    for share in scheduler.poll_shares() {
        assert_eq!(share.job_id, "real");
        assert_eq!(share.digest, algorithm.hash(&preimage, share.nonce));
        assert!(algorithm.meets_target(&share.digest, &job.target));
    }
}
