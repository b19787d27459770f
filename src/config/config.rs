// src/config/config.rs
use crate::device::DeviceSpec;
use crate::miner::scheduler::EngineSettings;
use crate::network::pool::{Credentials, PoolSettings};
use crate::network::transport::PoolAddress;
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the mining application
///
/// Contains all settings needed to configure mining operations,
/// including algorithm selection, device inventory, engine tuning
/// and the pool connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Mining algorithm to use (e.g., "sha256d", "keccak256d", "sha256")
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Nonces a worker claims at a time
    /// (default: 65536)
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Digests computed between stop and job-replacement checks
    /// (default: 1024)
    #[serde(default = "default_hash_chunk")]
    pub hash_chunk: u64,

    /// Log level when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between periodic stats log lines
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    /// CPU thread groups; empty means one group over all cores
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,

    /// Pool connection
    pub pool: PoolConfig,
}

/// Configuration for connecting to a mining pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool connection URL (e.g., "stratum+tcp://pool.example.com:3333")
    pub url: String,
    /// Wallet address or pool username
    pub user: String,
    /// Worker password (often "x" if not required)
    #[serde(default = "default_password")]
    pub password: String,
    /// Worker identifier, sent as `user.worker_id`
    #[serde(default)]
    pub worker_id: Option<String>,
    /// First reconnect delay in milliseconds
    #[serde(default = "default_backoff_min_ms")]
    pub backoff_min_ms: u64,
    /// Reconnect delay cap in milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Seconds of Ready after which the reconnect delay resets
    #[serde(default = "default_stable_after_secs")]
    pub stable_after_secs: u64,
    /// Transport connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Subscribe and authorize reply timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Share submission reply timeout in seconds
    #[serde(default = "default_submit_timeout_secs")]
    pub submit_timeout_secs: u64,
    /// Milliseconds a superseded job's shares count as grace
    #[serde(default = "default_stale_grace_ms")]
    pub stale_grace_ms: u64,
    /// Consecutive authorization rejections before giving up
    #[serde(default = "default_max_auth_failures")]
    pub max_auth_failures: u32,
}

fn default_algorithm() -> String {
    "sha256d".into()
}

fn default_batch_size() -> u64 {
    65_536
}

fn default_hash_chunk() -> u64 {
    1024
}

fn default_log_level() -> String {
    "info".into()
}

fn default_stats_interval() -> u64 {
    60
}

fn default_password() -> String {
    "x".into()
}

fn default_backoff_min_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_stable_after_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_submit_timeout_secs() -> u64 {
    15
}

fn default_stale_grace_ms() -> u64 {
    5000
}

fn default_max_auth_failures() -> u32 {
    3
}

impl Config {
    /// Loads configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded configuration
    /// * `Err(MinerError)` - If file couldn't be read or parsed
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::Config(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        config_str.parse()
    }

    /// Checks values that serde cannot
    ///
    /// # Errors
    /// Returns `MinerError::Config` describing the first problem found.
    pub fn validate(&self) -> Result<(), MinerError> {
        self.algorithm_type()?;

        if self.batch_size == 0 {
            return Err(MinerError::Config("batch_size must be positive".into()));
        }
        if self.hash_chunk == 0 {
            return Err(MinerError::Config("hash_chunk must be positive".into()));
        }
        if self.stats_interval_secs == 0 {
            return Err(MinerError::Config(
                "stats_interval_secs must be positive".into(),
            ));
        }

        if !self.devices.is_empty() {
            let mut ids = HashSet::new();
            for device in &self.devices {
                if device.id.trim().is_empty() {
                    return Err(MinerError::Config("Device id must not be empty".into()));
                }
                if !ids.insert(device.id.as_str()) {
                    return Err(MinerError::Config(format!(
                        "Duplicate device id '{}'",
                        device.id
                    )));
                }
            }
            if !self.devices.iter().any(|d| d.enabled) {
                return Err(MinerError::Config("No enabled device".into()));
            }
        }

        let pool = &self.pool;
        if pool.url.trim().is_empty() {
            return Err(MinerError::Config("pool.url must not be empty".into()));
        }
        PoolAddress::parse(&pool.url)?;
        if pool.user.trim().is_empty() {
            return Err(MinerError::Config("pool.user must not be empty".into()));
        }
        if pool.backoff_min_ms == 0 || pool.backoff_min_ms > pool.backoff_max_ms {
            return Err(MinerError::Config(format!(
                "Invalid backoff bounds: {}ms..{}ms",
                pool.backoff_min_ms, pool.backoff_max_ms
            )));
        }
        if pool.max_auth_failures == 0 {
            return Err(MinerError::Config(
                "pool.max_auth_failures must be positive".into(),
            ));
        }
        if pool.connect_timeout_secs == 0
            || pool.request_timeout_secs == 0
            || pool.submit_timeout_secs == 0
        {
            return Err(MinerError::Config("Pool timeouts must be positive".into()));
        }

        Ok(())
    }

    /// Selected algorithm
    ///
    /// # Errors
    /// Returns `MinerError::Config` for an unknown algorithm name.
    pub fn algorithm_type(&self) -> Result<AlgorithmType, MinerError> {
        self.algorithm
            .parse()
            .map_err(|e: String| MinerError::Config(e))
    }

    /// Device inventory, with CLI overrides already applied
    pub fn device_specs(&self) -> Vec<DeviceSpec> {
        self.devices.clone()
    }

    /// Applies a `--threads` override to every device group
    pub fn override_threads(&mut self, threads: usize) {
        if self.devices.is_empty() {
            self.devices.push(DeviceSpec {
                id: "cpu0".into(),
                threads,
                enabled: true,
            });
        } else {
            for device in &mut self.devices {
                device.threads = threads;
            }
        }
    }

    /// Engine tuning
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            batch_size: self.batch_size,
            hash_chunk: self.hash_chunk,
            record_ranges: false,
        }
    }

    /// Pool client settings
    pub fn pool_settings(&self) -> PoolSettings {
        let pool = &self.pool;
        PoolSettings {
            connect_timeout: Duration::from_secs(pool.connect_timeout_secs),
            request_timeout: Duration::from_secs(pool.request_timeout_secs),
            submit_timeout: Duration::from_secs(pool.submit_timeout_secs),
            backoff_min: Duration::from_millis(pool.backoff_min_ms),
            backoff_max: Duration::from_millis(pool.backoff_max_ms),
            stable_after: Duration::from_secs(pool.stable_after_secs),
            stale_grace: Duration::from_millis(pool.stale_grace_ms),
            max_auth_failures: pool.max_auth_failures,
            ..PoolSettings::default()
        }
    }

    /// Pool login
    pub fn credentials(&self) -> Credentials {
        Credentials {
            user: self.pool.user.clone(),
            password: self.pool.password.clone(),
            worker_id: self.pool.worker_id.clone(),
        }
    }

    /// Stats log interval
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    /// Generates a configuration template string
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template() -> String {
        let mut template = String::new();
        template.push_str("# Pool Miner Configuration\n\n");
        template.push_str("# Supported algorithms: sha256d, keccak256d, sha256\n");
        template.push_str("algorithm = \"sha256d\"\n");
        template.push_str("# Nonces claimed by a worker at a time\n");
        template.push_str("batch_size = 65536\n");
        template.push_str("# Digests between stop/job-change checks\n");
        template.push_str("hash_chunk = 1024\n");
        template.push_str("# error, warn, info, debug or trace (RUST_LOG overrides)\n");
        template.push_str("log_level = \"info\"\n");
        template.push_str("stats_interval_secs = 60\n\n");

        template.push_str("# CPU thread groups (omit for one group over all cores)\n");
        template.push_str("# threads = 0 uses every logical core\n");
        template.push_str("[[devices]]\n");
        template.push_str("id = \"cpu0\"\n");
        template.push_str("threads = 0\n");
        template.push_str("enabled = true\n\n");

        template.push_str("# Pool mining configuration\n");
        template.push_str("[pool]\n");
        template.push_str("url = \"stratum+tcp://pool.example.com:3333\"\n");
        template.push_str("user = \"your_wallet_address\"\n");
        template.push_str("password = \"x\"\n");
        template.push_str("worker_id = \"worker01\"\n");
        template.push_str("backoff_min_ms = 500\n");
        template.push_str("backoff_max_ms = 30000\n");
        template.push_str("stable_after_secs = 60\n");
        template.push_str("connect_timeout_secs = 10\n");
        template.push_str("request_timeout_secs = 30\n");
        template.push_str("submit_timeout_secs = 15\n");
        template.push_str("# Shares for a job replaced less than this long ago count as grace\n");
        template.push_str("stale_grace_ms = 5000\n");
        template.push_str("max_auth_failures = 3\n");

        template
    }
}

impl std::str::FromStr for Config {
    type Err = MinerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(|e| MinerError::Config(format!("Invalid config format: {}", e)))
    }
}
