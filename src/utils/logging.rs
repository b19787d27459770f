// src/utils/logging.rs
//! Logging setup
//!
//! The library only talks to the `log` facade; the binary picks the backend
//! here. Uses `env_logger` with a compact one-line format.

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::env;

/// Initializes logging at the given default level
///
/// `RUST_LOG` takes precedence over `level` when set. Calling this twice is
/// harmless (the second call is ignored).
///
/// # Arguments
/// * `level` - Default filter such as `"info"` or `"debug"`
pub fn init_logging(level: &str) {
    let mut builder = common_log_config();

    if env::var("RUST_LOG").is_ok() {
        builder.parse_env("RUST_LOG");
    } else {
        builder.filter_level(level.parse().unwrap_or(LevelFilter::Info));
    }

    let _ = builder.try_init();
}

/// Configures benchmark-specific logging
///
/// Defaults to debug so per-thread hash rates are visible.
pub fn init_bench_logging() {
    init_logging("debug");
}

/// Base builder shared by all entry points
///
/// Format: `[<epoch secs> <LEVEL> <module>:<line>] <message>` on stdout.
fn common_log_config() -> Builder {
    let mut builder = Builder::new();

    builder
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {:<5} {}:{}] {}",
                buf.timestamp_seconds(),
                record.level(),
                record.module_path().unwrap_or_default(),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(Target::Stdout);

    builder
}
