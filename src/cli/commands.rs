// src/cli/commands.rs
use crate::types::AlgorithmType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Pool Miner CLI - pool mining client in Rust
#[derive(Parser, Debug)]
#[command(name = "pool-miner-rs")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform (start mining, run benchmarks, or generate config)
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands for the miner application
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Connect to the configured pool and mine until interrupted
    Start(StartOptions),

    /// Run performance benchmarks for mining algorithms
    Benchmark(BenchmarkOptions),

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options for starting the mining operation
#[derive(Parser, Debug)]
pub struct StartOptions {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Threads per CPU device group (overrides config)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Mining algorithm to use (overrides config)
    #[arg(short, long)]
    pub algorithm: Option<AlgorithmType>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    pub verbose: bool,
}

/// Options for running mining benchmarks
#[derive(Parser, Debug)]
pub struct BenchmarkOptions {
    /// Algorithm to benchmark
    #[arg(short, long, default_value = "sha256d")]
    pub algorithm: AlgorithmType,

    /// Duration of benchmark in seconds
    #[arg(short, long, default_value_t = 60)]
    pub duration: u64,

    /// Number of threads to use
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub threads: usize,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "config.toml")]
    pub output: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_overrides() {
        let cli = Commands::try_parse_from([
            "pool-miner-rs",
            "start",
            "--config",
            "miner.toml",
            "--threads",
            "4",
            "--algorithm",
            "keccak256d",
            "-v",
        ])
        .unwrap();

        match cli.action {
            Action::Start(opts) => {
                assert_eq!(opts.config, PathBuf::from("miner.toml"));
                assert_eq!(opts.threads, Some(4));
                assert_eq!(opts.algorithm, Some(AlgorithmType::Keccak256d));
                assert!(opts.verbose);
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn benchmark_defaults() {
        let cli = Commands::try_parse_from(["pool-miner-rs", "benchmark", "-d", "5"]).unwrap();
        match cli.action {
            Action::Benchmark(opts) => {
                assert_eq!(opts.algorithm, AlgorithmType::Sha256d);
                assert_eq!(opts.duration, 5);
                assert!(opts.threads >= 1);
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_algorithm() {
        assert!(
            Commands::try_parse_from(["pool-miner-rs", "benchmark", "-a", "scrypt"]).is_err()
        );
    }
}
