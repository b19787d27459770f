// src/main.rs
use clap::Parser;
use pool_miner_rs::device::{ComputeDevice, CpuDevice, DeviceSpec, cpu::cpu_brand};
use pool_miner_rs::miner::{EngineSettings, MiningJob, Scheduler, algorithm};
use pool_miner_rs::utils::logging::init_bench_logging;
use pool_miner_rs::{self, *};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

/// Difficulty of the synthetic benchmark job; high enough that no share is found
const BENCH_DIFFICULTY: f64 = 1e15;

/// Main entry point for the pool miner
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(MinerError)` if any operation fails
///
/// # Flow
/// 1. Parses command line arguments
/// 2. Delegates to appropriate subcommand handler
/// 3. Propagates any errors upward
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        cli::Action::Start(opts) => start_mining(opts),
        cli::Action::Benchmark(opts) => run_benchmark(opts),
        cli::Action::Config(opts) => generate_config(opts),
    }
}

/// Starts the mining operation with given configuration options
///
/// # Arguments
/// * `opts` - Command line options for mining operation
///
/// # Operations
/// 1. Loads configuration and applies CLI overrides
/// 2. Initializes logging
/// 3. Runs the controller until Ctrl-C or a fatal pool error
fn start_mining(opts: cli::StartOptions) -> Result<(), MinerError> {
    let mut config = config::load(&opts.config)?;
    // Apply CLI overrides
    if let Some(threads) = opts.threads {
        config.override_threads(threads);
    }
    if let Some(algo) = opts.algorithm {
        config.algorithm = algo.to_string();
    }
    config.validate()?;

    let level = if opts.verbose { "debug" } else { config.log_level.as_str() };
    init_logging(level);

    let rt = Runtime::new()?;
    rt.block_on(async {
        let controller = Arc::new(MiningController::new(config)?);

        let on_signal = controller.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupt received, shutting down");
                on_signal.stop().await;
            }
        });

        controller.run().await
    })
}

/// Runs mining algorithm benchmarks
///
/// # Arguments
/// * `opts` - Benchmark configuration options
///
/// # Operations
/// 1. Initializes benchmark-specific logging
/// 2. Starts the engine on one CPU device with the requested threads
/// 3. Feeds it a synthetic job no hash can satisfy
/// 4. Reports the resulting hashrate
fn run_benchmark(opts: cli::BenchmarkOptions) -> Result<(), MinerError> {
    init_bench_logging();

    let reporter = stats::StatsReporter::new(Duration::from_secs(5));
    let _reporting = reporter.start_reporting();

    let spec = DeviceSpec {
        threads: opts.threads,
        ..DeviceSpec::all_cores("bench0")
    };
    let device: Box<dyn ComputeDevice> = Box::new(CpuDevice::new(&spec, &cpu_brand()));
    let scheduler = Scheduler::new(EngineSettings::default(), reporter.clone());

    log::info!(
        "Starting {} benchmark for {} seconds on {} thread(s)",
        opts.algorithm,
        opts.duration,
        opts.threads
    );

    scheduler.submit_job(Arc::new(MiningJob::new(
        "benchmark",
        vec![0u8; 76],
        Vec::new(),
        BENCH_DIFFICULTY,
        true,
    )));
    let started = Instant::now();
    scheduler.start(vec![device], algorithm::create(opts.algorithm))?;
    std::thread::sleep(Duration::from_secs(opts.duration));
    scheduler.stop();
    let elapsed = started.elapsed().as_secs_f64();

    // Report final results
    let stats = reporter.get_stats();
    log::info!("Benchmark results:");
    log::info!("Total hashes: {}", stats.hashes_total);
    log::info!(
        "Average hashrate: {:.2} H/s",
        stats.hashes_total as f64 / elapsed.max(f64::EPSILON)
    );
    log::logger().flush(); // Ensure final results appear

    Ok(())
}

/// Generates configuration template file
///
/// # Arguments
/// * `opts` - Configuration generation options
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    let template = config::generate_template();
    std::fs::write(&opts.output, template)?;
    println!("Configuration template written to {}", opts.output.display());
    Ok(())
}
