// src/bin/mss_record.rs
//! Recorder daemon running the acquisition core against the simulated board

use anyhow::Context;
use clap::Parser;
use mss_record::config::{ConfigLoader, RecorderConfig};
use mss_record::hal::simulator::{BoardChannel, SimulatedBoard, SimulatedBus};
use mss_record::hal::{SharedBus, SoftwareEdges};
use mss_record::health::{ChannelStatusBoard, HealthMonitor, LogIndicator, NtpqProbe};
use mss_record::storage::MiniSeedWriter;
use mss_record::supervisor::AcquisitionSupervisor;
use mss_record::utils::{CancellationToken, SystemTimeProvider, TimeProvider};
use mss_record::SharedResources;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mss-record", version, about = "Seismic data logger acquisition daemon")]
struct Cli {
    /// Configuration file, merged over the system and local files
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the miniSEED output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "mss_record=info")]
    log_level: String,

    /// Validate the configuration, print a summary and exit
    #[arg(long)]
    check_config: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with_target(false)
        .init();

    let loader = match &cli.config {
        Some(path) => ConfigLoader::new().with_file(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load().context("failed to load configuration")?;
    if let Some(dir) = cli.output_dir {
        config.storage.output_dir = dir;
    }

    if cli.check_config {
        config.validate().context("invalid configuration")?;
        println!("{}", serde_json::to_string_pretty(&config.summary())?);
        return Ok(());
    }

    run(config)
}

fn run(config: RecorderConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.cancel()).context("failed to install signal handler")?;
    }

    std::fs::create_dir_all(&config.storage.output_dir)
        .with_context(|| format!("cannot create {}", config.storage.output_dir.display()))?;

    let bus = SimulatedBus::new();
    let mut board_channels = Vec::new();
    for channel in config.enabled_channels() {
        bus.add_device(channel.i2c_address, channel.variant);
        board_channels.push(BoardChannel {
            address: channel.i2c_address,
            ready_pin: channel.ready_pin,
        });
    }
    let edges = SoftwareEdges::new();
    let clock: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);

    let resources = SharedResources {
        bus: SharedBus::new(bus.clone()),
        edges: Arc::new(edges.clone()),
        clock: clock.clone(),
    };
    let writer = MiniSeedWriter::new(
        &config.storage.output_dir,
        config.storage.record_length,
        config.storage.encoding,
    )?;
    let status = ChannelStatusBoard::new();

    let mut supervisor = AcquisitionSupervisor::new(config.clone(), resources, Box::new(writer), status.clone())?;
    if supervisor.initialize() == 0 {
        warn!("continuing without active channels");
    }

    let board_cancel = CancellationToken::new();
    let board = SimulatedBoard::new(bus, edges, board_channels).spawn(board_cancel.clone())?;

    let health_cancel = CancellationToken::new();
    let health = if config.health.enabled {
        let monitor = HealthMonitor::new(
            Box::new(NtpqProbe::new(&config.health.ntpq_command)),
            Box::new(LogIndicator::new()),
            status,
        );
        Some(monitor.spawn(
            Duration::from_secs(config.health.check_interval_s),
            clock,
            health_cancel.clone(),
        )?)
    } else {
        None
    };

    let handle = supervisor.spawn(CancellationToken::new())?;
    info!(output_dir = %config.storage.output_dir.display(), "recording, press Ctrl-C to stop");

    while !shutdown.wait_timeout(Duration::from_secs(60)) {}
    info!("shutdown requested");

    board_cancel.cancel();
    if board.join().is_err() {
        error!("simulated board thread panicked");
    }

    for (channel, stats) in handle.shutdown() {
        info!(
            channel = %channel,
            accepted = stats.windows_accepted,
            dropped = stats.windows_dropped,
            files = stats.files_written,
            write_failures = stats.write_failures,
            captured = stats.capture.captured,
            "channel summary"
        );
    }

    health_cancel.cancel();
    if let Some(health) = health {
        if health.join().is_err() {
            error!("health monitor thread panicked");
        }
    }
    Ok(())
}
