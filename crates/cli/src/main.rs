// FabricLink - Host-side FPGA I/O Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod udp_link;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fabriclink_config::BridgeConfig;
use fabriclink_core::block::FileBackend;
use fabriclink_core::transport::MmapRegion;
use fabriclink_core::{Detached, Driver, DriverLimits, DriverStats, MacAddress, RegisterMap};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{error, info};

const EXIT_PASS: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

#[derive(Parser, Debug)]
#[command(author, version, about = "FabricLink FPGA I/O bridge", long_about = None)]
struct Cli {
    /// Log every block request and flit
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Attach to the target and serve its block and network requests.
    Run(RunArgs),

    /// Print the resolved register map as JSON.
    Layout(LayoutArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the bridge config (YAML)
    #[arg(short, long)]
    config: PathBuf,

    /// Stop after this many ticks (overrides limits.max_ticks)
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Print the session counters as a JSON line on exit
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct LayoutArgs {
    /// Apply register overrides from this config and check them against its region size
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Serialize)]
struct RunReport<'a> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    elapsed_ms: u128,
    #[serde(flatten)]
    stats: &'a DriverStats,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine readable.
    let level = if cli.trace {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Layout(args) => layout(args),
    }
}

type BridgeDriver = Driver<MmapRegion, Detached, FileBackend>;

/// Everything that can go wrong before the first tick is a configuration error.
fn setup(config: &BridgeConfig) -> Result<BridgeDriver> {
    let map = RegisterMap::with_overrides(&config.registers)?;
    let size = config.region_size()?;

    let regs = if config.mmio.create {
        MmapRegion::create(&config.mmio.path, size)?
    } else {
        MmapRegion::open(&config.mmio.path, config.mmio.base, size)?
    };

    let create_size = config
        .block
        .create_size
        .as_deref()
        .map(fabriclink_config::parse_size)
        .transpose()?;
    let backend = FileBackend::open_or_create(&config.block.image, create_size)
        .with_context(|| format!("Failed to open disk image {:?}", config.block.image))?;

    let mut driver = Driver::new(
        regs,
        map,
        Detached,
        backend,
        DriverLimits::from_config(config),
    )?;

    if let Some(net) = &config.network {
        let mac = MacAddress(net.mac_bytes()?);
        let (sink, source) = udp_link::open(&net.bind, &net.peer)?;
        driver.attach_network(Box::new(sink), Box::new(source), mac)?;
    }

    Ok(driver)
}

fn run(args: RunArgs) -> ExitCode {
    info!("Starting FabricLink bridge");

    let config = match BridgeConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let mut driver = match setup(&config) {
        Ok(driver) => driver,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let max_ticks = args.max_ticks.or(config.limits.max_ticks);
    let idle_sleep = Duration::from_micros(config.limits.idle_sleep_us);
    match max_ticks {
        Some(n) => info!("Running for {} ticks...", n),
        None => info!("Running until the target misbehaves..."),
    }

    let start = Instant::now();
    let mut failure = None;
    while max_ticks.map_or(true, |n| driver.stats().ticks < n) {
        match driver.tick() {
            Ok(report) => {
                if report.is_idle() && !idle_sleep.is_zero() {
                    std::thread::sleep(idle_sleep);
                }
            }
            Err(e) => {
                error!("Bridge stopped after {} ticks: {}", driver.stats().ticks, e);
                failure = Some(e.to_string());
                break;
            }
        }
    }
    let elapsed = start.elapsed();

    let stats = driver.stats().clone();
    info!("Bridge loop finished.");
    info!("Ticks: {}", stats.ticks);
    info!(
        "Block requests: {} ({} sectors read, {} written)",
        stats.block_requests(),
        stats.sectors_read,
        stats.sectors_written
    );
    info!("Flits: {} out, {} in", stats.flits_out, stats.flits_in);

    let (regs, _host, _backend) = driver.into_parts();
    if let Err(e) = regs.flush() {
        error!("{}", e);
    }

    if args.json {
        let report = RunReport {
            status: if failure.is_some() { "error" } else { "finished" },
            error: failure.clone(),
            elapsed_ms: elapsed.as_millis(),
            stats: &stats,
        };
        match serde_json::to_string(&report) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to serialize report: {}", e),
        }
    }

    if failure.is_some() {
        ExitCode::from(EXIT_RUNTIME_ERROR)
    } else {
        ExitCode::from(EXIT_PASS)
    }
}

fn resolve_layout(args: &LayoutArgs) -> Result<RegisterMap> {
    let Some(path) = &args.config else {
        return Ok(RegisterMap::default());
    };
    let config = BridgeConfig::from_file(path)?;
    let map = RegisterMap::with_overrides(&config.registers)?;
    map.validate(config.region_size()?)?;
    Ok(map)
}

fn layout(args: LayoutArgs) -> ExitCode {
    let map = match resolve_layout(&args) {
        Ok(map) => map,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match serde_json::to_string_pretty(&map) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::from(EXIT_PASS)
        }
        Err(e) => {
            error!("Failed to serialize register map: {}", e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}
