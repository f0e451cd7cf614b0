//! Furnace Monitor CLI
//!
//! Runs the monitoring loop on the device, plus a couple of diagnostics.

use anyhow::Context;
use clap::{Parser, Subcommand};
use furnace_monitor::{
    config::Config,
    hal::{
        sim::{self, MemoryLog, MemoryTransport},
        NmcliWlan, SysfsAdc, SysfsLed, SystemClock,
    },
    Board, Monitor, SntpTimeSync, SyslogClient, TcpTransport, WindowReport, VERSION,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Readings replayed by `sample --simulate`: idle hum with a burner cycle.
const SIMULATED_READINGS: &[u16] = &[42, 57, 61, 48, 130, 260, 410, 520, 690, 745, 600, 95];

#[derive(Parser)]
#[command(name = "furnace-monitor")]
#[command(version = VERSION)]
#[command(about = "Furnace burner activity monitor", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring loop (default)
    Run,

    /// Collect one window and print it without reporting
    Sample {
        /// Use simulated hardware instead of the board
        #[arg(long)]
        simulate: bool,
    },

    /// Show the effective configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = cli.config.unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)
        .with_context(|| format!("Could not load configuration from {config_path:?}"))?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run(&config),
        Commands::Sample { simulate } => cmd_sample(&config, simulate),
        Commands::Config => cmd_config(&config, &config_path),
    }
}

fn cmd_run(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Furnace monitor v{VERSION} starting");

    let log = SyslogClient::new(&config.syslog.host, config.syslog.port);
    let mut monitor = Monitor::new(config, device_board(config), log, TcpTransport::default());

    match monitor.run() {
        Ok(never) => match never {},
        Err(e) => {
            tracing::error!("Monitor stopped: {e}");
            Err(e).context("Monitor stopped")
        }
    }
}

fn cmd_sample(config: &Config, simulate: bool) -> anyhow::Result<()> {
    let report = if simulate {
        let board = sim::dry_run_board(SIMULATED_READINGS.to_vec());
        Monitor::new(config, board, MemoryLog::new(), MemoryTransport::new()).sample_once()?
    } else {
        let log = SyslogClient::new(&config.syslog.host, config.syslog.port);
        Monitor::new(config, device_board(config), log, TcpTransport::default()).sample_once()?
    };

    print_report(&report)
}

/// The real peripherals described by the `[board]` section.
fn device_board(
    config: &Config,
) -> Board<SysfsAdc, SysfsLed, NmcliWlan, SntpTimeSync, SystemClock> {
    let clock = SystemClock::new();
    Board {
        adc: SysfsAdc::new(&config.board.adc_device, config.monitor.pin),
        indicator: SysfsLed::new(&config.board.led, config.board.led_active_low),
        wlan: NmcliWlan::new(config.board.wifi_interface.clone()),
        time_sync: SntpTimeSync::new(&config.ntp.server, clock.correction()),
        clock,
    }
}

fn print_report(report: &WindowReport) -> anyhow::Result<()> {
    println!("Raw reads: |{}|", report.histogram);
    println!("Categorized: {}", report.counts);
    println!();
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn cmd_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {path:?}");
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
