//! Furnace Monitor - burner activity reporting from a vibration sensor.
//!
//! A vibration sensor on the furnace is sampled continuously. Each sampling
//! window is folded into a histogram of raw readings, split into three
//! activity tiers and reported to a Graphite collector, while diagnostics go
//! to a remote syslog.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Furnace Monitor                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │   Sampler   │──▶│ Categorizer │──▶│  Reporter   │──▶ TCP │
//! │  │ (histogram) │   │ (no/maybe/  │   │ (plaintext) │        │
//! │  └─────────────┘   │    yes)     │   └─────────────┘        │
//! │         │          └─────────────┘          │               │
//! │         ▼                                   ▼               │
//! │  ┌─────────────┐                     ┌─────────────┐        │
//! │  │   Syslog    │                     │Connectivity │        │
//! │  │ (raw reads) │                     │ + ClockSync │        │
//! │  └─────────────┘                     └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use furnace_monitor::config::Config;
//! use furnace_monitor::hal::{NmcliWlan, SysfsAdc, SysfsLed, SystemClock};
//! use furnace_monitor::{Board, Monitor, SntpTimeSync, SyslogClient, TcpTransport};
//!
//! let config = Config::load(&Config::config_path()).expect("invalid configuration");
//! let clock = SystemClock::new();
//! let board = Board {
//!     adc: SysfsAdc::new(&config.board.adc_device, config.monitor.pin),
//!     indicator: SysfsLed::new(&config.board.led, config.board.led_active_low),
//!     wlan: NmcliWlan::new(config.board.wifi_interface.clone()),
//!     time_sync: SntpTimeSync::new(&config.ntp.server, clock.correction()),
//!     clock,
//! };
//! let log = SyslogClient::new(&config.syslog.host, config.syslog.port);
//! let mut monitor = Monitor::new(&config, board, log, TcpTransport::default());
//! monitor.run().expect("monitor stopped");
//! ```

pub mod clock;
pub mod config;
pub mod core;
pub mod hal;
pub mod monitor;
pub mod network;
pub mod reporter;
pub mod syslog;

// Re-export key types at crate root for convenience
pub use clock::{current_timestamp, ClockSync, SntpTimeSync, SyncOutcome};
pub use config::{Config, ConfigError, ConfigStore, IniConfig};
pub use core::{categorize, Category, CategoryCounts, Histogram, SampleAggregator, Thresholds};
pub use monitor::{Board, Monitor, MonitorError, WindowReport};
pub use network::{ConnectivityManager, NetworkError};
pub use reporter::{MetricsTransport, ReportError, Reporter, TcpTransport};
pub use syslog::{LogSink, Severity, SyslogClient};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
