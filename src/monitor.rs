//! The monitoring loop.
//!
//! Sample a window, ship the raw histogram to the log collector, categorize,
//! report. Forever. Any reporting failure ends the loop with an error so the
//! process supervisor can restart the device cleanly.

use crate::clock::ClockSync;
use crate::config::Config;
use crate::core::{categorize, CategoryCounts, Histogram, SampleAggregator, Thresholds};
use crate::hal::{AnalogInput, Clock, HardwareError, StatusIndicator, TimeSync, Wlan};
use crate::network::{ConnectivityManager, NetworkError, WifiCredentials};
use crate::reporter::{CollectorEndpoint, MetricsTransport, ReportError, Reporter};
use crate::syslog::LogSink;
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;

/// The peripherals the monitor runs on.
pub struct Board<A, I, W, T, C> {
    pub adc: A,
    pub indicator: I,
    pub wlan: W,
    pub time_sync: T,
    pub clock: C,
}

/// Errors that stop the monitor.
#[derive(Debug)]
pub enum MonitorError {
    Sensor(HardwareError),
    Network(NetworkError),
    Report(ReportError),
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::Sensor(e) => write!(f, "Sensor error: {e}"),
            MonitorError::Network(e) => write!(f, "{e}"),
            MonitorError::Report(e) => write!(f, "Report failed: {e}"),
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MonitorError::Sensor(e) => Some(e),
            MonitorError::Network(e) => Some(e),
            MonitorError::Report(e) => Some(e),
        }
    }
}

impl From<HardwareError> for MonitorError {
    fn from(e: HardwareError) -> Self {
        MonitorError::Sensor(e)
    }
}

impl From<NetworkError> for MonitorError {
    fn from(e: NetworkError) -> Self {
        MonitorError::Network(e)
    }
}

impl From<ReportError> for MonitorError {
    fn from(e: ReportError) -> Self {
        MonitorError::Report(e)
    }
}

/// Everything one loop iteration produced.
#[derive(Debug, Clone, Serialize)]
pub struct WindowReport {
    pub histogram: Histogram,
    pub counts: CategoryCounts,
}

/// Sampling, categorization and reporting wired together.
pub struct Monitor<A, I, W, T, C, L, S> {
    sampler: SampleAggregator<A, I, C>,
    reporter: Reporter<W, T, C, L, S>,
    thresholds: Thresholds,
    window: Duration,
    sample_delay: Duration,
    log: L,
}

impl<A, I, W, T, C, L, S> Monitor<A, I, W, T, C, L, S>
where
    A: AnalogInput,
    I: StatusIndicator,
    W: Wlan,
    T: TimeSync,
    C: Clock + Clone,
    L: LogSink + Clone,
    S: MetricsTransport,
{
    pub fn new(config: &Config, board: Board<A, I, W, T, C>, log: L, transport: S) -> Self {
        let Board {
            adc,
            indicator,
            wlan,
            time_sync,
            clock,
        } = board;

        let clock_sync = ClockSync::new(time_sync, clock.clone(), config.ntp.attempts);
        let credentials = WifiCredentials {
            ssid: config.wifi.ssid.clone(),
            password: config.wifi.password.clone(),
        };
        let network =
            ConnectivityManager::new(wlan, credentials, clock_sync, clock.clone(), log.clone())
                .with_timeout(config.wifi.timeout);
        let endpoint = CollectorEndpoint {
            host: config.graphite.host.clone(),
            port: config.graphite.port,
            prefix: config.graphite.prefix.clone(),
        };

        Self {
            sampler: SampleAggregator::new(adc, indicator, clock.clone()),
            reporter: Reporter::new(network, transport, clock, endpoint),
            thresholds: config.rumble,
            window: config.monitor.window,
            sample_delay: config.monitor.delay,
            log,
        }
    }

    /// Bring the network up, then loop until something fails.
    pub fn run(&mut self) -> Result<Infallible, MonitorError> {
        tracing::info!(
            "Monitoring: {:.1}s windows, {:.3}s sample delay, thresholds {}/{}",
            self.window.as_secs_f64(),
            self.sample_delay.as_secs_f64(),
            self.thresholds.no_top(),
            self.thresholds.maybe_top()
        );
        self.reporter.network_mut().ensure_connected()?;

        loop {
            self.run_once()?;
        }
    }

    /// One pass: sample, log, categorize, report.
    pub fn run_once(&mut self) -> Result<WindowReport, MonitorError> {
        let histogram = self
            .sampler
            .collect_window(self.window, self.sample_delay)?;

        if let Err(e) = self.log.info(&format!("Raw reads: |{histogram}|")) {
            tracing::warn!("Could not ship raw histogram: {e}");
        }

        let counts = categorize(&histogram, &self.thresholds);
        tracing::info!("Window categorized: {counts}");

        self.reporter.report(&counts)?;

        Ok(WindowReport { histogram, counts })
    }

    /// Collect and categorize a window without reporting it.
    pub fn sample_once(&mut self) -> Result<WindowReport, MonitorError> {
        let histogram = self
            .sampler
            .collect_window(self.window, self.sample_delay)?;
        let counts = categorize(&histogram, &self.thresholds);
        Ok(WindowReport { histogram, counts })
    }
}
