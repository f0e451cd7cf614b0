//! Metrics reporting to a Graphite-compatible collector.
//!
//! Uses the plaintext protocol: one `name value timestamp\n` line per metric
//! over a short-lived stream connection. Nothing is read back.

use crate::clock::current_timestamp;
use crate::core::{Category, CategoryCounts};
use crate::hal::{Clock, TimeSync, Wlan};
use crate::network::{ConnectivityManager, NetworkError};
use crate::syslog::LogSink;
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Default plaintext protocol port.
pub const CARBON_PORT: u16 = 2003;

/// Collector endpoint and metric naming.
#[derive(Debug, Clone)]
pub struct CollectorEndpoint {
    pub host: String,
    pub port: u16,
    /// Dotted prefix; each tier is reported as `<prefix>.<tier>`
    pub prefix: String,
}

/// Reporting errors. Any of these aborts the current report.
#[derive(Debug)]
pub enum ReportError {
    /// Could not establish the network
    Network(NetworkError),
    /// Collector hostname did not resolve
    Resolve {
        host: String,
        source: std::io::Error,
    },
    /// Connection to the collector failed
    Connect {
        addr: String,
        source: std::io::Error,
    },
    /// Writing a metric line failed
    Send(std::io::Error),
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::Network(e) => write!(f, "{e}"),
            ReportError::Resolve { host, source } => {
                write!(f, "Could not resolve collector {host}: {source}")
            }
            ReportError::Connect { addr, source } => {
                write!(f, "Could not connect to collector at {addr}: {source}")
            }
            ReportError::Send(e) => write!(f, "Failed to send metrics: {e}"),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Network(e) => Some(e),
            ReportError::Resolve { source, .. } | ReportError::Connect { source, .. } => {
                Some(source)
            }
            ReportError::Send(e) => Some(e),
        }
    }
}

impl From<NetworkError> for ReportError {
    fn from(e: NetworkError) -> Self {
        ReportError::Network(e)
    }
}

/// Opens stream connections to the collector.
pub trait MetricsTransport {
    type Stream: Write;

    /// Resolve `host` and connect. Resolution happens on every call.
    fn connect(&mut self, host: &str, port: u16) -> Result<Self::Stream, ReportError>;
}

/// TCP transport with a connect timeout.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl MetricsTransport for TcpTransport {
    type Stream = TcpStream;

    fn connect(&mut self, host: &str, port: u16) -> Result<TcpStream, ReportError> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|source| ReportError::Resolve {
                host: host.to_string(),
                source,
            })?
            .next()
            .ok_or_else(|| ReportError::Resolve {
                host: host.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
            })?;

        TcpStream::connect_timeout(&addr, self.timeout).map_err(|source| ReportError::Connect {
            addr: addr.to_string(),
            source,
        })
    }
}

/// A single plaintext protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLine<'a> {
    pub prefix: &'a str,
    pub category: Category,
    pub value: u64,
    pub timestamp: u64,
}

impl std::fmt::Display for MetricLine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{}.{} {} {}",
            self.prefix, self.category, self.value, self.timestamp
        )
    }
}

/// The three lines for one report, in `no`, `maybe`, `yes` order.
pub fn metric_lines<'a>(
    prefix: &'a str,
    counts: &CategoryCounts,
    timestamp: u64,
) -> Vec<MetricLine<'a>> {
    Category::ALL
        .into_iter()
        .map(|category| MetricLine {
            prefix,
            category,
            value: counts.get(category),
            timestamp,
        })
        .collect()
}

/// Sends categorized counts, making sure the network is up first.
pub struct Reporter<W, T, C, L, S> {
    network: ConnectivityManager<W, T, C, L>,
    transport: S,
    clock: C,
    endpoint: CollectorEndpoint,
}

impl<W, T, C, L, S> Reporter<W, T, C, L, S>
where
    W: Wlan,
    T: TimeSync,
    C: Clock + Clone,
    L: LogSink,
    S: MetricsTransport,
{
    pub fn new(
        network: ConnectivityManager<W, T, C, L>,
        transport: S,
        clock: C,
        endpoint: CollectorEndpoint,
    ) -> Self {
        Self {
            network,
            transport,
            clock,
            endpoint,
        }
    }

    /// Report one window. The connection is closed when this returns,
    /// whether or not every line went out.
    pub fn report(&mut self, counts: &CategoryCounts) -> Result<(), ReportError> {
        self.network.ensure_connected()?;

        let timestamp = current_timestamp(&self.clock);
        let mut stream = self
            .transport
            .connect(&self.endpoint.host, self.endpoint.port)?;

        for line in metric_lines(&self.endpoint.prefix, counts, timestamp) {
            let line = line.to_string();
            tracing::debug!("Sending line: {}", line.trim_end());
            stream
                .write_all(line.as_bytes())
                .map_err(ReportError::Send)?;
        }
        stream.flush().map_err(ReportError::Send)?;

        tracing::info!(
            "Reported {counts} to {}:{}",
            self.endpoint.host,
            self.endpoint.port
        );
        Ok(())
    }

    pub fn network_mut(&mut self) -> &mut ConnectivityManager<W, T, C, L> {
        &mut self.network
    }
}
