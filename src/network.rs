//! Network association management.
//!
//! No network operation runs while the station is disassociated. Once the
//! association is up the clock is brought in sync, since reports carry
//! timestamps.

use crate::clock::{ClockSync, SyncOutcome};
use crate::hal::{Clock, HardwareError, TimeSync, Wlan};
use crate::syslog::LogSink;
use std::time::Duration;

/// Delay between association polls.
pub const ASSOCIATION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long an association request may stay pending before it is re-issued.
pub const ASSOCIATION_RETRY_INTERVAL: Duration = Duration::from_secs(15);

/// Network credentials and association policy.
#[derive(Debug, Clone)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

/// Errors from establishing the network.
#[derive(Debug)]
pub enum NetworkError {
    /// The radio refused a command
    Hardware(HardwareError),
    /// Association did not come up within the configured timeout
    Unavailable { waited: Duration },
}

impl std::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkError::Hardware(e) => write!(f, "Network hardware error: {e}"),
            NetworkError::Unavailable { waited } => {
                write!(f, "Network unavailable after {:.1}s", waited.as_secs_f64())
            }
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetworkError::Hardware(e) => Some(e),
            NetworkError::Unavailable { .. } => None,
        }
    }
}

impl From<HardwareError> for NetworkError {
    fn from(e: HardwareError) -> Self {
        NetworkError::Hardware(e)
    }
}

/// Keeps the station associated and the clock synchronized.
pub struct ConnectivityManager<W, T, C, L> {
    wlan: W,
    credentials: WifiCredentials,
    clock_sync: ClockSync<T, C>,
    clock: C,
    log: L,
    association_timeout: Option<Duration>,
}

impl<W, T, C, L> ConnectivityManager<W, T, C, L>
where
    W: Wlan,
    T: TimeSync,
    C: Clock + Clone,
    L: LogSink,
{
    /// The association wait is unbounded until [`Self::with_timeout`] is used.
    pub fn new(
        wlan: W,
        credentials: WifiCredentials,
        clock_sync: ClockSync<T, C>,
        clock: C,
        log: L,
    ) -> Self {
        Self {
            wlan,
            credentials,
            clock_sync,
            clock,
            log,
            association_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.association_timeout = timeout;
        self
    }

    /// Associate if needed, then sync the clock if due.
    ///
    /// Returns immediately (apart from the clock sync) when already
    /// associated.
    pub fn ensure_connected(&mut self) -> Result<SyncOutcome, NetworkError> {
        if !self.wlan.is_connected() {
            self.associate()?;
            if let Err(e) = self.log.info("Network activated") {
                tracing::warn!("Could not ship log message: {e}");
            }
        }

        match self.wlan.local_address_info() {
            Ok(info) => tracing::info!("Interface address: {info}"),
            Err(e) => tracing::warn!("Could not read interface address: {e}"),
        }

        Ok(self.clock_sync.sync_if_due())
    }

    /// Drop the association unconditionally and establish it again.
    pub fn force_reset(&mut self) -> Result<SyncOutcome, NetworkError> {
        tracing::info!("Resetting network interface");
        self.wlan.activate(false)?;
        self.ensure_connected()
    }

    fn associate(&mut self) -> Result<(), NetworkError> {
        tracing::info!("Associating with {}", self.credentials.ssid);

        let started = self.clock.monotonic();
        let mut last_request: Option<Duration> = None;
        loop {
            let now = self.clock.monotonic();
            let due = last_request
                .map_or(true, |at| now.saturating_sub(at) >= ASSOCIATION_RETRY_INTERVAL);
            if due {
                last_request = Some(now);
                if let Err(e) = self.request_association() {
                    tracing::debug!("Association request failed, will retry: {e}");
                }
            }

            if self.wlan.is_connected() {
                break;
            }

            let waited = now.saturating_sub(started);
            if let Some(limit) = self.association_timeout {
                if waited >= limit {
                    tracing::warn!("Association with {} timed out", self.credentials.ssid);
                    return Err(NetworkError::Unavailable { waited });
                }
            }
            self.clock.sleep(ASSOCIATION_POLL_INTERVAL);
        }

        tracing::info!("Network activated");
        Ok(())
    }

    fn request_association(&mut self) -> Result<(), HardwareError> {
        self.wlan.activate(true)?;
        self.wlan
            .connect(&self.credentials.ssid, &self.credentials.password)
    }
}
