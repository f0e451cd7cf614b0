//! Clock synchronization and timestamps.
//!
//! The device keeps time from its own epoch (2000-01-01); every timestamp
//! that leaves the device goes through [`current_timestamp`]. Network time
//! sync is throttled by [`ClockSync`] so that a report every few seconds does
//! not hammer the time server.

pub mod sntp;

use crate::hal::{Clock, TimeSync};
use std::time::Duration;

pub use sntp::SntpTimeSync;

/// Seconds between the Unix epoch and the platform epoch (2000-01-01).
///
/// The board's real-time clock counts from 2000-01-01T00:00:00Z. This is a
/// property of the platform, not a setting.
pub const PLATFORM_EPOCH_OFFSET_SECS: u64 = 946_684_800;

/// Minimum time between two successful synchronizations.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Current Unix timestamp in seconds.
pub fn current_timestamp<C: Clock + ?Sized>(clock: &C) -> u64 {
    clock.epoch_seconds() + PLATFORM_EPOCH_OFFSET_SECS
}

/// Errors from a single time synchronization attempt.
#[derive(Debug)]
pub enum SyncError {
    /// Socket or DNS failure talking to the time server
    Network(std::io::Error),
    /// No reply within the receive timeout
    Timeout,
    /// Reply was not a usable server packet
    InvalidResponse(String),
    /// Server is unsynchronized or too far from a reference clock
    InvalidStratum(u8),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Network(e) => write!(f, "Time sync network error: {e}"),
            SyncError::Timeout => write!(f, "Time sync timed out"),
            SyncError::InvalidResponse(msg) => write!(f, "Invalid time server response: {msg}"),
            SyncError::InvalidStratum(stratum) => write!(f, "Invalid server stratum {stratum}"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Network(e) => Some(e),
            _ => None,
        }
    }
}

/// Result of a [`ClockSync::sync_if_due`] call.
#[derive(Debug)]
pub enum SyncOutcome {
    /// The last successful sync is recent enough
    NotDue { remaining: Duration },
    /// The clock was set after `attempts` tries
    Synced { attempts: u32 },
    /// Every attempt failed; the next call will try again
    Exhausted {
        attempts: u32,
        last_error: Option<SyncError>,
    },
}

impl SyncOutcome {
    /// Number of calls made to the time sync primitive.
    pub fn attempts(&self) -> u32 {
        match self {
            SyncOutcome::NotDue { .. } => 0,
            SyncOutcome::Synced { attempts } | SyncOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Throttled, bounded-retry wrapper around a [`TimeSync`] primitive.
pub struct ClockSync<T, C> {
    source: T,
    clock: C,
    interval: Duration,
    max_attempts: u32,
    /// Monotonic time of the last successful sync; `None` until the first.
    last_sync: Option<Duration>,
}

impl<T: TimeSync, C: Clock> ClockSync<T, C> {
    /// Create a sync wrapper using the standard [`SYNC_INTERVAL`].
    pub fn new(source: T, clock: C, max_attempts: u32) -> Self {
        Self::with_interval(source, clock, max_attempts, SYNC_INTERVAL)
    }

    pub fn with_interval(source: T, clock: C, max_attempts: u32, interval: Duration) -> Self {
        Self {
            source,
            clock,
            interval,
            max_attempts,
            last_sync: None,
        }
    }

    /// Synchronize the clock unless it was synchronized within the interval.
    ///
    /// Attempt failures are not escalated: after `max_attempts` failures the
    /// sync state is left untouched so the next call retries straight away.
    pub fn sync_if_due(&mut self) -> SyncOutcome {
        let now = self.clock.monotonic();
        if let Some(last) = self.last_sync {
            let elapsed = now.saturating_sub(last);
            if elapsed < self.interval {
                return SyncOutcome::NotDue {
                    remaining: self.interval - elapsed,
                };
            }
        }

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            match self.source.set_time() {
                Ok(()) => {
                    self.last_sync = Some(self.clock.monotonic());
                    tracing::info!(
                        "Clock synchronized (attempt {attempt}), timestamp {}",
                        current_timestamp(&self.clock)
                    );
                    return SyncOutcome::Synced { attempts: attempt };
                }
                Err(e) => {
                    tracing::debug!("Time sync attempt {attempt} failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        tracing::warn!(
            "Time sync failed after {} attempts, will retry on next call",
            self.max_attempts
        );
        SyncOutcome::Exhausted {
            attempts: self.max_attempts,
            last_error,
        }
    }

    /// Monotonic time of the last successful sync.
    pub fn last_sync(&self) -> Option<Duration> {
        self.last_sync
    }
}
