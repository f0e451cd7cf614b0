//! Hardware abstraction for the furnace monitor.
//!
//! The monitor core only talks to the board through these traits. The
//! production bindings for a Linux single-board computer live in [`linux`];
//! [`sim`] provides in-memory stand-ins for tests and dry runs.

pub mod linux;
pub mod sim;

use std::net::IpAddr;
use std::time::Duration;

pub use linux::{NmcliWlan, SysfsAdc, SysfsLed, SystemClock};

/// A single analog input channel.
pub trait AnalogInput {
    /// Read one raw sample. The range is fixed by the converter (0-1023 for
    /// a 10-bit ADC).
    fn read(&mut self) -> Result<u16, HardwareError>;
}

/// A binary status output, typically the on-board LED.
pub trait StatusIndicator {
    fn set(&mut self, on: bool) -> Result<(), HardwareError>;
    fn toggle(&mut self) -> Result<(), HardwareError>;
}

/// The wireless station interface.
pub trait Wlan {
    /// Whether the interface is currently associated with a network.
    fn is_connected(&mut self) -> bool;

    /// Power the radio up or down. Deactivating drops any association.
    fn activate(&mut self, active: bool) -> Result<(), HardwareError>;

    /// Start associating with the given network. Returns once the request
    /// has been issued; callers poll [`Wlan::is_connected`] for completion.
    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), HardwareError>;

    /// Address information of the associated interface.
    fn local_address_info(&mut self) -> Result<AddressInfo, HardwareError>;
}

/// Address of the associated interface, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    pub address: IpAddr,
    pub interface: Option<String>,
}

impl std::fmt::Display for AddressInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.interface {
            Some(name) => write!(f, "{} ({name})", self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Time as seen by the device.
///
/// `epoch_seconds` counts from the platform epoch (2000-01-01T00:00:00Z),
/// not the Unix epoch; see [`crate::clock::current_timestamp`].
pub trait Clock {
    /// Monotonic time since an arbitrary fixed point.
    fn monotonic(&self) -> Duration;

    /// Wall-clock seconds since the platform epoch.
    fn epoch_seconds(&self) -> u64;

    /// Block the calling thread.
    fn sleep(&self, duration: Duration);
}

/// The primitive that sets the device clock from a network time source.
pub trait TimeSync {
    fn set_time(&mut self) -> Result<(), crate::clock::SyncError>;
}

/// Errors reported by board peripherals.
#[derive(Debug)]
pub enum HardwareError {
    /// Reading or writing a device node failed
    Io {
        path: String,
        source: std::io::Error,
    },
    /// The device returned something that is not a sample
    InvalidReading(String),
    /// An external helper command failed
    Command { command: String, message: String },
}

impl std::fmt::Display for HardwareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardwareError::Io { path, source } => write!(f, "I/O error on {path}: {source}"),
            HardwareError::InvalidReading(raw) => write!(f, "Invalid reading: {raw:?}"),
            HardwareError::Command { command, message } => {
                write!(f, "Command `{command}` failed: {message}")
            }
        }
    }
}

impl std::error::Error for HardwareError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HardwareError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_address_info_display() {
        let info = AddressInfo {
            address: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 40)),
            interface: Some("wlan0".to_string()),
        };
        assert_eq!(info.to_string(), "192.168.1.40 (wlan0)");

        let bare = AddressInfo {
            address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            interface: None,
        };
        assert_eq!(bare.to_string(), "10.0.0.2");
    }
}
