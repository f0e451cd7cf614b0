//! Linux single-board computer bindings.
//!
//! The ADC and LED are driven through sysfs (IIO and LED class drivers),
//! Wi-Fi association through NetworkManager's `nmcli`.

use super::{AddressInfo, AnalogInput, Clock, HardwareError, StatusIndicator, Wlan};
use crate::clock::PLATFORM_EPOCH_OFFSET_SECS;
use std::net::UdpSocket;
use std::path::{Path, PathBuf};
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// One channel of an IIO analog-to-digital converter.
#[derive(Debug, Clone)]
pub struct SysfsAdc {
    path: PathBuf,
}

impl SysfsAdc {
    /// Open channel `pin` of the IIO device at `device`
    /// (e.g. `/sys/bus/iio/devices/iio:device0`).
    pub fn new(device: impl AsRef<Path>, pin: u8) -> Self {
        Self {
            path: device.as_ref().join(format!("in_voltage{pin}_raw")),
        }
    }
}

impl AnalogInput for SysfsAdc {
    fn read(&mut self) -> Result<u16, HardwareError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| HardwareError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        raw.trim()
            .parse()
            .map_err(|_| HardwareError::InvalidReading(raw.trim().to_string()))
    }
}

/// An LED exposed by the LED class driver.
#[derive(Debug, Clone)]
pub struct SysfsLed {
    brightness: PathBuf,
    active_low: bool,
    lit: bool,
}

impl SysfsLed {
    /// `name` is the directory under `/sys/class/leds`.
    pub fn new(name: &str, active_low: bool) -> Self {
        Self::at_path(
            Path::new("/sys/class/leds").join(name).join("brightness"),
            active_low,
        )
    }

    pub fn at_path(brightness: impl Into<PathBuf>, active_low: bool) -> Self {
        Self {
            brightness: brightness.into(),
            active_low,
            lit: false,
        }
    }

    fn write_level(&self, high: bool) -> Result<(), HardwareError> {
        std::fs::write(&self.brightness, if high { "1" } else { "0" }).map_err(|source| {
            HardwareError::Io {
                path: self.brightness.display().to_string(),
                source,
            }
        })
    }
}

impl StatusIndicator for SysfsLed {
    fn set(&mut self, on: bool) -> Result<(), HardwareError> {
        // Active-low wiring lights the LED when the line is pulled low
        self.write_level(on != self.active_low)?;
        self.lit = on;
        Ok(())
    }

    fn toggle(&mut self) -> Result<(), HardwareError> {
        self.set(!self.lit)
    }
}

/// Wi-Fi station interface managed by NetworkManager.
#[derive(Debug, Clone, Default)]
pub struct NmcliWlan {
    interface: Option<String>,
}

impl NmcliWlan {
    /// `interface` pins association to one device; `None` lets
    /// NetworkManager pick.
    pub fn new(interface: Option<String>) -> Self {
        Self { interface }
    }

    fn nmcli(&self, args: &[&str]) -> Result<String, HardwareError> {
        self.nmcli_with_input(args, None)
    }

    /// Run `nmcli`, feeding `input` on stdin. Secrets go this way so they
    /// never show up in the process list.
    fn nmcli_with_input(
        &self,
        args: &[&str],
        input: Option<&str>,
    ) -> Result<String, HardwareError> {
        let command = format!("nmcli {}", args.join(" "));
        let command_error = |e: std::io::Error| HardwareError::Command {
            command: command.clone(),
            message: e.to_string(),
        };

        let mut child = Command::new("nmcli")
            .args(args)
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(command_error)?;
        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            writeln!(stdin, "{input}").map_err(command_error)?;
        }
        let output = child.wait_with_output().map_err(command_error)?;

        if !output.status.success() {
            return Err(HardwareError::Command {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Wlan for NmcliWlan {
    fn is_connected(&mut self) -> bool {
        let state = match &self.interface {
            Some(ifname) => self.nmcli(&["-t", "-f", "GENERAL.STATE", "device", "show", ifname]),
            None => self.nmcli(&["-t", "-f", "STATE", "general"]),
        };
        match state {
            Ok(out) => is_connected_state(&out),
            Err(e) => {
                tracing::debug!("Could not query network state: {e}");
                false
            }
        }
    }

    fn activate(&mut self, active: bool) -> Result<(), HardwareError> {
        self.nmcli(&["radio", "wifi", if active { "on" } else { "off" }])
            .map(|_| ())
    }

    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), HardwareError> {
        let args = connect_args(ssid, self.interface.as_deref());
        self.nmcli_with_input(&args, Some(password)).map(|_| ())
    }

    fn local_address_info(&mut self) -> Result<AddressInfo, HardwareError> {
        // A connected UDP socket exposes the source address the kernel
        // would route through; nothing is sent.
        let probe = || -> std::io::Result<std::net::SocketAddr> {
            let socket = UdpSocket::bind("0.0.0.0:0")?;
            socket.connect("192.0.2.1:9")?;
            socket.local_addr()
        };
        let local = probe().map_err(|source| HardwareError::Io {
            path: "udp route probe".to_string(),
            source,
        })?;
        Ok(AddressInfo {
            address: local.ip(),
            interface: self.interface.clone(),
        })
    }
}

/// `--ask` makes nmcli read the password from stdin.
fn connect_args<'a>(ssid: &'a str, interface: Option<&'a str>) -> Vec<&'a str> {
    let mut args = vec!["--ask", "--wait", "0", "device", "wifi", "connect", ssid];
    if let Some(ifname) = interface {
        args.extend(["ifname", ifname]);
    }
    args
}

/// `nmcli` reports e.g. `connected`, `connected (site only)` or
/// `100 (connected)` depending on the query.
fn is_connected_state(output: &str) -> bool {
    output.lines().any(|line| {
        let value = line.rsplit(':').next().unwrap_or(line).trim();
        value == "connected" || value.ends_with("(connected)")
    })
}

/// Seconds added to the system time, learned from the last time sync.
///
/// Shared between [`SystemClock`] and [`crate::clock::SntpTimeSync`] the way
/// the board's RTC is shared between the time sync and the rest of the
/// firmware.
#[derive(Debug, Clone, Default)]
pub struct ClockCorrection(Arc<AtomicI64>);

impl ClockCorrection {
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, secs: i64) {
        self.0.store(secs, Ordering::Relaxed);
    }
}

/// Host clock: `Instant` for monotonic time, corrected system time for
/// wall-clock seconds since the platform epoch.
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
    correction: ClockCorrection,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::with_correction(ClockCorrection::default())
    }

    pub fn with_correction(correction: ClockCorrection) -> Self {
        Self {
            start: Instant::now(),
            correction,
        }
    }

    /// Handle for the time sync to adjust this clock.
    pub fn correction(&self) -> ClockCorrection {
        self.correction.clone()
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> Duration {
        self.start.elapsed()
    }

    fn epoch_seconds(&self) -> u64 {
        let unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
            + self.correction.get();
        (unix - PLATFORM_EPOCH_OFFSET_SECS as i64).max(0) as u64
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
