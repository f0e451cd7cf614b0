//! Simulated board.
//!
//! In-memory stand-ins for every collaborator of the monitor. Each type is a
//! cheap handle over shared state: keep a clone to script behaviour and
//! inspect what the monitor did after handing the original over.

use super::{AddressInfo, AnalogInput, Clock, HardwareError, StatusIndicator, TimeSync, Wlan};
use super::linux::SystemClock;
use crate::clock::SyncError;
use crate::monitor::Board;
use crate::reporter::{MetricsTransport, ReportError};
use crate::syslog::{LogSink, Severity};
use std::cell::{Cell, RefCell};
use std::net::{IpAddr, Ipv4Addr};
use std::rc::Rc;
use std::time::Duration;

/// Manually driven clock. Time only moves on `sleep` and `advance`.
#[derive(Debug, Clone)]
pub struct SimClock {
    now: Rc<Cell<Duration>>,
    start_epoch: u64,
    /// Seconds the device clock is off from true time until synced
    drift: Rc<Cell<i64>>,
}

impl SimClock {
    /// A clock whose platform-epoch reading starts at `start_epoch`.
    pub fn new(start_epoch: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(Duration::ZERO)),
            start_epoch,
            drift: Rc::new(Cell::new(0)),
        }
    }

    /// Make the device clock read `drift` seconds off until the next sync.
    pub fn with_drift(self, drift: i64) -> Self {
        self.drift.set(drift);
        self
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }

    fn correct(&self) {
        self.drift.set(0);
    }
}

impl Clock for SimClock {
    fn monotonic(&self) -> Duration {
        self.now.get()
    }

    fn epoch_seconds(&self) -> u64 {
        let secs = self.start_epoch as i64 + self.now.get().as_secs() as i64 + self.drift.get();
        secs.max(0) as u64
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Board for a dry run: scripted readings paced by the host clock, so a
/// zero sample delay still ends the window. The station never associates.
pub fn dry_run_board(
    readings: Vec<u16>,
) -> Board<ScriptedAdc, SimLed, SimWlan, SimTimeSync, SystemClock> {
    Board {
        adc: ScriptedAdc::new(readings),
        indicator: SimLed::new(),
        wlan: SimWlan::unreachable(),
        time_sync: SimTimeSync::always_ok(SimClock::new(0)),
        clock: SystemClock::new(),
    }
}

/// Replays a fixed sequence of readings, wrapping around at the end.
#[derive(Debug, Clone)]
pub struct ScriptedAdc {
    readings: Rc<Vec<u16>>,
    reads: Rc<Cell<usize>>,
}

impl ScriptedAdc {
    pub fn new(readings: Vec<u16>) -> Self {
        Self {
            readings: Rc::new(readings),
            reads: Rc::new(Cell::new(0)),
        }
    }

    /// Number of samples taken so far.
    pub fn reads(&self) -> usize {
        self.reads.get()
    }
}

impl AnalogInput for ScriptedAdc {
    fn read(&mut self) -> Result<u16, HardwareError> {
        if self.readings.is_empty() {
            return Err(HardwareError::InvalidReading("no scripted readings".to_string()));
        }
        let n = self.reads.get();
        self.reads.set(n + 1);
        Ok(self.readings[n % self.readings.len()])
    }
}

/// Records indicator changes.
#[derive(Debug, Clone, Default)]
pub struct SimLed {
    lit: Rc<Cell<bool>>,
    toggles: Rc<Cell<usize>>,
}

impl SimLed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_lit(&self) -> bool {
        self.lit.get()
    }

    pub fn toggles(&self) -> usize {
        self.toggles.get()
    }
}

impl StatusIndicator for SimLed {
    fn set(&mut self, on: bool) -> Result<(), HardwareError> {
        self.lit.set(on);
        Ok(())
    }

    fn toggle(&mut self) -> Result<(), HardwareError> {
        self.toggles.set(self.toggles.get() + 1);
        self.lit.set(!self.lit.get());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct WlanState {
    active: bool,
    associated: bool,
    /// Polls remaining before a pending association completes
    pending: Option<u32>,
    /// Polls an association takes; `None` means it never completes
    association_polls: Option<u32>,
    radio_failure: bool,
    /// Connect requests still to be rejected outright
    refuse_connects: u32,
    /// Connect requests still to be accepted but never acted on
    ignore_connects: u32,
    activations: Vec<bool>,
    connects: Vec<(String, String)>,
}

/// Scripted station interface.
#[derive(Debug, Clone)]
pub struct SimWlan {
    state: Rc<RefCell<WlanState>>,
}

impl SimWlan {
    fn with_state(state: WlanState) -> Self {
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Already associated; reassociation completes on the first poll.
    pub fn associated() -> Self {
        Self::with_state(WlanState {
            active: true,
            associated: true,
            association_polls: Some(0),
            ..WlanState::default()
        })
    }

    /// Not associated; association completes after `polls` failed polls.
    pub fn disconnected(polls: u32) -> Self {
        Self::with_state(WlanState {
            association_polls: Some(polls),
            ..WlanState::default()
        })
    }

    /// The access point never answers.
    pub fn unreachable() -> Self {
        Self::with_state(WlanState::default())
    }

    pub fn is_associated(&self) -> bool {
        self.state.borrow().associated
    }

    /// Simulate losing the access point.
    pub fn drop_association(&self) {
        let mut state = self.state.borrow_mut();
        state.associated = false;
        state.pending = None;
    }

    pub fn set_radio_failure(&self, failing: bool) {
        self.state.borrow_mut().radio_failure = failing;
    }

    /// Reject the next `count` connect requests, as when the access point
    /// is not yet visible after powering the radio.
    pub fn refuse_connects(&self, count: u32) {
        self.state.borrow_mut().refuse_connects = count;
    }

    /// Accept the next `count` connect requests without ever associating.
    pub fn ignore_connects(&self, count: u32) {
        self.state.borrow_mut().ignore_connects = count;
    }

    pub fn activations(&self) -> Vec<bool> {
        self.state.borrow().activations.clone()
    }

    pub fn connects(&self) -> Vec<(String, String)> {
        self.state.borrow().connects.clone()
    }
}

impl Wlan for SimWlan {
    fn is_connected(&mut self) -> bool {
        let mut state = self.state.borrow_mut();
        if state.associated {
            return true;
        }
        match state.pending {
            Some(0) => {
                state.pending = None;
                state.associated = true;
                true
            }
            Some(n) => {
                state.pending = Some(n - 1);
                false
            }
            None => false,
        }
    }

    fn activate(&mut self, active: bool) -> Result<(), HardwareError> {
        let mut state = self.state.borrow_mut();
        if state.radio_failure {
            return Err(HardwareError::Command {
                command: "activate".to_string(),
                message: "radio not responding".to_string(),
            });
        }
        state.activations.push(active);
        state.active = active;
        if !active {
            state.associated = false;
            state.pending = None;
        }
        Ok(())
    }

    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), HardwareError> {
        let mut state = self.state.borrow_mut();
        if !state.active {
            return Err(HardwareError::Command {
                command: "connect".to_string(),
                message: "interface not active".to_string(),
            });
        }
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            return Err(HardwareError::Command {
                command: "connect".to_string(),
                message: format!("No network with SSID '{ssid}' found"),
            });
        }
        state.connects.push((ssid.to_string(), password.to_string()));
        if state.ignore_connects > 0 {
            state.ignore_connects -= 1;
            return Ok(());
        }
        state.pending = state.association_polls;
        Ok(())
    }

    fn local_address_info(&mut self) -> Result<AddressInfo, HardwareError> {
        Ok(AddressInfo {
            address: IpAddr::V4(Ipv4Addr::new(192, 168, 4, 20)),
            interface: Some("sim0".to_string()),
        })
    }
}

#[derive(Debug, Default)]
struct TimeSyncState {
    failing: bool,
    fail_first: u32,
    attempts: u32,
}

/// Scripted time source. A successful sync removes the clock's drift.
#[derive(Debug, Clone)]
pub struct SimTimeSync {
    clock: SimClock,
    state: Rc<RefCell<TimeSyncState>>,
}

impl SimTimeSync {
    pub fn always_ok(clock: SimClock) -> Self {
        Self::failing_first(clock, 0)
    }

    /// Fails the first `failures` attempts, then succeeds.
    pub fn failing_first(clock: SimClock, failures: u32) -> Self {
        Self {
            clock,
            state: Rc::new(RefCell::new(TimeSyncState {
                fail_first: failures,
                ..TimeSyncState::default()
            })),
        }
    }

    /// Make every following attempt fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.state.borrow_mut().failing = failing;
    }

    pub fn attempts(&self) -> u32 {
        self.state.borrow().attempts
    }
}

impl TimeSync for SimTimeSync {
    fn set_time(&mut self) -> Result<(), SyncError> {
        let mut state = self.state.borrow_mut();
        state.attempts += 1;
        if state.failing {
            return Err(SyncError::Timeout);
        }
        if state.fail_first > 0 {
            state.fail_first -= 1;
            return Err(SyncError::Timeout);
        }
        self.clock.correct();
        Ok(())
    }
}

/// Collects log messages in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    entries: Rc<RefCell<Vec<(Severity, String)>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Severity, String)> {
        self.entries.borrow().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl LogSink for MemoryLog {
    fn log(&self, severity: Severity, message: &str) -> std::io::Result<()> {
        self.entries
            .borrow_mut()
            .push((severity, message.to_string()));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TransportState {
    refuse: bool,
    fail_after_writes: Option<usize>,
    writes: usize,
    connects: Vec<(String, u16)>,
    data: Vec<u8>,
    closed: usize,
}

/// Records everything written to the collector.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Rc<RefCell<TransportState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_refuse_connections(&self, refuse: bool) {
        self.state.borrow_mut().refuse = refuse;
    }

    /// Let `writes` writes through, then fail every write.
    pub fn fail_after_writes(&self, writes: usize) {
        self.state.borrow_mut().fail_after_writes = Some(writes);
    }

    pub fn connects(&self) -> Vec<(String, u16)> {
        self.state.borrow().connects.clone()
    }

    /// Number of connections opened and since closed.
    pub fn closed(&self) -> usize {
        self.state.borrow().closed
    }

    /// Received data split into lines, newline kept.
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.state.borrow().data)
            .split_inclusive('\n')
            .map(str::to_string)
            .collect()
    }
}

impl MetricsTransport for MemoryTransport {
    type Stream = MemoryStream;

    fn connect(&mut self, host: &str, port: u16) -> Result<MemoryStream, ReportError> {
        let mut state = self.state.borrow_mut();
        if state.refuse {
            return Err(ReportError::Connect {
                addr: format!("{host}:{port}"),
                source: std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ),
            });
        }
        state.connects.push((host.to_string(), port));
        Ok(MemoryStream {
            state: Rc::clone(&self.state),
        })
    }
}

/// An open [`MemoryTransport`] connection.
#[derive(Debug)]
pub struct MemoryStream {
    state: Rc<RefCell<TransportState>>,
}

impl std::io::Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.state.borrow_mut();
        if state.fail_after_writes.is_some_and(|limit| state.writes >= limit) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection reset",
            ));
        }
        state.writes += 1;
        state.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        self.state.borrow_mut().closed += 1;
    }
}
