//! Integration tests for the monitoring loop on a simulated board

use furnace_monitor::config::{Config, IniConfig};
use furnace_monitor::hal::sim::{
    self, MemoryLog, MemoryTransport, ScriptedAdc, SimClock, SimLed, SimTimeSync, SimWlan,
};
use furnace_monitor::hal::Clock;
use furnace_monitor::{
    Board, CategoryCounts, Monitor, MonitorError, ReportError, Severity,
};
use std::time::Duration;

const UNIX_OFFSET: u64 = 946_684_800;

/// Ten one-second samples: {50: 3, 100: 2, 499: 1, 500: 4}
const REFERENCE_WINDOW: [u16; 10] = [50, 500, 100, 50, 499, 500, 100, 500, 50, 500];

fn test_config(extra: &str) -> Config {
    let content = format!(
        "[wifi]\nssid = basement\npassword = hunter2\n\
         [syslog]\nhost = 127.0.0.1\n\
         [ntp]\nattempts = 3\n\
         [rumble]\nno_top = 100\nmaybe_top = 500\n\
         [monitor]\npin = 0\ndelay = 1\nwindow = 10\n\
         [graphite]\nhost = collector.test\n\
         {extra}"
    );
    Config::from_store(&IniConfig::parse_str(&content)).expect("test config is valid")
}

struct Rig {
    clock: SimClock,
    wlan: SimWlan,
    time_sync: SimTimeSync,
    led: SimLed,
    log: MemoryLog,
    transport: MemoryTransport,
}

type SimMonitor =
    Monitor<ScriptedAdc, SimLed, SimWlan, SimTimeSync, SimClock, MemoryLog, MemoryTransport>;

fn rig(config: &Config, clock: SimClock, wlan: SimWlan, readings: &[u16]) -> (SimMonitor, Rig) {
    let time_sync = SimTimeSync::always_ok(clock.clone());
    let led = SimLed::new();
    let log = MemoryLog::new();
    let transport = MemoryTransport::new();

    let board = Board {
        adc: ScriptedAdc::new(readings.to_vec()),
        indicator: led.clone(),
        wlan: wlan.clone(),
        time_sync: time_sync.clone(),
        clock: clock.clone(),
    };
    let monitor = Monitor::new(config, board, log.clone(), transport.clone());

    (
        monitor,
        Rig {
            clock,
            wlan,
            time_sync,
            led,
            log,
            transport,
        },
    )
}

#[test]
fn test_reference_window_end_to_end() {
    let config = test_config("");
    let (mut monitor, rig) = rig(
        &config,
        SimClock::new(700_000_000),
        SimWlan::associated(),
        &REFERENCE_WINDOW,
    );

    let report = monitor.run_once().unwrap();

    assert_eq!(
        report.counts,
        CategoryCounts {
            no: 3,
            maybe: 3,
            yes: 4
        }
    );
    assert_eq!(report.histogram.total(), 10);
    assert_eq!(rig.led.toggles(), 10);
    assert!(!rig.led.is_lit());

    let ts = 700_000_010 + UNIX_OFFSET;
    assert_eq!(
        rig.transport.lines(),
        vec![
            format!("iot.home.oilburner.no 3 {ts}\n"),
            format!("iot.home.oilburner.maybe 3 {ts}\n"),
            format!("iot.home.oilburner.yes 4 {ts}\n"),
        ]
    );
    assert_eq!(
        rig.transport.connects(),
        vec![("collector.test".to_string(), 2003)]
    );
    assert_eq!(
        rig.log.entries(),
        vec![(
            Severity::Info,
            "Raw reads: |50:3, 100:2, 499:1, 500:4|".to_string()
        )]
    );
}

#[test]
fn test_first_report_associates_and_syncs_clock() {
    let config = test_config("");
    // Device clock is an hour behind until the first sync
    let clock = SimClock::new(700_000_000).with_drift(-3_600);
    let (mut monitor, rig) = rig(&config, clock, SimWlan::disconnected(4), &[10]);

    monitor.run_once().unwrap();

    assert!(rig.wlan.is_associated());
    assert_eq!(rig.time_sync.attempts(), 1);
    assert_eq!(
        rig.log.messages(),
        vec!["Raw reads: |10:10|".to_string(), "Network activated".to_string()]
    );

    // Window (10s) plus four association polls, with the drift removed
    let elapsed = rig.clock.monotonic().as_secs();
    assert_eq!(elapsed, 10);
    let ts = 700_000_000 + elapsed + UNIX_OFFSET;
    assert!(rig
        .transport
        .lines()
        .iter()
        .all(|line| line.ends_with(&format!(" {ts}\n"))));
}

#[test]
fn test_lost_association_is_recovered_before_next_report() {
    let config = test_config("");
    let (mut monitor, rig) = rig(
        &config,
        SimClock::new(0),
        SimWlan::associated(),
        &REFERENCE_WINDOW,
    );

    monitor.run_once().unwrap();
    rig.wlan.drop_association();
    monitor.run_once().unwrap();

    assert!(rig.wlan.is_associated());
    assert_eq!(rig.wlan.connects().len(), 1);
    assert_eq!(rig.transport.lines().len(), 6);
    assert_eq!(rig.transport.closed(), 2);
    assert!(rig
        .log
        .messages()
        .contains(&"Network activated".to_string()));
}

#[test]
fn test_clock_sync_throttled_across_windows() {
    let config = test_config("");
    let (mut monitor, rig) = rig(&config, SimClock::new(0), SimWlan::associated(), &[700]);

    // Reports at t = 10, 20, ..., 600: one sync at t = 10 covers them all
    for _ in 0..60 {
        monitor.run_once().unwrap();
    }
    assert_eq!(rig.time_sync.attempts(), 1);

    // t = 610 is the first report a full interval after the sync
    monitor.run_once().unwrap();
    assert_eq!(rig.time_sync.attempts(), 2);
}

#[test]
fn test_failed_sync_retried_on_next_report() {
    let config = test_config("");
    let (mut monitor, rig) = rig(&config, SimClock::new(0), SimWlan::associated(), &[700]);
    rig.time_sync.set_failing(true);

    monitor.run_once().unwrap();
    assert_eq!(rig.time_sync.attempts(), 3);

    // Reporting still happened and the next window retries the sync
    assert_eq!(rig.transport.lines().len(), 3);
    monitor.run_once().unwrap();
    assert_eq!(rig.time_sync.attempts(), 6);
}

#[test]
fn test_report_failure_stops_the_loop() {
    let config = test_config("");
    let (mut monitor, rig) = rig(&config, SimClock::new(0), SimWlan::associated(), &[700]);
    rig.transport.set_refuse_connections(true);

    let err = monitor.run().unwrap_err();

    assert!(matches!(
        err,
        MonitorError::Report(ReportError::Connect { .. })
    ));
    // One window was sampled and logged before the failure
    assert_eq!(rig.log.messages().len(), 1);
}

#[test]
fn test_association_timeout_surfaces_as_network_error() {
    let config = test_config("[wifi]\ntimeout = 5\n");
    let (mut monitor, rig) = rig(&config, SimClock::new(0), SimWlan::unreachable(), &[700]);

    let err = monitor.run().unwrap_err();

    assert!(matches!(err, MonitorError::Network(_)));
    assert!(rig.clock.monotonic() >= Duration::from_secs(5));
    assert!(rig.transport.connects().is_empty());
}

#[test]
fn test_sample_once_does_not_touch_network() {
    let config = test_config("");
    let (mut monitor, rig) = rig(
        &config,
        SimClock::new(0),
        SimWlan::unreachable(),
        &REFERENCE_WINDOW,
    );

    let report = monitor.sample_once().unwrap();

    assert_eq!(report.counts.total(), 10);
    assert!(rig.wlan.connects().is_empty());
    assert!(rig.transport.connects().is_empty());
    assert!(rig.log.entries().is_empty());
}

#[test]
fn test_dry_run_with_zero_delay_ends_window() {
    let config = test_config("[monitor]\ndelay = 0\nwindow = 0.05\n");
    let board = sim::dry_run_board(vec![42, 600]);
    let transport = MemoryTransport::new();
    let mut monitor = Monitor::new(&config, board, MemoryLog::new(), transport.clone());

    let report = monitor.sample_once().unwrap();

    assert!(report.histogram.total() > 0);
    assert_eq!(report.histogram.distinct(), 2);
    assert_eq!(report.counts.total(), report.histogram.total());
    assert!(transport.connects().is_empty());
}
