//! Remote diagnostic log sink.
//!
//! Diagnostic messages are shipped to a syslog collector, one UDP datagram
//! per message with no connection kept between calls.

use chrono::{DateTime, Local};
use std::net::{ToSocketAddrs, UdpSocket};

/// Default syslog port (UDP 514)
pub const SYSLOG_PORT: u16 = 514;

/// Tag placed in front of every message.
pub const APP_NAME: &str = "furnace-monitor";

/// `user-level messages` facility.
const FACILITY_USER: u8 = 1;

/// Syslog severities (RFC 5424 numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl Severity {
    /// PRI field value for this severity in the user facility.
    pub fn priority(self) -> u8 {
        FACILITY_USER * 8 + self as u8
    }
}

/// Destination for diagnostic messages.
pub trait LogSink {
    fn log(&self, severity: Severity, message: &str) -> std::io::Result<()>;

    fn info(&self, message: &str) -> std::io::Result<()> {
        self.log(Severity::Info, message)
    }
}

/// Sends RFC 3164 formatted messages to a remote syslog daemon over UDP.
#[derive(Debug, Clone)]
pub struct SyslogClient {
    host: String,
    port: u16,
    hostname: String,
}

impl SyslogClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            host: host.into(),
            port,
            hostname,
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }
}

impl LogSink for SyslogClient {
    fn log(&self, severity: Severity, message: &str) -> std::io::Result<()> {
        let packet = format_message(severity, Local::now(), &self.hostname, message);

        let target = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} did not resolve", self.host),
                )
            })?;
        let socket = if target.is_ipv4() {
            UdpSocket::bind("0.0.0.0:0")?
        } else {
            UdpSocket::bind("[::]:0")?
        };
        socket.send_to(packet.as_bytes(), target)?;
        Ok(())
    }
}

/// `<PRI>Mmm dd hh:mm:ss HOSTNAME furnace-monitor: message`
pub fn format_message(
    severity: Severity,
    time: DateTime<Local>,
    hostname: &str,
    message: &str,
) -> String {
    format!(
        "<{}>{} {hostname} {APP_NAME}: {message}",
        severity.priority(),
        time.format("%b %e %H:%M:%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[test]
    fn test_priority_values() {
        assert_eq!(Severity::Emergency.priority(), 8);
        assert_eq!(Severity::Info.priority(), 14);
        assert_eq!(Severity::Debug.priority(), 15);
    }

    #[test]
    fn test_format_message() {
        let time = Local.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        let line = format_message(Severity::Info, time, "boiler-pi", "Network activated");
        assert_eq!(
            line,
            "<14>Mar  5 07:08:09 boiler-pi furnace-monitor: Network activated"
        );
    }

    #[test]
    fn test_client_sends_one_datagram_per_message() {
        let collector = UdpSocket::bind("127.0.0.1:0").unwrap();
        collector
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = collector.local_addr().unwrap().port();

        let client = SyslogClient::new("127.0.0.1", port).with_hostname("boiler-pi");
        client.info("Raw reads: |12:3|").unwrap();
        client.log(Severity::Warning, "second").unwrap();

        let mut buf = [0u8; 512];
        let len = collector.recv(&mut buf).unwrap();
        let first = String::from_utf8_lossy(&buf[..len]).to_string();
        assert!(first.starts_with("<14>"));
        assert!(first.ends_with("boiler-pi furnace-monitor: Raw reads: |12:3|"));

        let len = collector.recv(&mut buf).unwrap();
        let second = String::from_utf8_lossy(&buf[..len]).to_string();
        assert!(second.starts_with("<12>"));
        assert!(second.ends_with(": second"));
    }
}
