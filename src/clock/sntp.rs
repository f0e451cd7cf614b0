//! SNTP client implementation
//!
//! Handles SNTP requests, DNS resolution, and server communication.

use super::SyncError;
use crate::hal::linux::ClockCorrection;
use crate::hal::TimeSync;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// SNTP port (UDP 123)
pub const NTP_PORT: u16 = 123;

/// SNTP request timeout
const SNTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970)
const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

const NTP_PACKET_LEN: usize = 48;

/// Maximum accepted stratum level
///
/// Stratum 0 is a kiss-of-death packet and 16 means unsynchronized.
const MAX_STRATUM: u8 = 15;

/// Clamp on the RTT/2 correction; a round trip over two seconds is an error
/// rather than latency worth compensating.
const MAX_RTT_CORRECTION_MICROS: u128 = 1_000_000;

/// A timestamp taken from a server reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtpTime {
    pub unix_secs: u64,
    pub micros: u32,
}

impl NtpTime {
    /// Convert an NTP seconds/fraction pair.
    pub fn from_ntp(secs: u64, frac: u32) -> Option<Self> {
        let unix_secs = secs.checked_sub(NTP_UNIX_OFFSET_SECS)?;
        let micros = ((frac as u64 * 1_000_000) >> 32) as u32;
        Some(Self { unix_secs, micros })
    }

    fn add_micros(mut self, micros: u32) -> Self {
        let total = self.micros as u64 + micros as u64;
        self.unix_secs += total / 1_000_000;
        self.micros = (total % 1_000_000) as u32;
        self
    }

    /// Whole seconds, rounded to nearest.
    pub fn rounded_secs(&self) -> u64 {
        self.unix_secs + u64::from(self.micros >= 500_000)
    }
}

/// Sets the shared clock correction from an SNTP server.
#[derive(Debug, Clone)]
pub struct SntpTimeSync {
    server: String,
    port: u16,
    timeout: Duration,
    correction: ClockCorrection,
}

impl SntpTimeSync {
    pub fn new(server: impl Into<String>, correction: ClockCorrection) -> Self {
        Self {
            server: server.into(),
            port: NTP_PORT,
            timeout: SNTP_TIMEOUT,
            correction,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one request and return the RTT-corrected server time.
    pub fn query(&self) -> Result<NtpTime, SyncError> {
        let server = resolve(&self.server, self.port)?;
        tracing::debug!("Resolved {} to {server}", self.server);

        let bind_addr: SocketAddr = if server.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).map_err(SyncError::Network)?;
        socket
            .set_read_timeout(Some(self.timeout))
            .map_err(SyncError::Network)?;

        let transmit_time = Instant::now();
        socket
            .send_to(&build_request(), server)
            .map_err(SyncError::Network)?;

        let mut response = [0u8; NTP_PACKET_LEN];
        let (len, from) = socket.recv_from(&mut response).map_err(|e| match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => SyncError::Timeout,
            _ => SyncError::Network(e),
        })?;
        let rtt = transmit_time.elapsed();

        if from.ip() != server.ip() {
            return Err(SyncError::InvalidResponse(format!(
                "reply from unexpected address {from}"
            )));
        }

        let time = parse_response(&response[..len])?;
        let correction = (rtt.as_micros() / 2).min(MAX_RTT_CORRECTION_MICROS) as u32;
        Ok(time.add_micros(correction))
    }
}

impl TimeSync for SntpTimeSync {
    fn set_time(&mut self) -> Result<(), SyncError> {
        let time = self.query()?;
        let system_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let offset = time.rounded_secs() as i64 - system_secs as i64;
        self.correction.set(offset);
        tracing::debug!(
            "SNTP time {}.{:06}, clock correction {offset}s",
            time.unix_secs,
            time.micros
        );
        Ok(())
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, SyncError> {
    (host, port)
        .to_socket_addrs()
        .map_err(SyncError::Network)?
        .next()
        .ok_or_else(|| SyncError::InvalidResponse(format!("{host} did not resolve")))
}

/// Create NTP request packet (48 bytes, Mode 3 = Client)
fn build_request() -> [u8; NTP_PACKET_LEN] {
    let mut packet = [0u8; NTP_PACKET_LEN];
    packet[0] = 0x1B; // LI=0, VN=3, Mode=3
    packet
}

fn parse_response(response: &[u8]) -> Result<NtpTime, SyncError> {
    if response.len() < NTP_PACKET_LEN {
        return Err(SyncError::InvalidResponse(format!(
            "short packet ({} bytes)",
            response.len()
        )));
    }

    let mode = response[0] & 0x07;
    if mode != 4 {
        return Err(SyncError::InvalidResponse(format!("unexpected mode {mode}")));
    }

    let stratum = response[1];
    if stratum == 0 || stratum > MAX_STRATUM {
        return Err(SyncError::InvalidStratum(stratum));
    }

    // Transmit timestamp (bytes 40-47)
    let secs = u32::from_be_bytes([response[40], response[41], response[42], response[43]]);
    let frac = u32::from_be_bytes([response[44], response[45], response[46], response[47]]);

    NtpTime::from_ntp(secs as u64, frac)
        .ok_or_else(|| SyncError::InvalidResponse("timestamp before 1970".to_string()))
}
