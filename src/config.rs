//! Configuration for the furnace monitor.
//!
//! Settings come from a line-oriented INI-style file:
//!
//! ```text
//! # comment
//! [section]
//! key = value
//! ```
//!
//! [`IniConfig`] gives string lookups; [`Config`] is the validated, typed
//! view the monitor runs on. Configuration is read once at startup.

use crate::core::Thresholds;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Section that holds keys appearing before any header.
pub const DEFAULT_SECTION: &str = "default";

/// String lookups over named settings.
pub trait ConfigStore {
    /// Raw value of `key` in `section`.
    fn get(&self, section: &str, key: &str) -> Result<&str, ConfigError>;

    /// Parse a required value.
    fn parse<T>(&self, section: &str, key: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.get(section, key)?;
        raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: raw.to_string(),
            reason: e.to_string(),
        })
    }

    /// Parse an optional value. A present but malformed value is still an error.
    fn parse_opt<T>(&self, section: &str, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.parse(section, key) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigError::MissingKey { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default)]
pub struct IniConfig {
    sections: HashMap<String, HashMap<String, String>>,
}

impl IniConfig {
    /// Parse file contents. Lines that are not a header, a `key = value`
    /// pair, a comment or blank are skipped with a warning.
    pub fn parse_str(content: &str) -> Self {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut section = DEFAULT_SECTION.to_string();

        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].trim().to_string();
                sections.entry(section.clone()).or_default();
                continue;
            }

            match line.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    sections
                        .entry(section.clone())
                        .or_default()
                        .insert(key.trim().to_string(), value.trim().to_string());
                }
                _ => {
                    tracing::warn!("Invalid format, line {}: {line}", idx + 1);
                }
            }
        }

        Self { sections }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {e}", path.display())))?;
        Ok(Self::parse_str(&content))
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }
}

impl ConfigStore for IniConfig {
    fn get(&self, section: &str, key: &str) -> Result<&str, ConfigError> {
        self.sections
            .get(section)
            .and_then(|entries| entries.get(key))
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingKey {
                section: section.to_string(),
                key: key.to_string(),
            })
    }
}

/// Main configuration for the monitor.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub wifi: WifiConfig,
    pub syslog: SyslogConfig,
    pub ntp: NtpConfig,
    pub rumble: Thresholds,
    pub monitor: MonitorConfig,
    pub graphite: GraphiteConfig,
    pub board: BoardConfig,
}

/// `[wifi]`
#[derive(Debug, Clone, Serialize)]
pub struct WifiConfig {
    pub ssid: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Give up on association after this long; wait forever if unset
    #[serde(with = "duration_serde::option")]
    pub timeout: Option<Duration>,
}

/// `[syslog]`
#[derive(Debug, Clone, Serialize)]
pub struct SyslogConfig {
    pub host: String,
    pub port: u16,
}

/// `[ntp]`
#[derive(Debug, Clone, Serialize)]
pub struct NtpConfig {
    /// Maximum sync attempts per due sync
    pub attempts: u32,
    pub server: String,
}

/// `[monitor]`
#[derive(Debug, Clone, Serialize)]
pub struct MonitorConfig {
    /// ADC channel the vibration sensor is wired to
    pub pin: u8,
    /// Sleep between two samples
    #[serde(with = "duration_serde")]
    pub delay: Duration,
    /// Length of each sampling window
    #[serde(with = "duration_serde")]
    pub window: Duration,
}

/// `[graphite]`
#[derive(Debug, Clone, Serialize)]
pub struct GraphiteConfig {
    pub host: String,
    pub port: u16,
    pub prefix: String,
}

/// `[board]`
#[derive(Debug, Clone, Serialize)]
pub struct BoardConfig {
    pub adc_device: PathBuf,
    pub led: String,
    pub led_active_low: bool,
    pub wifi_interface: Option<String>,
}

impl Config {
    /// Build and validate the typed configuration.
    pub fn from_store(store: &impl ConfigStore) -> Result<Self, ConfigError> {
        let no_top: u16 = store.parse("rumble", "no_top")?;
        let maybe_top: u16 = store.parse("rumble", "maybe_top")?;
        let rumble = Thresholds::new(no_top, maybe_top)
            .ok_or(ConfigError::InvalidThresholds { no_top, maybe_top })?;

        let config = Self {
            wifi: WifiConfig {
                ssid: store.get("wifi", "ssid")?.to_string(),
                password: store.get("wifi", "password")?.to_string(),
                timeout: parse_secs_opt(store, "wifi", "timeout")?,
            },
            syslog: SyslogConfig {
                host: store.get("syslog", "host")?.to_string(),
                port: store
                    .parse_opt("syslog", "port")?
                    .unwrap_or(crate::syslog::SYSLOG_PORT),
            },
            ntp: NtpConfig {
                attempts: store.parse("ntp", "attempts")?,
                server: store
                    .parse_opt("ntp", "server")?
                    .unwrap_or_else(|| "pool.ntp.org".to_string()),
            },
            rumble,
            monitor: MonitorConfig {
                pin: store.parse("monitor", "pin")?,
                delay: parse_secs(store, "monitor", "delay")?,
                window: parse_secs_opt(store, "monitor", "window")?
                    .unwrap_or(Duration::from_secs(10)),
            },
            graphite: GraphiteConfig {
                host: store
                    .parse_opt("graphite", "host")?
                    .unwrap_or_else(|| "code-energy.com".to_string()),
                port: store
                    .parse_opt("graphite", "port")?
                    .unwrap_or(crate::reporter::CARBON_PORT),
                prefix: store
                    .parse_opt("graphite", "prefix")?
                    .unwrap_or_else(|| "iot.home.oilburner".to_string()),
            },
            board: BoardConfig {
                adc_device: store
                    .parse_opt("board", "adc_device")?
                    .unwrap_or_else(|| PathBuf::from("/sys/bus/iio/devices/iio:device0")),
                led: store
                    .parse_opt("board", "led")?
                    .unwrap_or_else(|| "led0".to_string()),
                led_active_low: store.parse_opt("board", "led_active_low")?.unwrap_or(true),
                wifi_interface: store.parse_opt("board", "wifi_interface")?,
            },
        };

        if !is_metric_path(&config.graphite.prefix) {
            return Err(ConfigError::InvalidValue {
                section: "graphite".to_string(),
                key: "prefix".to_string(),
                value: config.graphite.prefix.clone(),
                reason: "expected a dotted name of letters, digits and underscores".to_string(),
            });
        }

        Ok(config)
    }

    /// Load and validate the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_store(&IniConfig::load(path)?)
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("furnace-monitor")
            .join("config.ini")
    }
}

fn parse_secs(store: &impl ConfigStore, section: &str, key: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = store.parse(section, key)?;
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: secs.to_string(),
        reason: e.to_string(),
    })
}

fn parse_secs_opt(
    store: &impl ConfigStore,
    section: &str,
    key: &str,
) -> Result<Option<Duration>, ConfigError> {
    match parse_secs(store, section, key) {
        Ok(duration) => Ok(Some(duration)),
        Err(ConfigError::MissingKey { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

fn is_metric_path(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_alphanumeric() || c == '_'))
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    MissingKey {
        section: String,
        key: String,
    },
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
    InvalidThresholds {
        no_top: u16,
        maybe_top: u16,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::MissingKey { section, key } => {
                write!(f, "Missing key `{key}` in section [{section}]")
            }
            ConfigError::InvalidValue {
                section,
                key,
                value,
                reason,
            } => write!(f, "Invalid value {value:?} for [{section}] {key}: {reason}"),
            ConfigError::InvalidThresholds { no_top, maybe_top } => write!(
                f,
                "Invalid thresholds: no_top ({no_top}) must not exceed maybe_top ({maybe_top})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as fractional seconds.
mod duration_serde {
    use serde::{Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub mod option {
        use serde::{Serialize, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            duration.map(|d| d.as_secs_f64()).serialize(serializer)
        }
    }
}
