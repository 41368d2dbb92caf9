//! Run configuration using Figment
//!
//! The CLI describes what to acquire from in a TOML file, with environment
//! overrides:
//! 1. the file given on the command line (base configuration)
//! 2. environment variables prefixed with `DAQ_READERS_`, nested with `__`
//!
//! # Example
//! ```toml
//! [application]
//! name = "bench"
//! log_level = "debug"
//!
//! [device]
//! kind = "serial"
//! n_channels = 4
//! samples_per_read = 20
//! timeout = "500ms"
//! ```
//!
//! `DAQ_READERS_DEVICE__SAMPLES_PER_READ=50` overrides the sample count.

use crate::serial::SerialReaderConfig;
use crate::socket::SocketReaderConfig;
use crate::stream::{SimulationConfig, Units};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "DAQ_READERS_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Device to acquire from
    pub device: DeviceConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_name() -> String {
    "daq-readers".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One acquisition device, selected by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceConfig {
    /// Arduino-style newline protocol over a serial port
    Serial(SerialReaderConfig),
    /// Blackrock stream (simulated server)
    Stream(StreamDeviceConfig),
    /// Raw floats over TCP
    Tcp(SocketReaderConfig),
    /// Raw floats over UDP
    Udp(SocketReaderConfig),
}

/// Stream reader settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDeviceConfig {
    /// Channel IDs to keep
    pub channels: Vec<u32>,
    /// Samples per channel per read
    pub samples_per_read: usize,
    /// Output units
    #[serde(default)]
    pub units: Units,
    /// Give up on a read after this long
    #[serde(default, with = "humantime_serde")]
    pub read_timeout: Option<Duration>,
    /// Simulated server settings
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl DeviceConfig {
    /// Short label for the device kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceConfig::Serial(_) => "serial",
            DeviceConfig::Stream(_) => "stream",
            DeviceConfig::Tcp(_) => "tcp",
            DeviceConfig::Udp(_) => "udp",
        }
    }
}

impl AppConfig {
    /// Load configuration from a file plus `DAQ_READERS_` environment variables
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// Load configuration from a TOML string (no environment)
    pub fn from_toml_str(toml: &str) -> Result<Self, figment::Error> {
        Figment::new().merge(Toml::string(toml)).extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        match &self.device {
            DeviceConfig::Serial(serial) => {
                check_shape(serial.n_channels, serial.samples_per_read)?;
                if serial.baud_rate == 0 {
                    return Err("baud_rate must be positive".to_string());
                }
                if let Some(rate) = serial.rate {
                    if !(rate.is_finite() && rate > 0.0) {
                        return Err(format!("Invalid rate {rate}. Must be positive"));
                    }
                }
            }
            DeviceConfig::Stream(stream) => {
                check_shape(stream.channels.len(), stream.samples_per_read)?;
                let sim = &stream.simulation;
                if sim.burst_min > sim.burst_max {
                    return Err(format!(
                        "burst_min ({}) exceeds burst_max ({})",
                        sim.burst_min, sim.burst_max
                    ));
                }
                if let Some(missing) = stream
                    .channels
                    .iter()
                    .find(|id| **id == 0 || **id > sim.channel_count)
                {
                    return Err(format!(
                        "Channel {missing} is not served (simulation has channels 1..={})",
                        sim.channel_count
                    ));
                }
            }
            DeviceConfig::Tcp(socket) | DeviceConfig::Udp(socket) => {
                check_shape(socket.array_len, socket.samples_per_read)?;
            }
        }

        Ok(())
    }
}

fn check_shape(channels: usize, samples_per_read: usize) -> Result<(), String> {
    if channels == 0 {
        return Err("At least one channel must be configured".to_string());
    }
    if samples_per_read == 0 {
        return Err("samples_per_read must be positive".to_string());
    }
    Ok(())
}
