//! Arduino-style analog reader speaking a newline-per-value protocol.
//!
//! The firmware prints one decimal value per line, cycling through the channels
//! in a fixed order. There is no framing beyond the newline, so the configured
//! channel count must match the firmware exactly.

use super::discovery::{find_port, PortDiscovery, ARDUINO_VENDOR_PREFIX};
use super::transport::LineTransport;
use crate::device::{validate_shape, DaqDevice, SessionState};
use crate::error::{DaqError, DaqResult, MalformedSample};
use crate::matrix::SampleMatrix;
use crate::pacing::ReadPacer;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Construction parameters for [`SerialChannelReader`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialReaderConfig {
    /// Port path; discovered by vendor prefix when absent
    #[serde(default)]
    pub port: Option<String>,
    /// Baud rate, must match the firmware
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Values per sample on the wire
    pub n_channels: usize,
    /// Samples returned by each `read()`
    pub samples_per_read: usize,
    /// Per-line I/O timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Description prefix used for auto-discovery
    #[serde(default = "default_vendor_prefix")]
    pub vendor_prefix: String,
    /// Nominal sampling rate in Hz; paces reads when set
    #[serde(default)]
    pub rate: Option<f64>,
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_vendor_prefix() -> String {
    ARDUINO_VENDOR_PREFIX.to_string()
}

impl SerialReaderConfig {
    /// Config with default baud rate, timeout and vendor prefix.
    pub fn new(n_channels: usize, samples_per_read: usize) -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            n_channels,
            samples_per_read,
            timeout: default_timeout(),
            vendor_prefix: default_vendor_prefix(),
            rate: None,
        }
    }

    /// Use an explicit port instead of auto-discovery.
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// Set the baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the per-line timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Match a different vendor during discovery.
    pub fn with_vendor_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.vendor_prefix = prefix.into();
        self
    }

    /// Pace reads at `rate` Hz.
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = Some(rate);
        self
    }

    /// Port to open, discovering one if none was configured.
    pub fn resolve_port(&self, discovery: &dyn PortDiscovery) -> DaqResult<String> {
        match &self.port {
            Some(port) => Ok(port.clone()),
            None => find_port(discovery, &self.vendor_prefix),
        }
    }
}

/// Blocking reader for a line-per-value serial device.
///
/// The connection is opened on construction and closed on `stop()` or drop.
pub struct SerialChannelReader<T: LineTransport> {
    transport: T,
    n_channels: usize,
    samples_per_read: usize,
    pacer: Option<ReadPacer>,
    state: SessionState,
    malformed: Vec<MalformedSample>,
    line: String,
}

#[cfg(feature = "instrument_serial")]
impl SerialChannelReader<super::transport::SerialPortTransport> {
    /// Open a real serial port, discovering it through the OS when needed.
    pub fn open(config: SerialReaderConfig) -> DaqResult<Self> {
        use super::discovery::SystemPorts;
        use super::transport::SerialPortTransport;

        Self::discover_with(config, &SystemPorts, |port, config| {
            SerialPortTransport::new(port, config.baud_rate, config.timeout)
        })
    }
}

impl<T: LineTransport> SerialChannelReader<T> {
    /// Resolve the port through `discovery`, build a transport for it and open it.
    ///
    /// Nothing is built when discovery fails.
    pub fn discover_with(
        config: SerialReaderConfig,
        discovery: &dyn PortDiscovery,
        make_transport: impl FnOnce(&str, &SerialReaderConfig) -> T,
    ) -> DaqResult<Self> {
        validate_shape(config.n_channels, config.samples_per_read)?;
        let port = config.resolve_port(discovery)?;
        let transport = make_transport(&port, &config);
        Self::with_transport(config, transport)
    }

    /// Wrap an already-built transport, opening it and clearing its buffers.
    pub fn with_transport(config: SerialReaderConfig, transport: T) -> DaqResult<Self> {
        validate_shape(config.n_channels, config.samples_per_read)?;
        let pacer = config
            .rate
            .map(|rate| {
                ReadPacer::for_rate(rate, config.samples_per_read).ok_or_else(|| {
                    DaqError::InvalidParameter(format!("rate must be positive, got {rate}"))
                })
            })
            .transpose()?;

        let mut reader = Self {
            transport,
            n_channels: config.n_channels,
            samples_per_read: config.samples_per_read,
            pacer,
            state: SessionState::Closed,
            malformed: Vec::new(),
            line: String::new(),
        };
        reader.start()?;
        Ok(reader)
    }

    /// Tokens that failed to parse during the most recent `read()`.
    pub fn malformed_samples(&self) -> &[MalformedSample] {
        &self.malformed
    }

    /// Borrow the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn read_token(
        &mut self,
        channel: usize,
        sample: usize,
        data: &mut SampleMatrix,
    ) -> DaqResult<()> {
        self.line.clear();
        self.transport.read_line(&mut self.line)?;
        let token = self.line.trim();
        match token.parse::<f64>() {
            Ok(value) => data.set(channel, sample, value),
            Err(_) => {
                let warning = MalformedSample {
                    channel,
                    sample,
                    token: token.to_string(),
                };
                warn!(device = %self.transport.name(), %warning, "Leaving cell at zero");
                self.malformed.push(warning);
            }
        }
        Ok(())
    }
}

impl<T: LineTransport> DaqDevice for SerialChannelReader<T> {
    fn name(&self) -> &str {
        self.transport.name()
    }

    fn start(&mut self) -> DaqResult<()> {
        if self.state == SessionState::Open {
            return Ok(());
        }
        if !self.transport.is_open() {
            self.transport.open()?;
        }
        self.transport.clear_buffers()?;
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.reset();
        }
        self.state = SessionState::Open;
        debug!(device = %self.transport.name(), "Serial session started");
        Ok(())
    }

    fn read(&mut self) -> DaqResult<SampleMatrix> {
        if self.state != SessionState::Open {
            return Err(DaqError::SessionClosed(self.transport.name().to_string()));
        }
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.pace();
        }

        self.malformed.clear();
        let mut data = SampleMatrix::zeros(self.n_channels, self.samples_per_read);
        for sample in 0..self.samples_per_read {
            for channel in 0..self.n_channels {
                self.read_token(channel, sample, &mut data)?;
            }
        }
        Ok(data)
    }

    fn stop(&mut self) -> DaqResult<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        let cleared = self.transport.clear_buffers();
        let closed = self.transport.close();
        debug!(device = %self.transport.name(), "Serial session stopped");
        cleared.and(closed)
    }

    fn state(&self) -> SessionState {
        self.state
    }

    fn channel_count(&self) -> usize {
        self.n_channels
    }

    fn samples_per_read(&self) -> usize {
        self.samples_per_read
    }
}

impl<T: LineTransport> Drop for SerialChannelReader<T> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(
                device = %self.transport.name(),
                error = %e,
                "Failed to stop serial session on drop"
            );
        }
    }
}
