//! Build readers from configuration.

use crate::config::{DeviceConfig, StreamDeviceConfig};
use crate::device::DaqDevice;
use crate::error::DaqResult;
use crate::socket::{TcpSocketReader, UdpSocketReader};
use crate::stream::{SimulatedSdk, StreamChannelReader};
use tracing::info;

/// Instantiate the reader described by `config`.
///
/// Serial readers open their port immediately; the others connect on `start()`.
pub fn build_device(config: &DeviceConfig) -> DaqResult<Box<dyn DaqDevice>> {
    info!(kind = config.kind(), "Building device");
    let device: Box<dyn DaqDevice> = match config {
        DeviceConfig::Serial(serial) => build_serial(serial)?,
        DeviceConfig::Stream(stream) => Box::new(build_stream(stream)?),
        DeviceConfig::Tcp(socket) => Box::new(TcpSocketReader::new(socket.clone())?),
        DeviceConfig::Udp(socket) => Box::new(UdpSocketReader::new(socket.clone())?),
    };
    Ok(device)
}

/// Stream reader over the simulated server.
pub fn build_stream(config: &StreamDeviceConfig) -> DaqResult<StreamChannelReader<SimulatedSdk>> {
    let sdk = SimulatedSdk::new(config.simulation.clone());
    let reader = StreamChannelReader::new(
        sdk,
        config.channels.iter().copied(),
        config.samples_per_read,
        config.units,
    )?
    .with_name("blackrock-sim");
    Ok(match config.read_timeout {
        Some(timeout) => reader.with_read_timeout(timeout),
        None => reader,
    })
}

#[cfg(feature = "instrument_serial")]
fn build_serial(config: &crate::serial::SerialReaderConfig) -> DaqResult<Box<dyn DaqDevice>> {
    use crate::serial::SerialChannelReader;

    Ok(Box::new(SerialChannelReader::open(config.clone())?))
}

#[cfg(not(feature = "instrument_serial"))]
fn build_serial(_config: &crate::serial::SerialReaderConfig) -> DaqResult<Box<dyn DaqDevice>> {
    Err(crate::error::DaqError::FeatureNotEnabled(
        "instrument_serial".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SessionState;
    use crate::stream::{SimulationConfig, Units};

    #[test]
    fn test_build_stream_device() {
        let config = DeviceConfig::Stream(StreamDeviceConfig {
            channels: vec![3, 1],
            samples_per_read: 10,
            units: Units::Raw,
            read_timeout: None,
            simulation: SimulationConfig {
                channel_count: 4,
                seed: Some(3),
                burst_min: 1,
                burst_max: 4,
                ..Default::default()
            },
        });
        let mut device = build_device(&config).unwrap();
        assert_eq!(device.state(), SessionState::Closed);
        device.start().unwrap();
        let data = device.read().unwrap();
        assert_eq!(data.shape(), (2, 10));
        device.stop().unwrap();
    }

    #[test]
    fn test_build_tcp_device_is_lazy() {
        let config = DeviceConfig::Tcp(crate::socket::SocketReaderConfig::new(
            "127.0.0.1:1".parse().unwrap(),
            2,
            2,
        ));
        let device = build_device(&config).unwrap();
        assert_eq!(device.name(), "tcp://127.0.0.1:1");
        assert_eq!(device.state(), SessionState::Closed);
    }
}
