//! Serial port enumeration and vendor matching.
//!
//! Auto-discovery goes through the [`PortDiscovery`] trait so that tests (and
//! platforms with unusual enumeration) can supply their own port list.

use crate::error::{DaqError, DaqResult};
use tracing::debug;

/// Description prefix of Arduino boards.
pub const ARDUINO_VENDOR_PREFIX: &str = "Arduino";

/// One enumerated serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// OS path or name, e.g. `/dev/ttyACM0` or `COM3`
    pub port_name: String,
    /// Human-readable description used for vendor matching
    pub description: String,
}

impl PortInfo {
    /// Convenience constructor.
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
        }
    }
}

/// Source of serial port listings.
pub trait PortDiscovery {
    /// Enumerate the ports currently visible.
    fn list_ports(&self) -> DaqResult<Vec<PortInfo>>;
}

/// Static port list, mostly useful in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticPorts(pub Vec<PortInfo>);

impl PortDiscovery for StaticPorts {
    fn list_ports(&self) -> DaqResult<Vec<PortInfo>> {
        Ok(self.0.clone())
    }
}

/// Ports reported by the operating system.
#[cfg(feature = "instrument_serial")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

#[cfg(feature = "instrument_serial")]
impl PortDiscovery for SystemPorts {
    fn list_ports(&self) -> DaqResult<Vec<PortInfo>> {
        use serialport::SerialPortType;

        let ports = serialport::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|port| {
                let description = match &port.port_type {
                    SerialPortType::UsbPort(info) => info
                        .product
                        .clone()
                        .or_else(|| info.manufacturer.clone())
                        .unwrap_or_else(|| "n/a".to_string()),
                    SerialPortType::PciPort => "PCI".to_string(),
                    SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                    SerialPortType::Unknown => "n/a".to_string(),
                };
                PortInfo::new(port.port_name, description)
            })
            .collect())
    }
}

/// Name of the first port whose description starts with `vendor_prefix`.
///
/// Fails with [`DaqError::DeviceNotFound`] when nothing matches.
pub fn find_port(discovery: &dyn PortDiscovery, vendor_prefix: &str) -> DaqResult<String> {
    let ports = discovery.list_ports()?;
    debug!(count = ports.len(), vendor = vendor_prefix, "Scanning serial ports");

    ports
        .iter()
        .find(|port| port.description.starts_with(vendor_prefix))
        .map(|port| port.port_name.clone())
        .ok_or_else(|| DaqError::DeviceNotFound {
            vendor: vendor_prefix.to_string(),
            available: ports.len(),
        })
}
