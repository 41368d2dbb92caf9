//! Serial (Arduino) acquisition backend.
//!
//! - [`discovery`]: port enumeration and vendor-prefix matching
//! - [`transport`]: the [`LineTransport`] boundary and its `serialport` implementation
//! - [`reader`]: [`SerialChannelReader`], the `DaqDevice` built on top

pub mod discovery;
pub mod reader;
pub mod transport;

pub use discovery::{find_port, PortDiscovery, PortInfo, StaticPorts, ARDUINO_VENDOR_PREFIX};
#[cfg(feature = "instrument_serial")]
pub use discovery::SystemPorts;
pub use reader::{SerialChannelReader, SerialReaderConfig};
pub use transport::LineTransport;
#[cfg(feature = "instrument_serial")]
pub use transport::SerialPortTransport;
