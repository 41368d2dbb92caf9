//! Line-oriented byte transport underneath the serial reader.

use crate::error::{DaqError, DaqResult};
use std::io::{BufRead, ErrorKind};
use std::time::Duration;
use tracing::trace;

/// A newline-delimited byte stream that can be opened, flushed and closed.
///
/// The reader only ever asks for one line at a time; implementations own the
/// connection handle exclusively.
pub trait LineTransport: Send {
    /// Name used in logs and errors (usually the port path).
    fn name(&self) -> &str;

    /// Open the underlying connection. Called only when closed.
    fn open(&mut self) -> DaqResult<()>;

    /// Whether the connection is currently open.
    fn is_open(&self) -> bool;

    /// Discard pending input and output.
    fn clear_buffers(&mut self) -> DaqResult<()>;

    /// Read one line into `line`, without the terminator.
    ///
    /// Invalid UTF-8 is replaced rather than rejected so that the caller sees the
    /// token and can report it. Fails with `DeviceTimeout` when the device stalls
    /// and `Connection` when the stream ends.
    fn read_line(&mut self, line: &mut String) -> DaqResult<()>;

    /// Close the connection. Called only when open.
    fn close(&mut self) -> DaqResult<()>;
}

/// Continue reading one line from `reader` into `raw`.
///
/// Bytes received before a timeout stay in `raw` so the next call completes the
/// same line. `raw` is emptied once a line is delivered or the stream fails.
#[cfg_attr(not(feature = "instrument_serial"), allow(dead_code))]
pub(crate) fn resume_line<R: BufRead>(
    reader: &mut R,
    raw: &mut Vec<u8>,
    name: &str,
    timeout: Duration,
    line: &mut String,
) -> DaqResult<()> {
    match reader.read_until(b'\n', raw) {
        Ok(0) => {
            raw.clear();
            Err(DaqError::Connection(format!(
                "unexpected EOF from serial port {name}"
            )))
        }
        Ok(_) if raw.last() != Some(&b'\n') => {
            raw.clear();
            Err(DaqError::Connection(format!(
                "serial port {name} closed mid-line"
            )))
        }
        Ok(_) => {
            let text = String::from_utf8_lossy(raw);
            trace!(port = %name, line = %text.escape_default(), "Received line");
            line.push_str(text.trim_end_matches(['\r', '\n']));
            raw.clear();
            Ok(())
        }
        Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
            trace!(port = %name, pending = raw.len(), "Line incomplete at timeout");
            Err(DaqError::DeviceTimeout {
                device: name.to_string(),
                timeout,
            })
        }
        Err(e) => {
            raw.clear();
            Err(DaqError::Io(e))
        }
    }
}

#[cfg(feature = "instrument_serial")]
pub use system::SerialPortTransport;

#[cfg(feature = "instrument_serial")]
mod system {
    use super::{resume_line, LineTransport};
    use crate::error::{DaqError, DaqResult};
    use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
    use std::io::BufReader;
    use std::time::Duration;
    use tracing::debug;

    /// [`LineTransport`] over a real serial port (8N1, no flow control).
    pub struct SerialPortTransport {
        port_name: String,
        baud_rate: u32,
        timeout: Duration,
        reader: Option<BufReader<Box<dyn SerialPort>>>,
        raw: Vec<u8>,
    }

    impl SerialPortTransport {
        /// Transport for `port_name`; nothing is opened yet.
        pub fn new(port_name: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
            Self {
                port_name: port_name.into(),
                baud_rate,
                timeout,
                reader: None,
                raw: Vec::with_capacity(32),
            }
        }
    }

    impl LineTransport for SerialPortTransport {
        fn name(&self) -> &str {
            &self.port_name
        }

        fn open(&mut self) -> DaqResult<()> {
            debug!(port = %self.port_name, baud = self.baud_rate, "Opening serial port");
            let port = serialport::new(&self.port_name, self.baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(self.timeout)
                .open()?;
            self.reader = Some(BufReader::new(port));
            self.raw.clear();
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.reader.is_some()
        }

        fn clear_buffers(&mut self) -> DaqResult<()> {
            // BufReader may hold bytes the OS buffer no longer has
            if let Some(reader) = self.reader.take() {
                let port = reader.into_inner();
                port.clear(ClearBuffer::All)?;
                self.reader = Some(BufReader::new(port));
            }
            self.raw.clear();
            Ok(())
        }

        fn read_line(&mut self, line: &mut String) -> DaqResult<()> {
            let reader = self
                .reader
                .as_mut()
                .ok_or_else(|| DaqError::SessionClosed(self.port_name.clone()))?;
            resume_line(reader, &mut self.raw, &self.port_name, self.timeout, line)
        }

        fn close(&mut self) -> DaqResult<()> {
            debug!(port = %self.port_name, "Closing serial port");
            self.reader = None;
            self.raw.clear();
            Ok(())
        }
    }
}
