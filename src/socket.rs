//! TCP and UDP readers for raw float streams.
//!
//! The sender transmits `samples_per_read` frames of `array_len` little-endian
//! floats per read, frame by frame. Each read collects exactly that many bytes and
//! transposes the frames so that every array element becomes a row.

use crate::device::{validate_shape, CancelHandle, DaqDevice, SessionState};
use crate::error::{DaqError, DaqResult};
use crate::matrix::SampleMatrix;
use bytes::Buf;
use serde::{Deserialize, Serialize};
use std::io::{self, ErrorKind, Read};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::time::{Duration, Instant};
use tracing::debug;

/// Floating point width on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// 32-bit floats
    #[default]
    Single,
    /// 64-bit floats
    Double,
}

impl Precision {
    /// Bytes per value.
    pub fn width(self) -> usize {
        match self {
            Precision::Single => 4,
            Precision::Double => 8,
        }
    }
}

/// Construction parameters for the socket readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketReaderConfig {
    /// Remote address (TCP) or local bind address (UDP)
    pub addr: SocketAddr,
    /// Values per frame
    pub array_len: usize,
    /// Frames per read
    pub samples_per_read: usize,
    /// Float width
    #[serde(default)]
    pub precision: Precision,
    /// Socket timeout; reads block indefinitely when absent
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl SocketReaderConfig {
    /// Single-precision config without a timeout.
    pub fn new(addr: SocketAddr, array_len: usize, samples_per_read: usize) -> Self {
        Self {
            addr,
            array_len,
            samples_per_read,
            precision: Precision::Single,
            timeout: None,
        }
    }

    /// Set the float width.
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Set the socket timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bytes making up one read.
    pub fn message_len(&self) -> usize {
        self.array_len * self.samples_per_read * self.precision.width()
    }
}

/// Decode one message into an `(array_len, samples_per_read)` matrix.
pub fn decode_frames(
    mut payload: &[u8],
    precision: Precision,
    array_len: usize,
    samples_per_read: usize,
) -> DaqResult<SampleMatrix> {
    let expected = array_len * samples_per_read * precision.width();
    if payload.len() != expected {
        return Err(DaqError::InvalidParameter(format!(
            "payload is {} bytes, expected {expected}",
            payload.len()
        )));
    }

    let mut frames = Vec::with_capacity(array_len * samples_per_read);
    while payload.has_remaining() {
        frames.push(match precision {
            Precision::Single => f64::from(payload.get_f32_le()),
            Precision::Double => payload.get_f64_le(),
        });
    }
    SampleMatrix::from_interleaved(&frames, array_len, samples_per_read).ok_or_else(|| {
        DaqError::InvalidParameter("frame count does not match the configured shape".into())
    })
}

/// Longest a blocked socket read waits before checking for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(100);

fn validate_config(config: &SocketReaderConfig) -> DaqResult<()> {
    validate_shape(config.array_len, config.samples_per_read)?;
    if config.timeout == Some(Duration::ZERO) {
        return Err(DaqError::InvalidParameter(
            "socket timeout must be positive".into(),
        ));
    }
    Ok(())
}

/// OS-level read timeout: the configured timeout, capped at [`CANCEL_POLL`].
fn socket_read_timeout(timeout: Option<Duration>) -> Duration {
    timeout.map_or(CANCEL_POLL, |t| t.min(CANCEL_POLL))
}

fn is_timeout(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/// A message being collected across one or more `read()` calls.
///
/// Bytes received before a timeout or cancellation are kept, so the next
/// `read()` resumes at the same frame boundary.
#[derive(Debug)]
struct PendingMessage {
    buf: Vec<u8>,
    filled: usize,
}

impl PendingMessage {
    fn new(len: usize) -> Self {
        Self {
            buf: vec![0; len],
            filled: 0,
        }
    }

    fn clear(&mut self) {
        self.filled = 0;
    }

    /// Call `recv` until the message is complete.
    ///
    /// `recv` returning `Ok(0)` means the peer went away. Fails with
    /// `DeviceTimeout` once `timeout` passes without any bytes, and with
    /// `Cancelled` when `cancel` is raised.
    fn fill(
        &mut self,
        name: &str,
        timeout: Option<Duration>,
        cancel: &CancelHandle,
        mut recv: impl FnMut(&mut [u8]) -> io::Result<usize>,
    ) -> DaqResult<&[u8]> {
        let mut idle_since = Instant::now();
        while self.filled < self.buf.len() {
            if cancel.take() {
                return Err(DaqError::Cancelled);
            }
            match recv(&mut self.buf[self.filled..]) {
                Ok(0) => {
                    return Err(DaqError::Connection(format!(
                        "{name} closed the connection"
                    )));
                }
                Ok(n) => {
                    self.filled += n;
                    idle_since = Instant::now();
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if is_timeout(e.kind()) => match timeout {
                    Some(limit) if idle_since.elapsed() >= limit => {
                        return Err(DaqError::DeviceTimeout {
                            device: name.to_string(),
                            timeout: limit,
                        });
                    }
                    _ => {}
                },
                Err(e) => return Err(e.into()),
            }
        }
        self.filled = 0;
        Ok(&self.buf)
    }
}

// =============================================================================
// TCP
// =============================================================================

/// Reader connecting to a TCP sender.
pub struct TcpSocketReader {
    config: SocketReaderConfig,
    name: String,
    stream: Option<TcpStream>,
    pending: PendingMessage,
    cancel: CancelHandle,
}

impl TcpSocketReader {
    /// Reader for `config`; connects on `start()`.
    pub fn new(config: SocketReaderConfig) -> DaqResult<Self> {
        validate_config(&config)?;
        Ok(Self {
            name: format!("tcp://{}", config.addr),
            pending: PendingMessage::new(config.message_len()),
            config,
            stream: None,
            cancel: CancelHandle::new(),
        })
    }
}

impl DaqDevice for TcpSocketReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> DaqResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let connected = match self.config.timeout {
            Some(timeout) => TcpStream::connect_timeout(&self.config.addr, timeout),
            None => TcpStream::connect(self.config.addr),
        };
        let stream = connected
            .map_err(|e| DaqError::Connection(format!("cannot connect to {}: {e}", self.name)))?;
        stream.set_read_timeout(Some(socket_read_timeout(self.config.timeout)))?;
        debug!(device = %self.name, "Connected");
        self.pending.clear();
        self.cancel.take();
        self.stream = Some(stream);
        Ok(())
    }

    fn read(&mut self) -> DaqResult<SampleMatrix> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| DaqError::SessionClosed(self.name.clone()))?;

        let payload = self
            .pending
            .fill(&self.name, self.config.timeout, &self.cancel, |chunk| {
                stream.read(chunk)
            })?;
        decode_frames(
            payload,
            self.config.precision,
            self.config.array_len,
            self.config.samples_per_read,
        )
    }

    fn stop(&mut self) -> DaqResult<()> {
        if self.stream.take().is_some() {
            debug!(device = %self.name, "Disconnected");
        }
        self.pending.clear();
        Ok(())
    }

    fn state(&self) -> SessionState {
        if self.stream.is_some() {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }

    fn channel_count(&self) -> usize {
        self.config.array_len
    }

    fn samples_per_read(&self) -> usize {
        self.config.samples_per_read
    }

    fn cancel_handle(&self) -> Option<CancelHandle> {
        Some(self.cancel.clone())
    }
}

// =============================================================================
// UDP
// =============================================================================

/// Reader bound to a local UDP address.
///
/// Datagrams are concatenated until a full message is collected. A datagram
/// larger than the space left in the message is truncated.
pub struct UdpSocketReader {
    config: SocketReaderConfig,
    name: String,
    socket: Option<UdpSocket>,
    pending: PendingMessage,
    cancel: CancelHandle,
}

impl UdpSocketReader {
    /// Reader for `config`; binds on `start()`.
    pub fn new(config: SocketReaderConfig) -> DaqResult<Self> {
        validate_config(&config)?;
        Ok(Self {
            name: format!("udp://{}", config.addr),
            pending: PendingMessage::new(config.message_len()),
            config,
            socket: None,
            cancel: CancelHandle::new(),
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }
}

impl DaqDevice for UdpSocketReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> DaqResult<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        let socket = UdpSocket::bind(self.config.addr)
            .map_err(|e| DaqError::Connection(format!("cannot bind {}: {e}", self.name)))?;
        socket.set_read_timeout(Some(socket_read_timeout(self.config.timeout)))?;
        debug!(device = %self.name, "Bound");
        self.pending.clear();
        self.cancel.take();
        self.socket = Some(socket);
        Ok(())
    }

    fn read(&mut self) -> DaqResult<SampleMatrix> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| DaqError::SessionClosed(self.name.clone()))?;

        let payload = self
            .pending
            .fill(&self.name, self.config.timeout, &self.cancel, |chunk| {
                match socket.recv_from(chunk) {
                    // Empty datagram, not a closed peer
                    Ok((0, _)) => Err(ErrorKind::Interrupted.into()),
                    Ok((n, _peer)) => Ok(n),
                    Err(e) => Err(e),
                }
            })?;
        decode_frames(
            payload,
            self.config.precision,
            self.config.array_len,
            self.config.samples_per_read,
        )
    }

    fn stop(&mut self) -> DaqResult<()> {
        if self.socket.take().is_some() {
            debug!(device = %self.name, "Unbound");
        }
        self.pending.clear();
        Ok(())
    }

    fn state(&self) -> SessionState {
        if self.socket.is_some() {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }

    fn channel_count(&self) -> usize {
        self.config.array_len
    }

    fn samples_per_read(&self) -> usize {
        self.config.samples_per_read
    }

    fn cancel_handle(&self) -> Option<CancelHandle> {
        Some(self.cancel.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_f32(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_message_len() {
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let config = SocketReaderConfig::new(addr, 8, 10).with_precision(Precision::Double);
        assert_eq!(config.message_len(), 640);
    }

    #[test]
    fn test_decode_single_precision_transposes() {
        let payload = encode_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let m = decode_frames(&payload, Precision::Single, 3, 2).unwrap();
        assert_eq!(m.shape(), (3, 2));
        assert_eq!(m.row(0), Some(&[1.0, 4.0][..]));
        assert_eq!(m.row(2), Some(&[3.0, 6.0][..]));
    }

    #[test]
    fn test_decode_double_precision() {
        let payload: Vec<u8> = [0.5f64, -1.25]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let m = decode_frames(&payload, Precision::Double, 1, 2).unwrap();
        assert_eq!(m.row(0), Some(&[0.5, -1.25][..]));
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let payload = encode_f32(&[1.0, 2.0, 3.0]);
        assert!(decode_frames(&payload, Precision::Single, 2, 2).is_err());
    }

    #[test]
    fn test_read_before_start_fails() {
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let mut reader = TcpSocketReader::new(SocketReaderConfig::new(addr, 1, 1)).unwrap();
        assert!(matches!(reader.read(), Err(DaqError::SessionClosed(_))));
    }

    #[test]
    fn test_precision_deserialize() {
        let p: Precision = serde_json::from_str("\"double\"").unwrap();
        assert_eq!(p, Precision::Double);
    }
}
