//! Custom error types for the readers.
//!
//! This module defines the primary error type, `DaqError`, shared by every reader.
//! Using the `thiserror` crate, it provides a consistent way to report the failures
//! that can occur while talking to acquisition hardware, from port discovery and
//! driver status codes to stalled streams.
//!
//! ## Error Hierarchy
//!
//! - **`DeviceNotFound`**: Serial auto-discovery found no port whose description
//!   matches the expected vendor. No connection is opened in this case.
//! - **`Connection`**: The driver reported a nonzero status while opening or closing a
//!   connection, or the byte stream ended unexpectedly.
//! - **`Configuration`**: The driver rejected a trial/buffer configuration, or a run
//!   configuration failed validation.
//! - **`DeviceTimeout`**: No data arrived within the allotted I/O timeout.
//! - **`SessionClosed`**: A reader was used while its session is closed or faulted.
//!
//! Per-token parse failures are not errors: they are reported as [`MalformedSample`]
//! warnings and never abort a read.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the reader error type.
pub type DaqResult<T> = std::result::Result<T, DaqError>;

/// Status code the vendor SDK uses for success.
pub const STATUS_OK: i32 = 0;

/// Primary error type for all readers.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Serial auto-discovery found no matching port.
    #[error("No serial port described as '{vendor}...' ({available} ports scanned)")]
    DeviceNotFound {
        /// Description prefix that was searched for
        vendor: String,
        /// Number of ports that were enumerated
        available: usize,
    },

    /// Connection could not be established, closed cleanly, or was lost.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Device or run configuration was rejected.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No data arrived within the I/O timeout.
    #[error("Device '{device}' produced no data within {timeout:?}")]
    DeviceTimeout {
        /// Reader name
        device: String,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// Operation requires an open session.
    #[error("Session for '{0}' is not open")]
    SessionClosed(String),

    /// Constructor or builder argument is out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A blocking read was cancelled through its handle.
    #[error("Read cancelled")]
    Cancelled,

    /// Functionality compiled out via feature flags.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    /// Standard I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port driver failure.
    #[cfg(feature = "instrument_serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Configuration file or environment could not be parsed.
    #[error("Configuration file error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}

impl DaqError {
    /// Whether the error is worth a `reset()` and another attempt.
    ///
    /// Timeouts and lost connections can clear up on their own; everything else
    /// needs the caller to change something first.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DaqError::DeviceTimeout { .. } | DaqError::Connection(_) | DaqError::Cancelled
        )
    }
}

/// Map a vendor status code onto an error.
///
/// `make` is only invoked for nonzero status codes.
pub fn check_status(
    status: i32,
    make: impl FnOnce(String) -> DaqError,
    message: &str,
) -> DaqResult<()> {
    if status == STATUS_OK {
        Ok(())
    } else {
        Err(make(format!("{message} (status {status})")))
    }
}

/// A single token that could not be parsed as a number.
///
/// This is a warning, not a failure: the reader logs it, records it, and leaves
/// the affected cell at zero.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Malformed sample {token:?} at channel {channel}, sample {sample}")]
pub struct MalformedSample {
    /// Row of the affected cell
    pub channel: usize,
    /// Column of the affected cell
    pub sample: usize,
    /// Raw token as received (without line terminator)
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status_ok() {
        assert!(check_status(0, DaqError::Connection, "open").is_ok());
    }

    #[test]
    fn test_check_status_nonzero_maps_to_variant() {
        let err = check_status(-3, DaqError::Configuration, "trial config").unwrap_err();
        match err {
            DaqError::Configuration(msg) => {
                assert!(msg.contains("trial config"));
                assert!(msg.contains("-3"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_transient_classification() {
        let timeout = DaqError::DeviceTimeout {
            device: "arduino".into(),
            timeout: Duration::from_millis(10),
        };
        assert!(timeout.is_transient());
        assert!(DaqError::Connection("lost".into()).is_transient());
        assert!(!DaqError::Configuration("bad".into()).is_transient());
        assert!(!DaqError::DeviceNotFound {
            vendor: "Arduino".into(),
            available: 0
        }
        .is_transient());
    }

    #[test]
    fn test_malformed_sample_display() {
        let warning = MalformedSample {
            channel: 1,
            sample: 4,
            token: "12.x".into(),
        };
        assert_eq!(
            warning.to_string(),
            "Malformed sample \"12.x\" at channel 1, sample 4"
        );
    }
}
