//! Boundary to the Blackrock (Cerebus/Neuroport) streaming SDK.
//!
//! The SDK itself is closed source; this module only describes the four
//! primitives the reader needs. Every call returns a status code next to its
//! payload, with [`STATUS_OK`](crate::error::STATUS_OK) meaning success.

use crate::error::{check_status, DaqError, DaqResult, STATUS_OK};
use serde::{Deserialize, Serialize};

/// Status code plus payload, as returned by every SDK primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct SdkReply<T> {
    /// Zero on success
    pub status: i32,
    /// Returned data; meaningful only when `status` is zero
    pub payload: T,
}

impl<T> SdkReply<T> {
    /// Successful reply.
    pub fn ok(payload: T) -> Self {
        Self {
            status: STATUS_OK,
            payload,
        }
    }

    /// Failed reply carrying a placeholder payload.
    pub fn failed(status: i32, payload: T) -> Self {
        Self { status, payload }
    }

    /// Whether the call succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Payload on success, otherwise the error built by `make`.
    pub fn into_result(self, make: impl FnOnce(String) -> DaqError, message: &str) -> DaqResult<T> {
        check_status(self.status, make, message)?;
        Ok(self.payload)
    }
}

/// Parameters for opening a connection to the NSP/Central.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Connection kind: `default`, `central` or `udp`
    pub connection: String,
    /// SDK instance
    pub instance: u32,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            connection: "default".to_string(),
            instance: 0,
        }
    }
}

/// What the SDK reports after a successful open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Connection actually established
    pub connection: String,
    /// Instrument type reported by the NSP
    pub instrument: String,
}

/// Trial buffer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialConfig {
    /// Clear the server-side buffer
    pub reset: bool,
    /// Double buffering
    pub double_buffer: bool,
    /// Continuous buffer length, in trials
    pub continuous_length: u32,
    /// Skip spike/digital events
    pub no_event: bool,
    /// Skip comments
    pub no_comment: bool,
}

impl TrialConfig {
    /// Continuous-only streaming, as used by the reader.
    pub fn continuous() -> Self {
        Self {
            reset: true,
            double_buffer: true,
            continuous_length: 1,
            no_event: true,
            no_comment: true,
        }
    }
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self::continuous()
    }
}

/// Samples delivered for one channel in one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBurst {
    /// Channel identifier (1-based on Blackrock hardware)
    pub channel_id: u32,
    /// Raw 16-bit counts
    pub samples: Vec<i16>,
}

impl ChannelBurst {
    /// Convenience constructor.
    pub fn new(channel_id: u32, samples: impl Into<Vec<i16>>) -> Self {
        Self {
            channel_id,
            samples: samples.into(),
        }
    }
}

/// The four SDK primitives the stream reader drives.
pub trait StreamSdk: Send {
    /// Connect to the NSP/Central.
    fn open(&mut self, params: &ConnectionParams) -> SdkReply<ConnectionInfo>;

    /// Configure the server-side trial buffer.
    fn trial_config(&mut self, config: &TrialConfig) -> SdkReply<()>;

    /// Fetch whatever continuous data accumulated since the last poll.
    ///
    /// Burst sizes vary from poll to poll and may be empty.
    fn trial_continuous(&mut self, reset: bool) -> SdkReply<Vec<ChannelBurst>>;

    /// Disconnect.
    fn close(&mut self) -> SdkReply<()>;
}

impl<S: StreamSdk + ?Sized> StreamSdk for Box<S> {
    fn open(&mut self, params: &ConnectionParams) -> SdkReply<ConnectionInfo> {
        (**self).open(params)
    }

    fn trial_config(&mut self, config: &TrialConfig) -> SdkReply<()> {
        (**self).trial_config(config)
    }

    fn trial_continuous(&mut self, reset: bool) -> SdkReply<Vec<ChannelBurst>> {
        (**self).trial_continuous(reset)
    }

    fn close(&mut self) -> SdkReply<()> {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_into_result() {
        let value = SdkReply::ok(5).into_result(DaqError::Connection, "x");
        assert_eq!(value.unwrap(), 5);
        let err = SdkReply::failed(2, ())
            .into_result(DaqError::Configuration, "trial")
            .unwrap_err();
        assert!(matches!(err, DaqError::Configuration(_)));
    }

    #[test]
    fn test_continuous_trial_config() {
        let config = TrialConfig::default();
        assert!(config.reset && config.double_buffer);
        assert!(config.no_event && config.no_comment);
        assert_eq!(config.continuous_length, 1);
    }
}
