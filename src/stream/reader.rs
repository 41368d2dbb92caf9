//! Neural signal stream reader (Blackrock Neuroport/Cerebus).
//!
//! The server hands out samples in irregular bursts, so `read()` keeps polling and
//! stitching bursts together until exactly `samples_per_read` columns are filled.
//! Samples are queued per row, so anything a channel delivers past what can be
//! written (the end of the matrix, or ahead of the lowest channel) is kept for
//! the next poll or `read()`.
//!
//! Rows are always in increasing channel-ID order: row `i` holds the `i`-th
//! smallest requested channel, whatever order the server reports channels in.

use super::sdk::{ChannelBurst, ConnectionInfo, ConnectionParams, StreamSdk, TrialConfig};
use crate::device::{validate_shape, CancelHandle, DaqDevice, SessionState};
use crate::error::{DaqError, DaqResult, STATUS_OK};
use crate::matrix::SampleMatrix;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Microvolts per raw count at the default front-end gain.
pub const MICROVOLTS_PER_COUNT: f64 = 0.25;

/// Unit of the values written into the sample matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Raw 16-bit counts
    #[default]
    Raw,
    /// Counts scaled to microvolts
    Microvolts,
}

impl Units {
    /// Convert one raw count.
    pub fn scale(self, count: i16) -> f64 {
        match self {
            Units::Raw => f64::from(count),
            Units::Microvolts => f64::from(count) * MICROVOLTS_PER_COUNT,
        }
    }
}

/// Blocking reader over a [`StreamSdk`].
pub struct StreamChannelReader<S: StreamSdk> {
    sdk: S,
    name: String,
    /// Requested channel IDs in row order
    channels: Vec<u32>,
    samples_per_read: usize,
    units: Units,
    params: ConnectionParams,
    trial: TrialConfig,
    state: SessionState,
    connection: Option<ConnectionInfo>,
    read_timeout: Option<Duration>,
    poll_interval: Duration,
    cancel: CancelHandle,
    /// Per-row samples received but not yet written
    carry: Vec<VecDeque<f64>>,
}

impl<S: StreamSdk> StreamChannelReader<S> {
    /// Reader for `channels`; no connection is made until `start()`.
    pub fn new(
        sdk: S,
        channels: impl IntoIterator<Item = u32>,
        samples_per_read: usize,
        units: Units,
    ) -> DaqResult<Self> {
        let channels: BTreeSet<u32> = channels.into_iter().collect();
        let channels: Vec<u32> = channels.into_iter().collect();
        validate_shape(channels.len(), samples_per_read)?;

        Ok(Self {
            sdk,
            name: "blackrock".to_string(),
            carry: vec![VecDeque::new(); channels.len()],
            channels,
            samples_per_read,
            units,
            params: ConnectionParams::default(),
            trial: TrialConfig::continuous(),
            state: SessionState::Closed,
            connection: None,
            read_timeout: None,
            poll_interval: Duration::from_millis(1),
            cancel: CancelHandle::new(),
        })
    }

    /// Give up on a `read()` after `timeout` without a full matrix.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Sleep between polls that return no data.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Connection parameters passed to the SDK's open call.
    pub fn with_connection_params(mut self, params: ConnectionParams) -> Self {
        self.params = params;
        self
    }

    /// Name used in logs and errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Requested channel IDs, in row order.
    pub fn channels(&self) -> &[u32] {
        &self.channels
    }

    /// Unit of returned values.
    pub fn units(&self) -> Units {
        self.units
    }

    /// What the SDK reported for the current connection.
    pub fn connection_info(&self) -> Option<&ConnectionInfo> {
        self.connection.as_ref()
    }

    /// Borrow the SDK.
    pub fn sdk(&self) -> &S {
        &self.sdk
    }

    fn initialize(&mut self) -> DaqResult<()> {
        let reply = self.sdk.open(&self.params);
        if reply.status != STATUS_OK {
            self.state = SessionState::Faulted;
            return Err(DaqError::Connection(format!(
                "connection to NSP/Central not established (status {})",
                reply.status
            )));
        }
        debug!(device = %self.name, instrument = %reply.payload.instrument, "Connected to NSP");
        self.connection = Some(reply.payload);
        Ok(())
    }

    fn configure(&mut self) -> DaqResult<()> {
        self.sdk
            .trial_config(&self.trial)
            .into_result(DaqError::Configuration, "trial configuration was not set")?;
        self.carry.iter_mut().for_each(VecDeque::clear);
        self.state = SessionState::Open;
        debug!(device = %self.name, "Trial buffer configured");
        Ok(())
    }

    fn teardown(&mut self) {
        if self.connection.take().is_some() {
            let reply = self.sdk.close();
            if !reply.is_ok() {
                warn!(device = %self.name, status = reply.status, "Close failed during reset");
            }
        }
        self.state = SessionState::Closed;
    }

    /// Move queued samples into `data` from column `offset`; returns columns filled.
    ///
    /// Only columns every row has a sample for are written.
    fn drain_carry(&mut self, offset: usize, data: &mut SampleMatrix) -> usize {
        let pending = self.carry.iter().map(VecDeque::len).min().unwrap_or(0);
        let take = pending.min(self.samples_per_read - offset);
        if take == 0 {
            return 0;
        }
        for (row, queue) in self.carry.iter_mut().enumerate() {
            let segment: Vec<f64> = queue.drain(..take).collect();
            data.write_row_segment(row, offset, &segment);
        }
        take
    }

    /// Queue one poll's bursts and write what lines up at column `offset`.
    ///
    /// Returns columns filled.
    fn absorb(
        &mut self,
        bursts: &[ChannelBurst],
        offset: usize,
        data: &mut SampleMatrix,
    ) -> usize {
        let requested: BTreeSet<u32> = self.channels.iter().copied().collect();
        let mut by_channel: BTreeMap<u32, &[i16]> = BTreeMap::new();
        for burst in bursts.iter().filter(|b| requested.contains(&b.channel_id)) {
            by_channel
                .entry(burst.channel_id)
                .or_insert(burst.samples.as_slice());
        }

        let units = self.units;
        let mut target = None;
        for (row, channel) in self.channels.iter().enumerate() {
            if let Some(samples) = by_channel.get(channel) {
                let queue = &mut self.carry[row];
                queue.extend(samples.iter().map(|&count| units.scale(count)));
                // Lowest requested channel present sets how far every row must reach
                target.get_or_insert(queue.len());
            }
        }
        let Some(target) = target else {
            return 0;
        };

        for (row, channel) in self.channels.iter().enumerate() {
            let queue = &mut self.carry[row];
            if queue.len() >= target {
                continue;
            }
            if by_channel.contains_key(channel) {
                warn!(
                    device = %self.name,
                    channel,
                    expected = target,
                    got = queue.len(),
                    "Burst length mismatch, padding with zeros"
                );
            } else {
                warn!(device = %self.name, channel, "Channel missing from poll, filling zeros");
            }
            queue.resize(target, 0.0);
        }

        self.drain_carry(offset, data)
    }
}

impl<S: StreamSdk> DaqDevice for StreamChannelReader<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> DaqResult<()> {
        match self.state {
            SessionState::Open => return Ok(()),
            SessionState::Faulted => {
                return Err(DaqError::Connection(
                    "session faulted, call reset() to reconnect".into(),
                ))
            }
            SessionState::Closed => {}
        }
        if self.connection.is_none() {
            self.initialize()?;
        }
        self.configure()
    }

    fn read(&mut self) -> DaqResult<SampleMatrix> {
        if self.state != SessionState::Open {
            return Err(DaqError::SessionClosed(self.name.clone()));
        }

        let mut data = SampleMatrix::zeros(self.channels.len(), self.samples_per_read);
        let mut n_read = self.drain_carry(0, &mut data);
        let deadline = self.read_timeout.map(|t| Instant::now() + t);

        while n_read < self.samples_per_read {
            if self.cancel.take() {
                return Err(DaqError::Cancelled);
            }
            if let (Some(deadline), Some(timeout)) = (deadline, self.read_timeout) {
                if Instant::now() >= deadline {
                    return Err(DaqError::DeviceTimeout {
                        device: self.name.clone(),
                        timeout,
                    });
                }
            }

            let reply = self.sdk.trial_continuous(true);
            if !reply.is_ok() {
                debug!(
                    device = %self.name,
                    status = reply.status,
                    "Trial poll failed, polling again"
                );
                std::thread::sleep(self.poll_interval);
                continue;
            }

            let filled = self.absorb(&reply.payload, n_read, &mut data);
            trace!(device = %self.name, filled, total = n_read + filled, "Poll absorbed");
            if filled == 0 {
                std::thread::sleep(self.poll_interval);
            }
            n_read += filled;
        }
        Ok(data)
    }

    fn stop(&mut self) -> DaqResult<()> {
        if self.connection.is_none() {
            // Closed, or faulted before a connection existed
            return Ok(());
        }
        self.connection = None;
        self.state = SessionState::Closed;
        self.carry.iter_mut().for_each(VecDeque::clear);
        self.sdk
            .close()
            .into_result(DaqError::Connection, "connection to NSP/Central not closed")?;
        debug!(device = %self.name, "Disconnected from NSP");
        Ok(())
    }

    /// Drop the connection and bring the session back to `Open`.
    ///
    /// This is the only way out of `Faulted`.
    fn reset(&mut self) -> DaqResult<()> {
        self.teardown();
        self.initialize()?;
        self.configure()
    }

    fn state(&self) -> SessionState {
        self.state
    }

    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn samples_per_read(&self) -> usize {
        self.samples_per_read
    }

    fn cancel_handle(&self) -> Option<CancelHandle> {
        Some(self.cancel.clone())
    }
}

impl<S: StreamSdk> Drop for StreamChannelReader<S> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(device = %self.name, error = %e, "Failed to stop stream session on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedSdk;
    use crate::stream::sdk::SdkReply;

    fn burst(channel: u32, samples: &[i16]) -> ChannelBurst {
        ChannelBurst::new(channel, samples.to_vec())
    }

    #[test]
    fn test_new_sorts_and_dedups_channels() {
        let reader =
            StreamChannelReader::new(ScriptedSdk::new(), [5, 2, 5], 4, Units::Raw).unwrap();
        assert_eq!(reader.channels(), &[2, 5]);
        assert_eq!(reader.state(), SessionState::Closed);
        assert_eq!(reader.sdk().handle().open_calls(), 0);
    }

    #[test]
    fn test_empty_channel_set_rejected() {
        let channels = Vec::<u32>::new();
        let result = StreamChannelReader::new(ScriptedSdk::new(), channels, 4, Units::Raw);
        assert!(matches!(result, Err(DaqError::InvalidParameter(_))));
    }

    #[test]
    fn test_rows_follow_channel_id_order() {
        let sdk = ScriptedSdk::new();
        let handle = sdk.handle();
        handle.push_poll(SdkReply::ok(vec![
            burst(9, &[90, 91]),
            burst(5, &[50, 51]),
            burst(2, &[20, 21]),
        ]));
        let mut reader = StreamChannelReader::new(sdk, [5, 2], 2, Units::Raw).unwrap();
        reader.start().unwrap();

        let data = reader.read().unwrap();
        assert_eq!(data.row(0), Some(&[20.0, 21.0][..]));
        assert_eq!(data.row(1), Some(&[50.0, 51.0][..]));
    }

    #[test]
    fn test_overflow_carries_into_next_read() {
        let sdk = ScriptedSdk::new();
        let handle = sdk.handle();
        handle.push_poll(SdkReply::ok(vec![burst(1, &[1, 2, 3, 4, 5])]));
        handle.push_poll(SdkReply::ok(vec![burst(1, &[6, 7, 8])]));
        let mut reader = StreamChannelReader::new(sdk, [1], 4, Units::Raw).unwrap();
        reader.start().unwrap();

        let first = reader.read().unwrap();
        assert_eq!(first.row(0), Some(&[1.0, 2.0, 3.0, 4.0][..]));
        let second = reader.read().unwrap();
        assert_eq!(second.row(0), Some(&[5.0, 6.0, 7.0, 8.0][..]));
    }

    #[test]
    fn test_secondary_surplus_kept_for_next_poll() {
        let sdk = ScriptedSdk::new();
        let handle = sdk.handle();
        let first = vec![burst(1, &[1, 2]), burst(2, &[10, 20, 30])];
        handle.push_poll(SdkReply::ok(first));
        handle.push_poll(SdkReply::ok(vec![burst(1, &[3, 4]), burst(2, &[40])]));
        let mut reader = StreamChannelReader::new(sdk, [1, 2], 4, Units::Raw)
            .unwrap()
            .with_poll_interval(Duration::ZERO);
        reader.start().unwrap();

        let data = reader.read().unwrap();
        assert_eq!(data.row(0), Some(&[1.0, 2.0, 3.0, 4.0][..]));
        assert_eq!(data.row(1), Some(&[10.0, 20.0, 30.0, 40.0][..]));
    }

    #[test]
    fn test_short_secondary_burst_padded() {
        let sdk = ScriptedSdk::new();
        let handle = sdk.handle();
        handle.push_poll(SdkReply::ok(vec![burst(1, &[1, 2, 3]), burst(2, &[10])]));
        let mut reader = StreamChannelReader::new(sdk, [1, 2], 3, Units::Raw).unwrap();
        reader.start().unwrap();

        let data = reader.read().unwrap();
        assert_eq!(data.row(1), Some(&[10.0, 0.0, 0.0][..]));
    }

    #[test]
    fn test_failed_polls_are_retried() {
        let sdk = ScriptedSdk::new();
        let handle = sdk.handle();
        handle.push_poll(SdkReply::failed(-1, Vec::new()));
        handle.push_poll(SdkReply::ok(vec![burst(3, &[7, 8])]));
        let mut reader = StreamChannelReader::new(sdk, [3], 2, Units::Raw)
            .unwrap()
            .with_poll_interval(Duration::ZERO);
        reader.start().unwrap();

        assert_eq!(reader.read().unwrap().row(0), Some(&[7.0, 8.0][..]));
    }

    #[test]
    fn test_microvolt_scaling() {
        let sdk = ScriptedSdk::new();
        let handle = sdk.handle();
        handle.push_poll(SdkReply::ok(vec![burst(1, &[4, -8])]));
        let mut reader = StreamChannelReader::new(sdk, [1], 2, Units::Microvolts).unwrap();
        reader.start().unwrap();
        assert_eq!(reader.read().unwrap().row(0), Some(&[1.0, -2.0][..]));
    }

    #[test]
    fn test_missing_channel_filled_with_zeros() {
        let sdk = ScriptedSdk::new();
        let handle = sdk.handle();
        handle.push_poll(SdkReply::ok(vec![burst(1, &[1, 1])]));
        let mut reader = StreamChannelReader::new(sdk, [1, 4], 2, Units::Raw).unwrap();
        reader.start().unwrap();

        let data = reader.read().unwrap();
        assert_eq!(data.row(0), Some(&[1.0, 1.0][..]));
        assert_eq!(data.row(1), Some(&[0.0, 0.0][..]));
    }

    #[test]
    fn test_read_timeout() {
        let mut reader = StreamChannelReader::new(ScriptedSdk::new(), [1], 2, Units::Raw)
            .unwrap()
            .with_read_timeout(Duration::from_millis(20));
        reader.start().unwrap();
        assert!(matches!(reader.read(), Err(DaqError::DeviceTimeout { .. })));
    }

    #[test]
    fn test_cancel_interrupts_read() {
        let sdk = ScriptedSdk::new();
        let mut reader = StreamChannelReader::new(sdk, [1], 2, Units::Raw).unwrap();
        reader.start().unwrap();
        reader.cancel_handle().unwrap().cancel();
        assert!(matches!(reader.read(), Err(DaqError::Cancelled)));
    }

    #[test]
    fn test_config_failure_is_configuration_error() {
        let sdk = ScriptedSdk::new();
        let handle = sdk.handle();
        handle.push_config_status(4);
        let mut reader = StreamChannelReader::new(sdk, [1], 2, Units::Raw).unwrap();
        assert!(matches!(reader.start(), Err(DaqError::Configuration(_))));
        assert_eq!(reader.state(), SessionState::Closed);

        // Connection is kept; a second start only reconfigures
        reader.start().unwrap();
        assert_eq!(reader.sdk().handle().open_calls(), 1);
        assert_eq!(reader.sdk().handle().config_calls(), 2);
    }

    #[test]
    fn test_units_deserialize() {
        let units: Units = serde_json::from_str("\"microvolts\"").unwrap();
        assert_eq!(units, Units::Microvolts);
    }
}
