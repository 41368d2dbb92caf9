//! Test doubles for the driver boundaries.
//!
//! - [`MockLineTransport`]: scripted newline stream for the serial reader
//! - [`ScriptedSdk`]: scripted status codes and bursts for the stream reader
//!
//! Both hand out a cloneable handle so tests can feed data and inspect calls
//! after the double has been moved into a reader.

use crate::error::{DaqError, DaqResult, STATUS_OK};
use crate::serial::LineTransport;
use crate::stream::sdk::{
    ChannelBurst, ConnectionInfo, ConnectionParams, SdkReply, StreamSdk, TrialConfig,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Serial
// =============================================================================

#[derive(Debug, Default)]
struct LineState {
    pending: VecDeque<String>,
    open: bool,
    fail_open: bool,
    open_count: u32,
    close_count: u32,
    clear_count: u32,
}

/// Scripted [`LineTransport`].
///
/// Lines pushed through the handle are returned one per `read_line()`. When no
/// line is pending the read fails with `DeviceTimeout`, as a stalled device would.
/// Clearing buffers discards pending lines.
#[derive(Debug, Clone)]
pub struct MockLineTransport {
    name: String,
    timeout: Duration,
    state: Arc<Mutex<LineState>>,
}

/// Inspection and feeding handle for a [`MockLineTransport`].
#[derive(Debug, Clone)]
pub struct MockLineHandle {
    state: Arc<Mutex<LineState>>,
}

impl MockLineTransport {
    /// Closed transport named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout: Duration::from_millis(100),
            state: Arc::new(Mutex::new(LineState::default())),
        }
    }

    /// Handle sharing this transport's state.
    pub fn handle(&self) -> MockLineHandle {
        MockLineHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl MockLineHandle {
    /// Queue lines for reading.
    pub fn push_lines<I, L>(&self, lines: I)
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        self.state
            .lock()
            .pending
            .extend(lines.into_iter().map(Into::into));
    }

    /// Make the next `open()` calls fail.
    pub fn fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    /// Whether the transport is open.
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Successful `open()` calls.
    pub fn open_count(&self) -> u32 {
        self.state.lock().open_count
    }

    /// `close()` calls.
    pub fn close_count(&self) -> u32 {
        self.state.lock().close_count
    }

    /// `clear_buffers()` calls.
    pub fn clear_count(&self) -> u32 {
        self.state.lock().clear_count
    }

    /// Lines not yet read.
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl LineTransport for MockLineTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> DaqResult<()> {
        let mut state = self.state.lock();
        if state.fail_open {
            return Err(DaqError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not available", self.name),
            )));
        }
        state.open = true;
        state.open_count += 1;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn clear_buffers(&mut self) -> DaqResult<()> {
        let mut state = self.state.lock();
        state.pending.clear();
        state.clear_count += 1;
        Ok(())
    }

    fn read_line(&mut self, line: &mut String) -> DaqResult<()> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(DaqError::SessionClosed(self.name.clone()));
        }
        match state.pending.pop_front() {
            Some(next) => {
                line.push_str(&next);
                Ok(())
            }
            None => Err(DaqError::DeviceTimeout {
                device: self.name.clone(),
                timeout: self.timeout,
            }),
        }
    }

    fn close(&mut self) -> DaqResult<()> {
        let mut state = self.state.lock();
        state.open = false;
        state.close_count += 1;
        Ok(())
    }
}

// =============================================================================
// Stream SDK
// =============================================================================

#[derive(Debug, Default)]
struct SdkState {
    open_statuses: VecDeque<i32>,
    config_statuses: VecDeque<i32>,
    close_statuses: VecDeque<i32>,
    polls: VecDeque<SdkReply<Vec<ChannelBurst>>>,
    open_calls: u32,
    config_calls: u32,
    poll_calls: u32,
    close_calls: u32,
    last_trial: Option<TrialConfig>,
    last_params: Option<ConnectionParams>,
}

/// Scripted [`StreamSdk`].
///
/// Each primitive pops its next status from a queue and succeeds when the queue
/// is empty. Polls pop scripted replies and return an empty burst list once the
/// script runs out.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSdk {
    state: Arc<Mutex<SdkState>>,
}

/// Scripting and inspection handle for a [`ScriptedSdk`].
#[derive(Debug, Clone)]
pub struct ScriptedSdkHandle {
    state: Arc<Mutex<SdkState>>,
}

impl ScriptedSdk {
    /// SDK whose calls all succeed and whose polls return nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle sharing this SDK's state.
    pub fn handle(&self) -> ScriptedSdkHandle {
        ScriptedSdkHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl ScriptedSdkHandle {
    /// Status for the next `open()`.
    pub fn push_open_status(&self, status: i32) {
        self.state.lock().open_statuses.push_back(status);
    }

    /// Status for the next `trial_config()`.
    pub fn push_config_status(&self, status: i32) {
        self.state.lock().config_statuses.push_back(status);
    }

    /// Status for the next `close()`.
    pub fn push_close_status(&self, status: i32) {
        self.state.lock().close_statuses.push_back(status);
    }

    /// Reply for the next `trial_continuous()`.
    pub fn push_poll(&self, reply: SdkReply<Vec<ChannelBurst>>) {
        self.state.lock().polls.push_back(reply);
    }

    /// `open()` calls so far.
    pub fn open_calls(&self) -> u32 {
        self.state.lock().open_calls
    }

    /// `trial_config()` calls so far.
    pub fn config_calls(&self) -> u32 {
        self.state.lock().config_calls
    }

    /// `trial_continuous()` calls so far.
    pub fn poll_calls(&self) -> u32 {
        self.state.lock().poll_calls
    }

    /// `close()` calls so far.
    pub fn close_calls(&self) -> u32 {
        self.state.lock().close_calls
    }

    /// Most recent trial configuration.
    pub fn last_trial_config(&self) -> Option<TrialConfig> {
        self.state.lock().last_trial
    }

    /// Most recent connection parameters.
    pub fn last_connection_params(&self) -> Option<ConnectionParams> {
        self.state.lock().last_params.clone()
    }
}

impl StreamSdk for ScriptedSdk {
    fn open(&mut self, params: &ConnectionParams) -> SdkReply<ConnectionInfo> {
        let mut state = self.state.lock();
        state.open_calls += 1;
        state.last_params = Some(params.clone());
        let status = state.open_statuses.pop_front().unwrap_or(STATUS_OK);
        SdkReply {
            status,
            payload: ConnectionInfo {
                connection: params.connection.clone(),
                instrument: "Scripted NSP".to_string(),
            },
        }
    }

    fn trial_config(&mut self, config: &TrialConfig) -> SdkReply<()> {
        let mut state = self.state.lock();
        state.config_calls += 1;
        state.last_trial = Some(*config);
        let status = state.config_statuses.pop_front().unwrap_or(STATUS_OK);
        SdkReply {
            status,
            payload: (),
        }
    }

    fn trial_continuous(&mut self, _reset: bool) -> SdkReply<Vec<ChannelBurst>> {
        let mut state = self.state.lock();
        state.poll_calls += 1;
        state
            .polls
            .pop_front()
            .unwrap_or_else(|| SdkReply::ok(Vec::new()))
    }

    fn close(&mut self) -> SdkReply<()> {
        let mut state = self.state.lock();
        state.close_calls += 1;
        let status = state.close_statuses.pop_front().unwrap_or(STATUS_OK);
        SdkReply {
            status,
            payload: (),
        }
    }
}
