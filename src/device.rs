//! The common reader contract.
//!
//! Every backend implements [`DaqDevice`], which models a session with a small,
//! linear state machine:
//!
//! ```text
//!   Closed --start()--> Open --read()*--> Open --stop()--> Closed
//! ```
//!
//! - `start()` on an open session and `stop()` on a closed one are no-ops.
//! - `read()` on a closed session fails with [`DaqError::SessionClosed`].
//! - A backend may enter `Faulted` when connecting fails; only `reset()` leaves it.
//!
//! All calls block the calling thread. Sessions are driven through `&mut self`, so
//! sharing one between threads requires external locking.
//!
//! [`DaqError::SessionClosed`]: crate::error::DaqError::SessionClosed

use crate::error::DaqResult;
use crate::matrix::SampleMatrix;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lifecycle state of a reader session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection held
    Closed,
    /// Connection established and streaming
    Open,
    /// Connecting failed; unusable until `reset()`
    Faulted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Closed => "closed",
            SessionState::Open => "open",
            SessionState::Faulted => "faulted",
        };
        write!(f, "{}", label)
    }
}

/// Blocking start/read/stop interface shared by all acquisition backends.
pub trait DaqDevice: Send {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Open the connection and begin streaming. Idempotent.
    fn start(&mut self) -> DaqResult<()>;

    /// Block until `samples_per_read` samples per channel are available.
    ///
    /// Returns a fresh `(channel_count, samples_per_read)` matrix.
    fn read(&mut self) -> DaqResult<SampleMatrix>;

    /// Stop streaming and release the connection. Idempotent.
    fn stop(&mut self) -> DaqResult<()>;

    /// Tear down and re-establish the session.
    ///
    /// The default is `stop()` followed by `start()`.
    fn reset(&mut self) -> DaqResult<()> {
        self.stop()?;
        self.start()
    }

    /// Current lifecycle state.
    fn state(&self) -> SessionState;

    /// Rows in every returned matrix.
    fn channel_count(&self) -> usize;

    /// Columns in every returned matrix.
    fn samples_per_read(&self) -> usize;

    /// Whether `read()` may be called.
    fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Handle for interrupting a blocking `read()` from another thread.
    ///
    /// Backends whose reads are already bounded by an I/O timeout return `None`.
    fn cancel_handle(&self) -> Option<CancelHandle> {
        None
    }
}

/// Cross-thread request to abandon the current or next blocking read.
///
/// A request is consumed by the read that observes it.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Fresh handle with no pending request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a request is pending.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Consume a pending request.
    pub(crate) fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

impl<D: DaqDevice + ?Sized> DaqDevice for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn start(&mut self) -> DaqResult<()> {
        (**self).start()
    }

    fn read(&mut self) -> DaqResult<SampleMatrix> {
        (**self).read()
    }

    fn stop(&mut self) -> DaqResult<()> {
        (**self).stop()
    }

    fn reset(&mut self) -> DaqResult<()> {
        (**self).reset()
    }

    fn state(&self) -> SessionState {
        (**self).state()
    }

    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }

    fn samples_per_read(&self) -> usize {
        (**self).samples_per_read()
    }

    fn cancel_handle(&self) -> Option<CancelHandle> {
        (**self).cancel_handle()
    }
}

/// Reject zero-sized shapes up front.
pub(crate) fn validate_shape(channels: usize, samples_per_read: usize) -> DaqResult<()> {
    use crate::error::DaqError;

    if channels == 0 {
        return Err(DaqError::InvalidParameter(
            "at least one channel is required".into(),
        ));
    }
    if samples_per_read == 0 {
        return Err(DaqError::InvalidParameter(
            "samples_per_read must be positive".into(),
        ));
    }
    Ok(())
}
