//! Blocking acquisition loop: start, read N times (or until told to stop), stop.

use crate::device::DaqDevice;
use crate::error::{DaqError, DaqResult};
use crate::matrix::SampleMatrix;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Drive `device` through one session, handing each matrix to `sink`.
///
/// Stops after `reads` matrices when given, otherwise when `stop` is raised or a
/// read is cancelled. The device is stopped on every exit path. Returns the number
/// of matrices delivered.
pub fn run_acquisition<D, F>(
    device: &mut D,
    reads: Option<u64>,
    stop: &AtomicBool,
    mut sink: F,
) -> DaqResult<u64>
where
    D: DaqDevice + ?Sized,
    F: FnMut(u64, &SampleMatrix) -> DaqResult<()>,
{
    device.start()?;
    info!(
        device = %device.name(),
        channels = device.channel_count(),
        samples_per_read = device.samples_per_read(),
        "Acquisition started"
    );

    let mut delivered = 0u64;
    let outcome = loop {
        if reads.is_some_and(|n| delivered >= n) || stop.load(Ordering::SeqCst) {
            break Ok(());
        }
        match device.read() {
            Ok(matrix) => {
                if let Err(e) = sink(delivered, &matrix) {
                    break Err(e);
                }
                delivered += 1;
            }
            Err(DaqError::Cancelled) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    let stopped = device.stop();
    if let Err(e) = &stopped {
        warn!(device = %device.name(), error = %e, "Stop failed");
    }
    info!(device = %device.name(), reads = delivered, "Acquisition finished");
    outcome.and(stopped).map(|()| delivered)
}
