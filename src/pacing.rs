//! Fixed-rate pacing for reads.
//!
//! Some devices stream faster than their nominal sampling rate, or buffer enough
//! that a read returns immediately. A [`ReadPacer`] makes consecutive reads return
//! with a constant period, as long as the caller keeps up.

use std::time::{Duration, Instant};

/// Sleeps so that successive `pace()` calls are spaced by one period.
#[derive(Debug, Clone)]
pub struct ReadPacer {
    period: Duration,
    last: Option<Instant>,
}

impl ReadPacer {
    /// Pacer with an explicit period.
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    /// Period for `samples_per_read` samples at `rate` Hz.
    ///
    /// Returns `None` for non-positive or non-finite rates.
    pub fn for_rate(rate: f64, samples_per_read: usize) -> Option<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return None;
        }
        let period = Duration::from_secs_f64(samples_per_read as f64 / rate);
        Some(Self::new(period))
    }

    /// Configured period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Block until one period has passed since the previous call.
    ///
    /// The first call returns immediately. If the caller fell behind, the pacer
    /// re-anchors at the current time instead of trying to catch up.
    pub fn pace(&mut self) {
        let now = Instant::now();
        let next = match self.last {
            Some(last) => last + self.period,
            None => now,
        };
        if next > now {
            std::thread::sleep(next - now);
            self.last = Some(next);
        } else {
            self.last = Some(now);
        }
    }

    /// Forget the previous pacing point.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
