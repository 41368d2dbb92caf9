//! Channels-by-samples buffer returned from every `read()`.

use serde::{Deserialize, Serialize};

/// Dense 2-D sample buffer, one row per channel and one column per time step.
///
/// Storage is row-major, so each channel's samples are contiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMatrix {
    channels: usize,
    samples: usize,
    data: Vec<f64>,
}

impl SampleMatrix {
    /// Zero-filled matrix of the given shape.
    pub fn zeros(channels: usize, samples: usize) -> Self {
        Self {
            channels,
            samples,
            data: vec![0.0; channels * samples],
        }
    }

    /// Build a matrix from interleaved frames.
    ///
    /// `frames` holds `samples` consecutive frames of `channels` values each
    /// (sample-major order, as sent over the wire). The result is transposed so
    /// that each channel becomes a row. Returns `None` when the length does not
    /// match the shape.
    pub fn from_interleaved(frames: &[f64], channels: usize, samples: usize) -> Option<Self> {
        if frames.len() != channels * samples {
            return None;
        }
        let mut matrix = Self::zeros(channels, samples);
        for (t, frame) in frames.chunks_exact(channels.max(1)).enumerate() {
            for (c, value) in frame.iter().enumerate() {
                matrix.set(c, t, *value);
            }
        }
        Some(matrix)
    }

    /// (channels, samples)
    pub fn shape(&self) -> (usize, usize) {
        (self.channels, self.samples)
    }

    /// Number of rows.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of columns.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Value at `[channel, sample]`, or `None` when out of bounds.
    pub fn get(&self, channel: usize, sample: usize) -> Option<f64> {
        if channel < self.channels && sample < self.samples {
            Some(self.data[channel * self.samples + sample])
        } else {
            None
        }
    }

    /// Write a single cell. Out-of-bounds writes are ignored.
    pub fn set(&mut self, channel: usize, sample: usize, value: f64) {
        if channel < self.channels && sample < self.samples {
            self.data[channel * self.samples + sample] = value;
        }
    }

    /// Copy `values` into row `channel` starting at column `offset`.
    ///
    /// Values that would land past the last column are not written. Returns the
    /// number of values written.
    pub fn write_row_segment(&mut self, channel: usize, offset: usize, values: &[f64]) -> usize {
        if channel >= self.channels || offset >= self.samples {
            return 0;
        }
        let n = values.len().min(self.samples - offset);
        let start = channel * self.samples + offset;
        self.data[start..start + n].copy_from_slice(&values[..n]);
        n
    }

    /// Samples of one channel.
    pub fn row(&self, channel: usize) -> Option<&[f64]> {
        if channel < self.channels {
            let start = channel * self.samples;
            Some(&self.data[start..start + self.samples])
        } else {
            None
        }
    }

    /// Iterator over all rows in channel order.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact panics on 0
        self.data
            .chunks_exact(self.samples.max(1))
            .take(self.channels)
    }

    /// Flat row-major view.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}
