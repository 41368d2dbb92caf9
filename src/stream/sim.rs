//! Simulated NSP server for running the stream reader without hardware.
//!
//! Each channel carries a sine wave (10 Hz plus the channel ID) with uniform
//! noise. Polls return bursts of random length, like the real trial buffer.

use super::sdk::{ChannelBurst, ConnectionInfo, ConnectionParams, SdkReply, StreamSdk, TrialConfig};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::time::Duration;

/// Status returned when a call arrives in the wrong state.
pub const STATUS_INVALID_STATE: i32 = -2;

/// Settings for [`SimulatedSdk`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Channels the server reports (IDs `1..=channel_count`)
    #[serde(default = "default_channel_count")]
    pub channel_count: u32,
    /// Nominal sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
    /// Smallest burst per poll
    #[serde(default = "default_burst_min")]
    pub burst_min: usize,
    /// Largest burst per poll
    #[serde(default = "default_burst_max")]
    pub burst_max: usize,
    /// Sine amplitude in raw counts
    #[serde(default = "default_amplitude")]
    pub amplitude: f64,
    /// RNG seed for reproducible bursts
    #[serde(default)]
    pub seed: Option<u64>,
    /// Sleep for the burst's duration on each poll
    #[serde(default)]
    pub realtime: bool,
}

fn default_channel_count() -> u32 {
    32
}

fn default_sample_rate() -> f64 {
    30_000.0
}

fn default_burst_min() -> usize {
    0
}

fn default_burst_max() -> usize {
    300
}

fn default_amplitude() -> f64 {
    1000.0
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            channel_count: default_channel_count(),
            sample_rate: default_sample_rate(),
            burst_min: default_burst_min(),
            burst_max: default_burst_max(),
            amplitude: default_amplitude(),
            seed: None,
            realtime: false,
        }
    }
}

/// [`StreamSdk`] backed by synthetic data.
pub struct SimulatedSdk {
    config: SimulationConfig,
    rng: ChaCha8Rng,
    connected: bool,
    configured: bool,
    /// Samples emitted so far, per channel
    clock: u64,
}

impl SimulatedSdk {
    /// Simulator with the given settings.
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            config,
            rng,
            connected: false,
            configured: false,
            clock: 0,
        }
    }

    fn sample(&mut self, channel_id: u32, t: u64) -> i16 {
        let freq = 10.0 + f64::from(channel_id);
        let phase = TAU * freq * t as f64 / self.config.sample_rate;
        let noise = self.rng.gen_range(-0.05..=0.05) * self.config.amplitude;
        let value = self.config.amplitude * phase.sin() + noise;
        value.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
    }
}

impl StreamSdk for SimulatedSdk {
    fn open(&mut self, params: &ConnectionParams) -> SdkReply<ConnectionInfo> {
        self.connected = true;
        SdkReply::ok(ConnectionInfo {
            connection: params.connection.clone(),
            instrument: "Simulated NSP".to_string(),
        })
    }

    fn trial_config(&mut self, config: &TrialConfig) -> SdkReply<()> {
        if !self.connected {
            return SdkReply::failed(STATUS_INVALID_STATE, ());
        }
        if config.reset {
            self.clock = 0;
        }
        self.configured = true;
        SdkReply::ok(())
    }

    fn trial_continuous(&mut self, _reset: bool) -> SdkReply<Vec<ChannelBurst>> {
        if !self.connected || !self.configured {
            return SdkReply::failed(STATUS_INVALID_STATE, Vec::new());
        }
        let lo = self.config.burst_min.min(self.config.burst_max);
        let len = self.rng.gen_range(lo..=self.config.burst_max);
        if self.config.realtime && len > 0 && self.config.sample_rate > 0.0 {
            let span = Duration::from_secs_f64(len as f64 / self.config.sample_rate);
            std::thread::sleep(span);
        }

        let start = self.clock;
        let bursts = (1..=self.config.channel_count)
            .map(|channel_id| {
                let samples = (0..len as u64)
                    .map(|i| self.sample(channel_id, start + i))
                    .collect::<Vec<_>>();
                ChannelBurst::new(channel_id, samples)
            })
            .collect();
        self.clock += len as u64;
        SdkReply::ok(bursts)
    }

    fn close(&mut self) -> SdkReply<()> {
        if !self.connected {
            return SdkReply::failed(STATUS_INVALID_STATE, ());
        }
        self.connected = false;
        self.configured = false;
        SdkReply::ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> SimulatedSdk {
        SimulatedSdk::new(SimulationConfig {
            channel_count: 4,
            burst_min: 5,
            burst_max: 5,
            seed: Some(7),
            ..Default::default()
        })
    }

    #[test]
    fn test_poll_before_config_fails() {
        let mut sdk = seeded();
        assert!(!sdk.trial_continuous(true).is_ok());
        sdk.open(&ConnectionParams::default());
        assert!(!sdk.trial_continuous(true).is_ok());
    }

    #[test]
    fn test_bursts_cover_all_channels() {
        let mut sdk = seeded();
        sdk.open(&ConnectionParams::default());
        sdk.trial_config(&TrialConfig::continuous());
        let reply = sdk.trial_continuous(true);
        assert!(reply.is_ok());
        let ids: Vec<u32> = reply.payload.iter().map(|b| b.channel_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert!(reply.payload.iter().all(|b| b.samples.len() == 5));
    }

    #[test]
    fn test_close_twice_reports_error() {
        let mut sdk = seeded();
        sdk.open(&ConnectionParams::default());
        assert!(sdk.close().is_ok());
        assert_eq!(sdk.close().status, STATUS_INVALID_STATE);
    }
}
