//! Blackrock neural stream backend.
//!
//! - [`sdk`]: the [`StreamSdk`] boundary (open / trial_config / trial_continuous / close)
//! - [`reader`]: [`StreamChannelReader`], which accumulates bursts into fixed-size reads
//! - [`sim`]: [`SimulatedSdk`], synthetic data for running without an NSP

pub mod reader;
pub mod sdk;
pub mod sim;

pub use reader::{StreamChannelReader, Units, MICROVOLTS_PER_COUNT};
pub use sdk::{ChannelBurst, ConnectionInfo, ConnectionParams, SdkReply, StreamSdk, TrialConfig};
pub use sim::{SimulatedSdk, SimulationConfig};
