//! # DAQ Readers
//!
//! Blocking `start()/read()/stop()` readers for a handful of acquisition devices,
//! each returning a channels-by-samples [`SampleMatrix`] per read.
//!
//! ## Crate Structure
//!
//! - **`device`**: The [`DaqDevice`] trait and the session state machine every reader follows.
//! - **`matrix`**: [`SampleMatrix`], the row-per-channel buffer returned by `read()`.
//! - **`error`**: [`DaqError`] and the non-fatal [`MalformedSample`] warning.
//! - **`serial`**: Arduino-style newline protocol over a serial port, with pluggable
//!   port discovery.
//! - **`stream`**: Blackrock Neuroport/Cerebus stream reader over the [`StreamSdk`]
//!   boundary, plus a simulated server.
//! - **`socket`**: TCP/UDP readers for raw little-endian float streams.
//! - **`pacing`**: Fixed-rate pacing for devices that answer faster than they sample.
//! - **`acquisition`**: The start / read loop / stop driver used by the CLI.
//! - **`config`**, **`factory`**, **`logging`**: Figment run configuration, reader
//!   construction from it, and tracing setup.
//! - **`mock`**: Scripted test doubles for the serial transport and the stream SDK.
//!
//! [`StreamSdk`]: stream::StreamSdk

pub mod acquisition;
pub mod config;
pub mod device;
pub mod error;
pub mod factory;
pub mod logging;
pub mod matrix;
pub mod mock;
pub mod pacing;
pub mod serial;
pub mod socket;
pub mod stream;

pub use device::{CancelHandle, DaqDevice, SessionState};
pub use error::{DaqError, DaqResult, MalformedSample};
pub use matrix::SampleMatrix;
