//! AidSorter sorting controller
//!
//! This crate drives a camera-fed conveyor that sorts goods into five buckets.
//! Objects are classified per frame by an external detector; the controller
//! turns a stable majority read into gate and platform commands sent to a
//! microcontroller over a serial line.
//!
//! # Architecture
//!
//! The controller keeps four properties by construction:
//!
//! 1. **Single Flight**: only one object is between commit and drop at a time.
//! 2. **Lock-Step Wire**: every MCU command is answered before the next is sent.
//! 3. **Stable Reads**: a category is committed only after a full window of
//!    single-object frames agrees on it by majority.
//! 4. **Never Crash the Conveyor**: after startup, every failure is flagged on
//!    the error indicator and retried.
//!
//! # Module Structure
//!
//! - `protocol`: wire vocabulary and framing (Command, Response, Codec)
//! - `mcu`: serial client and link implementations
//! - `buckets`: bucket and gate numbers, category tables
//! - `sampler`, `sorter`: per-frame decision logic
//! - `controller`: frame loop, recovery and shutdown
//! - `ingest`, `detect`, `frame`: camera and detector seams

pub mod buckets;
pub mod config;
pub mod controller;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod mcu;
pub mod protocol;
pub mod sampler;
pub mod sorter;
pub mod stats;
pub mod ui;

pub use buckets::{Bucket, BucketTable, Gate};
pub use config::SorterConfig;
pub use controller::{Controller, RecoveryPolicy};
pub use detect::{Detection, DetectionFilter, Detector, ReplayDetector, StubDetector};
pub use error::{ConfigError, ConnectionError, ProtocolError, Result, SorterError};
pub use frame::Frame;
pub use ingest::{open_source, FrameSource, SourceConfig, SyntheticSource};
pub use mcu::{McuClient, McuLink, ScriptedLink, SerialLink, SimulatedMcu};
pub use protocol::{Codec, Command, IrStates, Response};
pub use sampler::{majority_vote, Observation, SampleAggregator, SampleBuffer};
pub use sorter::{Sorter, SortingSession, StepOutcome};
pub use stats::{FpsMeter, SortTally};

#[cfg(feature = "detect-remote")]
pub use detect::RemoteDetector;

pub const NAME: &str = "AidSorter";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Product name and version, e.g. `AidSorter v0.2.0`.
pub fn title() -> String {
    format!("{} v{}", NAME, VERSION)
}
