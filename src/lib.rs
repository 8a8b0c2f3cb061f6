//! MSS-Record: acquisition core for a multi-channel seismic data logger
//!
//! This library reads analog channels through per-channel A/D converters on a
//! shared bus and turns them into a continuous waveform stream. It features:
//!
//! - Interrupt-driven sample capture with a bounded hand-off queue per channel
//! - A one-second cadence aligned to wall-clock boundaries
//! - Nearest-neighbour regridding and band-limited FFT resampling
//! - Periodic flush of contiguous segments to miniSEED files
//! - An independent health monitor for time synchronization and channel status
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mss_record::config::RecorderConfig;
//! use mss_record::hal::{simulator::SimulatedBus, DeviceVariant, SharedBus, SoftwareEdges};
//! use mss_record::health::ChannelStatusBoard;
//! use mss_record::storage::MiniSeedWriter;
//! use mss_record::supervisor::AcquisitionSupervisor;
//! use mss_record::utils::{CancellationToken, SystemTimeProvider};
//! use mss_record::acquisition::SharedResources;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RecorderConfig::default();
//!     let bus = SimulatedBus::new().with_device(0x4a, DeviceVariant::Ads1114);
//!     let resources = SharedResources {
//!         bus: SharedBus::new(bus),
//!         edges: Arc::new(SoftwareEdges::new()),
//!         clock: Arc::new(SystemTimeProvider),
//!     };
//!     let writer = MiniSeedWriter::new("/tmp/mseed", 512, config.storage.encoding)?;
//!
//!     let mut supervisor =
//!         AcquisitionSupervisor::new(config, resources, Box::new(writer), ChannelStatusBoard::new())?;
//!     supervisor.initialize();
//!
//!     let cancel = CancellationToken::new();
//!     let handle = supervisor.spawn(cancel.clone())?;
//!     std::thread::sleep(std::time::Duration::from_secs(12));
//!     handle.shutdown();
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod acquisition;
pub mod config;
pub mod error;
pub mod hal;
pub mod health;
pub mod processing;
pub mod storage;
pub mod supervisor;
pub mod utils;

// Re-export commonly used types for convenience
pub use acquisition::{Sample, SampleSource, SampleWindow, SharedResources};
pub use config::{ChannelConfig, ConfigLoader, RecorderConfig};
pub use error::{AcqResult, AcquisitionError, ErrorKind};
pub use hal::{BusError, Converter, EdgeSource, RegisterBus, SharedBus};
pub use health::{ChannelStatus, ChannelStatusBoard, HealthMonitor, HealthReport};
pub use storage::{MiniSeedWriter, StreamId, WaveformWriter};
pub use supervisor::{AcquisitionSupervisor, SupervisorHandle, SupervisorState};
pub use utils::{
    cancel::CancellationToken,
    time::{current_timestamp_nanos, TimeProvider},
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
