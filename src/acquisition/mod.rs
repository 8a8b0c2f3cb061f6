// src/acquisition/mod.rs
//! Sample capture and per-channel buffering

pub mod handoff;
pub mod sample;
pub mod sample_source;

pub use handoff::{handoff, HandoffConsumer, HandoffProducer};
pub use sample::{ChannelBuffer, Sample, SampleWindow};
pub use sample_source::{CaptureStats, SampleSource, SharedResources};
