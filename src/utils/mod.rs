//! Common utilities shared by the acquisition core
//!
//! - Wall-clock access, whole-second alignment and ISO formatting
//! - Cancellation token for long-lived tasks

pub mod cancel;
pub mod time;

pub use cancel::CancellationToken;
pub use time::{
    current_timestamp_nanos,
    floor_to_second,
    MockTimeProvider,
    SystemTimeProvider,
    TimeProvider,
    NANOS_PER_SECOND,
};
