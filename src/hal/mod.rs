// src/hal/mod.rs
//! Hardware Abstraction Layer for ADS1x15 converters and data-ready edges

pub mod ads111x;
pub mod edge;
pub mod traits;
pub mod types;

#[cfg(feature = "simulation")]
pub mod simulator;

#[cfg(test)]
mod tests;

pub use ads111x::Ads111x;
pub use edge::SoftwareEdges;
pub use traits::*;
pub use types::*;
