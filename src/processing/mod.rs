// src/processing/mod.rs
//! Window regridding and resampling

pub mod regrid;
pub mod resample;

pub use regrid::regrid_nearest;
pub use resample::Resampler;

use crate::acquisition::SampleWindow;
use crate::error::AcqResult;

/// Regrid a window onto `channel_rate` points, then resample to `output_rate`
pub fn regrid_window(
    resampler: &mut Resampler,
    window: &SampleWindow,
    channel_rate: usize,
    output_rate: usize,
) -> AcqResult<Vec<f64>> {
    let grid = regrid_nearest(window.start_ns, window.with_anchor(), channel_rate)?;
    resampler.resample(&grid, output_rate)
}
