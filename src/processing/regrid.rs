// src/processing/regrid.rs
//! Nearest-neighbour regridding onto a uniform phase grid
//!
//! A window's samples are expressed as offsets from the window start. Target
//! points sit at `k / N` seconds for `k` in `0..N`; each takes the value of the
//! captured sample closest in time, the earlier one on a tie. The continuity
//! anchor has a negative offset and takes part like any other sample.

use crate::acquisition::Sample;
use crate::error::{AcqResult, AcquisitionError, ProcessingStage};
use crate::utils::time::NANOS_PER_SECOND;

/// Regrid `samples` (sorted by timestamp) onto `points` evenly spaced targets
/// covering one second from `start_ns`
pub fn regrid_nearest<'a, I>(start_ns: u64, samples: I, points: usize) -> AcqResult<Vec<f64>>
where
    I: IntoIterator<Item = &'a Sample>,
{
    if points == 0 {
        return Err(AcquisitionError::processing(ProcessingStage::Regrid, "target grid is empty"));
    }

    let offsets: Vec<(f64, i32)> = samples
        .into_iter()
        .map(|s| (s.timestamp_ns.wrapping_sub(start_ns) as i64 as f64, s.value))
        .collect();
    if offsets.is_empty() {
        return Err(AcquisitionError::processing(ProcessingStage::Regrid, "no samples to regrid"));
    }

    let step = NANOS_PER_SECOND as f64 / points as f64;
    let mut grid = Vec::with_capacity(points);
    let mut nearest = 0usize;

    for k in 0..points {
        let target = k as f64 * step;
        // Advance to the next distinct offset only while it is strictly closer
        loop {
            let mut next = nearest + 1;
            while next < offsets.len() && offsets[next].0 == offsets[nearest].0 {
                next += 1;
            }
            if next < offsets.len() && (offsets[next].0 - target).abs() < (offsets[nearest].0 - target).abs() {
                nearest = next;
            } else {
                break;
            }
        }
        grid.push(offsets[nearest].1 as f64);
    }

    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const START: u64 = 1_714_564_800 * NANOS_PER_SECOND;

    fn at(offset_ns: u64, value: i32) -> Sample {
        Sample::new(START + offset_ns, value)
    }

    #[test]
    fn test_aligned_samples_pass_through() {
        let samples: Vec<Sample> = (0..8).map(|k| at(k * NANOS_PER_SECOND / 8, k as i32 * 10)).collect();
        let grid = regrid_nearest(START, &samples, 8).unwrap();
        assert_eq!(grid, vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0]);
    }

    #[test]
    fn test_tie_goes_to_earlier_sample() {
        // Target 0.5 s sits exactly between 0.25 s and 0.75 s
        let samples = vec![at(250_000_000, 1), at(750_000_000, 2)];
        let grid = regrid_nearest(START, &samples, 2).unwrap();
        assert_eq!(grid, vec![1.0, 1.0]);
    }

    #[test]
    fn test_anchor_before_window_start() {
        let anchor = Sample::new(START - 1_000_000, 7);
        let samples = vec![anchor, at(400_000_000, 9)];
        let grid = regrid_nearest(START, &samples, 4).unwrap();
        assert_eq!(grid, vec![7.0, 9.0, 9.0, 9.0]);
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let samples: Vec<Sample> = Vec::new();
        assert!(regrid_nearest(START, &samples, 10).is_err());
        assert!(regrid_nearest(START, &[at(0, 1)], 0).is_err());
    }

    fn brute_force(offsets: &[u64], values: &[i32], points: usize) -> Vec<f64> {
        let step = NANOS_PER_SECOND as f64 / points as f64;
        (0..points)
            .map(|k| {
                let target = k as f64 * step;
                let mut best = 0;
                for i in 1..offsets.len() {
                    if (offsets[i] as f64 - target).abs() < (offsets[best] as f64 - target).abs() {
                        best = i;
                    }
                }
                values[best] as f64
            })
            .collect()
    }

    proptest! {
        #[test]
        fn prop_regrid_matches_nearest_by_phase(
            mut offsets in prop::collection::vec(0u64..NANOS_PER_SECOND, 1..200),
            points in 1usize..300,
        ) {
            offsets.sort_unstable();
            let values: Vec<i32> = (0..offsets.len() as i32).collect();
            let samples: Vec<Sample> = offsets.iter().zip(&values).map(|(o, v)| at(*o, *v)).collect();

            let grid = regrid_nearest(START, &samples, points).unwrap();
            prop_assert_eq!(grid.len(), points);
            prop_assert_eq!(grid, brute_force(&offsets, &values, points));
        }
    }
}
