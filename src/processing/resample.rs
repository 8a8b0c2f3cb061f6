// src/processing/resample.rs
//! Band-limited resampling in the frequency domain
//!
//! The input is treated as one period of a periodic signal: its spectrum is
//! truncated or zero-padded to the target length and transformed back. Even
//! lengths split or merge the Nyquist bin so the output stays real.

use crate::error::{AcqResult, AcquisitionError, ProcessingStage};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// FFT resampler; plans are cached per length
pub struct Resampler {
    planner: FftPlanner<f64>,
}

impl Resampler {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Resample `input` to exactly `num` points
    pub fn resample(&mut self, input: &[f64], num: usize) -> AcqResult<Vec<f64>> {
        let nx = input.len();
        if nx == 0 || num == 0 {
            return Err(AcquisitionError::processing(
                ProcessingStage::Resample,
                format!("cannot resample {} points to {}", nx, num),
            ));
        }
        if nx == num {
            return Ok(input.to_vec());
        }

        let mut spectrum: Vec<Complex<f64>> = input.iter().map(|&x| Complex::new(x, 0.0)).collect();
        self.planner.plan_fft_forward(nx).process(&mut spectrum);

        let n = num.min(nx);
        let nyquist = n / 2 + 1;
        let mut output = vec![Complex::new(0.0, 0.0); num];

        output[..nyquist].copy_from_slice(&spectrum[..nyquist]);
        let negative = n.saturating_sub(nyquist);
        if negative > 0 {
            output[num - negative..].copy_from_slice(&spectrum[nx - negative..]);
        }

        if n % 2 == 0 {
            if num < nx {
                // Fold the -N/2 component onto +N/2
                output[n / 2] += spectrum[nx - n / 2];
            } else {
                // Split the +N/2 component between +N/2 and -N/2
                output[n / 2] *= 0.5;
                output[num - n / 2] = output[n / 2];
            }
        }

        self.planner.plan_fft_inverse(num).process(&mut output);

        let scale = 1.0 / nx as f64;
        Ok(output.into_iter().map(|c| c.re * scale).collect())
    }
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn assert_close(actual: &[f64], expected: &[f64], tolerance: f64) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!((a - e).abs() <= tolerance, "index {}: {} vs {}", i, a, e);
        }
    }

    fn sine(len: usize, cycles: f64, phase: f64) -> Vec<f64> {
        (0..len)
            .map(|k| (2.0 * PI * cycles * k as f64 / len as f64 + phase).sin())
            .collect()
    }

    #[test]
    fn test_same_length_is_identity() {
        let mut resampler = Resampler::new();
        let input = vec![1.0, -2.0, 3.5, 0.25];
        assert_eq!(resampler.resample(&input, 4).unwrap(), input);
    }

    #[test]
    fn test_constant_signal_stays_constant() {
        let mut resampler = Resampler::new();
        let output = resampler.resample(&vec![42.0; 128], 100).unwrap();
        assert_close(&output, &vec![42.0; 100], 1e-9);

        let output = resampler.resample(&vec![-7.0; 100], 128).unwrap();
        assert_close(&output, &vec![-7.0; 128], 1e-9);
    }

    #[test]
    fn test_band_limited_sine_downsampled() {
        let mut resampler = Resampler::new();
        let output = resampler.resample(&sine(128, 3.0, 0.3), 100).unwrap();
        assert_close(&output, &sine(100, 3.0, 0.3), 1e-9);
    }

    #[test]
    fn test_band_limited_sine_upsampled() {
        let mut resampler = Resampler::new();
        let output = resampler.resample(&sine(100, 5.0, 1.1), 128).unwrap();
        assert_close(&output, &sine(128, 5.0, 1.1), 1e-9);
    }

    #[test]
    fn test_odd_lengths() {
        let mut resampler = Resampler::new();
        let output = resampler.resample(&sine(99, 2.0, 0.0), 51).unwrap();
        assert_close(&output, &sine(51, 2.0, 0.0), 1e-9);
    }

    #[test]
    fn test_nyquist_bin_round_trip() {
        // Alternating signal carries all its energy in the Nyquist bin
        let mut resampler = Resampler::new();
        let input: Vec<f64> = (0..8).map(|k| if k % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let up = resampler.resample(&input, 16).unwrap();
        let down = resampler.resample(&up, 8).unwrap();
        assert_close(&down, &input, 1e-9);
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let mut resampler = Resampler::new();
        assert!(resampler.resample(&[], 10).is_err());
        assert!(resampler.resample(&[1.0], 0).is_err());
    }
}
