// src/supervisor/segment.rs
//! Frames and per-channel output segments
//!
//! A [`Frame`] holds one second of resampled data for every channel that
//! produced a valid window in that cycle. Each channel appends its share to an
//! [`OutputSegment`], which groups consecutive seconds into contiguous runs.
//! A run is written as one file; a second that is missing starts a new run.

use crate::utils::time::NANOS_PER_SECOND;
use std::collections::{BTreeMap, VecDeque};

/// One cycle's resampled series, keyed by channel name
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub start_ns: u64,
    pub channels: BTreeMap<String, Vec<f64>>,
}

impl Frame {
    pub fn new(start_ns: u64) -> Self {
        Self {
            start_ns,
            channels: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, channel: &str, series: Vec<f64>) {
        self.channels.insert(channel.to_string(), series);
    }

    pub fn get(&self, channel: &str) -> Option<&[f64]> {
        self.channels.get(channel).map(Vec::as_slice)
    }
}

/// Contiguous whole seconds of output samples
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub start_ns: u64,
    pub seconds: usize,
    pub samples: Vec<f64>,
}

impl Run {
    pub fn end_ns(&self) -> u64 {
        self.start_ns + self.seconds as u64 * NANOS_PER_SECOND
    }

    /// Samples rounded to integer counts for storage
    pub fn counts(&self) -> Vec<i32> {
        self.samples
            .iter()
            .map(|v| v.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32)
            .collect()
    }
}

/// Frames accumulated for one channel since its last successful flush
#[derive(Debug)]
pub struct OutputSegment {
    samples_per_second: usize,
    max_seconds: usize,
    runs: VecDeque<Run>,
}

impl OutputSegment {
    pub fn new(samples_per_second: usize, max_seconds: usize) -> Self {
        Self {
            samples_per_second,
            max_seconds: max_seconds.max(1),
            runs: VecDeque::new(),
        }
    }

    /// Append one second starting at `start_ns`
    ///
    /// Returns how many of the oldest seconds were dropped to stay within the
    /// retention cap.
    pub fn push(&mut self, start_ns: u64, series: &[f64]) -> usize {
        match self.runs.back_mut() {
            Some(run) if run.end_ns() == start_ns => {
                run.samples.extend_from_slice(series);
                run.seconds += 1;
            }
            _ => self.runs.push_back(Run {
                start_ns,
                seconds: 1,
                samples: series.to_vec(),
            }),
        }

        let mut dropped = 0;
        while self.seconds() > self.max_seconds {
            self.drop_oldest_second();
            dropped += 1;
        }
        dropped
    }

    fn drop_oldest_second(&mut self) {
        let Some(run) = self.runs.front_mut() else {
            return;
        };
        if run.seconds <= 1 {
            self.runs.pop_front();
            return;
        }
        let cut = self.samples_per_second.min(run.samples.len());
        run.samples.drain(..cut);
        run.start_ns += NANOS_PER_SECOND;
        run.seconds -= 1;
    }

    /// Seconds currently held
    pub fn seconds(&self) -> usize {
        self.runs.iter().map(|run| run.seconds).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn runs(&self) -> impl Iterator<Item = &Run> {
        self.runs.iter()
    }

    /// Hand every run to `write`; runs for which it returns false are kept
    pub fn flush_with<F>(&mut self, mut write: F) -> usize
    where
        F: FnMut(&Run) -> bool,
    {
        let before = self.runs.len();
        self.runs.retain(|run| !write(run));
        before - self.runs.len()
    }
}
