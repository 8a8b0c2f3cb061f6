// src/acquisition/sample.rs
//! Captured samples and the per-channel windowed buffer
//!
//! [`ChannelBuffer`] keeps samples ordered by timestamp. Taking a window
//! `[start, end)` returns the samples inside it and discards everything before
//! `end` except the newest such sample, which is kept as the continuity anchor
//! for the following window.

use std::collections::VecDeque;

/// One conversion result stamped at edge time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Nanoseconds since the Unix epoch
    pub timestamp_ns: u64,
    pub value: i32,
}

impl Sample {
    pub fn new(timestamp_ns: u64, value: i32) -> Self {
        Self { timestamp_ns, value }
    }
}

/// Samples of one channel inside `[start_ns, end_ns)`
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    pub start_ns: u64,
    pub end_ns: u64,
    /// Newest sample before `start_ns`, if it is recent enough to interpolate against
    pub anchor: Option<Sample>,
    pub samples: Vec<Sample>,
}

impl SampleWindow {
    /// Number of samples inside the window; the anchor is not counted
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Anchor followed by the in-window samples
    pub fn with_anchor(&self) -> impl Iterator<Item = &Sample> {
        self.anchor.iter().chain(self.samples.iter())
    }
}

/// Ordered per-channel sample store
#[derive(Debug, Default)]
pub struct ChannelBuffer {
    samples: VecDeque<Sample>,
}

impl ChannelBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Insert keeping timestamps non-decreasing; equal timestamps keep arrival order
    pub fn push(&mut self, sample: Sample) {
        match self.samples.back() {
            Some(last) if sample.timestamp_ns < last.timestamp_ns => {
                let index = self
                    .samples
                    .partition_point(|s| s.timestamp_ns <= sample.timestamp_ns);
                self.samples.insert(index, sample);
            }
            _ => self.samples.push_back(sample),
        }
    }

    /// Consume the window `[start_ns, end_ns)`
    ///
    /// The newest sample before `start_ns` becomes the window's anchor when it lies
    /// within `max_anchor_gap_ns` of the start. Afterwards the buffer holds the
    /// newest sample before `end_ns` plus any samples at or after `end_ns`.
    pub fn take_window(&mut self, start_ns: u64, end_ns: u64, max_anchor_gap_ns: u64) -> SampleWindow {
        let first_inside = self.samples.partition_point(|s| s.timestamp_ns < start_ns);
        let first_after = self.samples.partition_point(|s| s.timestamp_ns < end_ns);

        let anchor = first_inside
            .checked_sub(1)
            .map(|index| self.samples[index])
            .filter(|sample| start_ns - sample.timestamp_ns <= max_anchor_gap_ns);

        let samples: Vec<Sample> = self
            .samples
            .range(first_inside..first_after.max(first_inside))
            .copied()
            .collect();

        // Keep the newest sample before `end_ns` as the next anchor
        let keep_from = first_after.saturating_sub(1);
        self.samples.drain(..keep_from);

        SampleWindow {
            start_ns,
            end_ns,
            anchor,
            samples,
        }
    }
}

impl Extend<Sample> for ChannelBuffer {
    fn extend<I: IntoIterator<Item = Sample>>(&mut self, iter: I) {
        for sample in iter {
            self.push(sample);
        }
    }
}
