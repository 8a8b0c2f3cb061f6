// src/supervisor/cadence.rs
//! One-second cadence aligned to wall-clock boundaries
//!
//! Each wait targets the next whole second after the current time. A late
//! wake-up is processed immediately and the following target is computed from
//! the time at that point, so skipped seconds are never caught up.

use crate::config::constants::acquisition::LATE_THRESHOLD_NS;
use crate::error::{AcquisitionError, ErrorContext};
use crate::utils::cancel::CancellationToken;
use crate::utils::time::{floor_to_second, TimeProvider, NANOS_PER_SECOND};
use std::sync::Arc;
use std::time::Duration;

/// One cadence wake-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Whole-second boundary that ended the window to collect
    pub boundary_ns: u64,
    /// Clock reading at wake-up
    pub woke_ns: u64,
    /// Seconds since the previous tick that produced no tick of their own
    pub skipped: u64,
}

impl Tick {
    /// The one-second window `[boundary - 1s, boundary)`
    pub fn window(&self) -> (u64, u64) {
        (self.boundary_ns.saturating_sub(NANOS_PER_SECOND), self.boundary_ns)
    }

    pub fn lateness_ns(&self) -> u64 {
        self.woke_ns.saturating_sub(self.boundary_ns)
    }

    /// `TimingLate` when boundaries were skipped or the wake-up missed its boundary
    pub fn late_error(&self) -> Option<AcquisitionError> {
        if self.skipped == 0 && self.lateness_ns() < LATE_THRESHOLD_NS {
            return None;
        }
        let expected_ns = self.boundary_ns.saturating_sub(self.skipped * NANOS_PER_SECOND);
        Some(AcquisitionError::TimingLate {
            expected_ns,
            actual_ns: self.woke_ns,
            context: ErrorContext::new("cadence", "wait_next")
                .add_info("skipped_seconds", self.skipped.to_string()),
        })
    }
}

pub struct Cadence {
    clock: Arc<dyn TimeProvider>,
    last_boundary_ns: Option<u64>,
}

impl Cadence {
    pub fn new(clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            clock,
            last_boundary_ns: None,
        }
    }

    /// Sleep until the next whole second. Returns `None` once cancelled.
    pub fn wait_next(&mut self, cancel: &CancellationToken) -> Option<Tick> {
        let target = floor_to_second(self.clock.now_nanos()) + NANOS_PER_SECOND;

        // The wall clock and the sleep timer may disagree slightly
        let woke_ns = loop {
            let now = self.clock.now_nanos();
            if now >= target {
                break now;
            }
            if self.clock.sleep(Duration::from_nanos(target - now), cancel) {
                return None;
            }
        };

        let boundary_ns = floor_to_second(woke_ns);
        let skipped = self
            .last_boundary_ns
            .map(|last| (boundary_ns.saturating_sub(last) / NANOS_PER_SECOND).saturating_sub(1))
            .unwrap_or(0);
        self.last_boundary_ns = Some(boundary_ns);

        Some(Tick {
            boundary_ns,
            woke_ns,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::utils::time::MockTimeProvider;

    // 2024-05-01T12:00:00Z
    const NOON: u64 = 1_714_564_800 * NANOS_PER_SECOND;

    #[test]
    fn test_first_tick_on_next_second() {
        let clock = Arc::new(MockTimeProvider::new(NOON + 350_000_000));
        let mut cadence = Cadence::new(clock.clone());
        let cancel = CancellationToken::new();

        let tick = cadence.wait_next(&cancel).unwrap();
        assert_eq!(tick.boundary_ns, NOON + NANOS_PER_SECOND);
        assert_eq!(tick.woke_ns, NOON + NANOS_PER_SECOND);
        assert_eq!(tick.window(), (NOON, NOON + NANOS_PER_SECOND));
        assert!(tick.late_error().is_none());

        for second in 2..5 {
            let tick = cadence.wait_next(&cancel).unwrap();
            assert_eq!(tick.boundary_ns, NOON + second * NANOS_PER_SECOND);
            assert_eq!(tick.skipped, 0);
        }
    }

    #[test]
    fn test_late_cycle_skips_without_catch_up() {
        let clock = Arc::new(MockTimeProvider::new(NOON + 350_000_000));
        let mut cadence = Cadence::new(clock.clone());
        let cancel = CancellationToken::new();
        cadence.wait_next(&cancel).unwrap();

        // Processing overran by 2.4 s
        clock.advance_by(2_400_000_000);
        let tick = cadence.wait_next(&cancel).unwrap();
        assert_eq!(tick.boundary_ns, NOON + 4 * NANOS_PER_SECOND);
        assert_eq!(tick.skipped, 2);

        let late = tick.late_error().unwrap();
        assert_eq!(late.kind(), ErrorKind::TimingLate);

        let tick = cadence.wait_next(&cancel).unwrap();
        assert_eq!(tick.boundary_ns, NOON + 5 * NANOS_PER_SECOND);
        assert_eq!(tick.skipped, 0);
    }

    #[test]
    fn test_tick_near_clock_origin_saturates() {
        let tick = Tick {
            boundary_ns: 400_000_000,
            woke_ns: 350_000_000,
            skipped: 1,
        };
        assert_eq!(tick.window(), (0, 400_000_000));
        assert_eq!(tick.lateness_ns(), 0);
        match tick.late_error() {
            Some(AcquisitionError::TimingLate { expected_ns, .. }) => assert_eq!(expected_ns, 0),
            other => panic!("expected timing error, got {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_wait_returns_none() {
        let clock = Arc::new(MockTimeProvider::new(NOON));
        let mut cadence = Cadence::new(clock);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(cadence.wait_next(&cancel).is_none());
    }
}
