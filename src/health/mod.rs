// src/health/mod.rs
//! Station health: time synchronization and per-channel status
//!
//! The acquisition core publishes channel status to a [`ChannelStatusBoard`];
//! the [`HealthMonitor`] combines it with the time sync probe on a fixed
//! interval and drives the status indicators. Nothing here feeds back into
//! acquisition.

pub mod ntp;

pub use ntp::{parse_ntpq_peers, time_source_healthy, NtpPeer, NtpqProbe, TimeSyncProbe};

use crate::utils::cancel::CancellationToken;
use crate::utils::time::{delay_to_next_interval, TimeProvider};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Indicator name used for the time source
pub const TIME_SOURCE_INDICATOR: &str = "time";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Healthy,
    /// Removed at startup; never recorded this session
    Excluded(String),
    /// Recording, but the last window was dropped or a flush failed
    Degraded(String),
}

impl ChannelStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ChannelStatus::Healthy)
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Healthy => write!(f, "healthy"),
            ChannelStatus::Excluded(reason) => write!(f, "excluded: {}", reason),
            ChannelStatus::Degraded(reason) => write!(f, "degraded: {}", reason),
        }
    }
}

/// Shared channel status, written by the supervisor and read by the monitor
#[derive(Debug, Clone, Default)]
pub struct ChannelStatusBoard {
    inner: Arc<RwLock<BTreeMap<String, ChannelStatus>>>,
}

impl ChannelStatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, channel: &str, status: ChannelStatus) {
        let previous = self.inner.write().insert(channel.to_string(), status.clone());
        if previous.as_ref() != Some(&status) {
            debug!(channel, status = %status, "channel status changed");
        }
    }

    pub fn get(&self, channel: &str) -> Option<ChannelStatus> {
        self.inner.read().get(channel).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, ChannelStatus> {
        self.inner.read().clone()
    }
}

/// Something that can show a healthy/unhealthy state, such as a status LED
pub trait StatusIndicator: Send {
    fn set(&mut self, name: &str, healthy: bool);
}

/// Indicator that logs transitions only
#[derive(Debug, Default)]
pub struct LogIndicator {
    last: BTreeMap<String, bool>,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusIndicator for LogIndicator {
    fn set(&mut self, name: &str, healthy: bool) {
        if self.last.insert(name.to_string(), healthy) == Some(healthy) {
            return;
        }
        if healthy {
            info!(indicator = name, "status ok");
        } else {
            warn!(indicator = name, "status fault");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub time_source_healthy: bool,
    pub channels: BTreeMap<String, bool>,
}

impl HealthReport {
    pub fn all_healthy(&self) -> bool {
        self.time_source_healthy && self.channels.values().all(|ok| *ok)
    }
}

pub struct HealthMonitor {
    probe: Box<dyn TimeSyncProbe>,
    indicator: Box<dyn StatusIndicator>,
    board: ChannelStatusBoard,
}

impl HealthMonitor {
    pub fn new(
        probe: Box<dyn TimeSyncProbe>,
        indicator: Box<dyn StatusIndicator>,
        board: ChannelStatusBoard,
    ) -> Self {
        Self {
            probe,
            indicator,
            board,
        }
    }

    /// Run one check and update the indicators
    pub fn check(&mut self) -> HealthReport {
        let time_source_healthy = self.probe.is_synchronized();
        self.indicator.set(TIME_SOURCE_INDICATOR, time_source_healthy);

        let channels: BTreeMap<String, bool> = self
            .board
            .snapshot()
            .into_iter()
            .map(|(name, status)| (name, status.is_healthy()))
            .collect();
        for (name, healthy) in &channels {
            self.indicator.set(name, *healthy);
        }

        HealthReport {
            time_source_healthy,
            channels,
        }
    }

    /// Check on `interval` boundaries of the wall clock until cancelled
    pub fn spawn(
        mut self,
        interval: Duration,
        clock: Arc<dyn TimeProvider>,
        cancel: CancellationToken,
    ) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("health-monitor".to_string())
            .spawn(move || {
                info!(interval_s = interval.as_secs_f64(), "health monitor started");
                loop {
                    let delay = delay_to_next_interval(clock.now_nanos(), interval);
                    if clock.sleep(delay, &cancel) {
                        break;
                    }
                    let report = self.check();
                    debug!(
                        time_source = report.time_source_healthy,
                        channels = report.channels.len(),
                        "health check complete"
                    );
                }
                info!("health monitor stopped");
            })
    }
}
